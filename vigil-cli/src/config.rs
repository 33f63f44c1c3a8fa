//! Run configuration.
//!
//! One immutable [`RunConfig`] is built up front from the environment and the
//! CLI flags, then passed explicitly to every component; no environment
//! reads happen after this point.

use std::path::PathBuf;
use std::time::Duration;

use browser_driver::VerifyMarkers;
use telegram_notify::TelegramConfig;
use tracing::warn;

use crate::cli::Args;
use crate::error::{Result, RunError};

/// Required: the cookie string that authenticates the session.
pub const COOKIE_ENV: &str = "ZEABUR_COOKIE";
/// Optional: token that enables republishing rotated cookies.
pub const REPO_TOKEN_ENV: &str = "REPO_TOKEN";
/// Optional (with the token): `owner/name` of the repository whose secret holds the cookie.
pub const REPOSITORY_ENV: &str = "GITHUB_REPOSITORY";
/// Optional pair: Telegram notifications.
pub const TG_BOT_TOKEN_ENV: &str = "TG_BOT_TOKEN";
pub const TG_CHAT_ID_ENV: &str = "TG_CHAT_ID";

/// Name of the secret that stores the cookie string.
pub const SECRET_NAME: &str = "ZEABUR_COOKIE";

/// Domain attached to injected cookies.
const COOKIE_DOMAIN: &str = ".zeabur.com";
/// Substring that selects cookies belonging to the target service.
const DOMAIN_FILTER: &str = "zeabur.com";

/// Where rotated credentials are republished.
#[derive(Debug, Clone)]
pub struct SecretStoreConfig {
    pub token: String,
    pub owner: String,
    pub repo: String,
}

/// Immutable configuration for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// The cookie string as supplied; also the rotation-comparison baseline.
    pub cookie: String,
    pub dashboard_url: String,
    pub screenshot_path: PathBuf,
    pub cookie_domain: String,
    pub domain_filter: String,
    pub markers: VerifyMarkers,
    pub settle: Duration,
    pub nav_timeout: Duration,
    pub chrome_path: Option<PathBuf>,
    pub telegram: Option<TelegramConfig>,
    pub secret_store: Option<SecretStoreConfig>,
}

impl RunConfig {
    /// Build configuration from the process environment and CLI flags.
    pub fn from_env(args: &Args) -> Result<Self> {
        Self::from_lookup(args, |key| std::env::var(key).ok())
    }

    /// Seam for tests: same logic, injectable environment.
    fn from_lookup(args: &Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let cookie = get(COOKIE_ENV).ok_or_else(|| {
            RunError::config(format!("{COOKIE_ENV} environment variable is not set"))
        })?;

        let telegram = match (get(TG_BOT_TOKEN_ENV), get(TG_CHAT_ID_ENV)) {
            (Some(bot_token), Some(chat_id)) => Some(TelegramConfig::new(bot_token, chat_id)),
            (None, None) => None,
            _ => {
                warn!(
                    "only one of {TG_BOT_TOKEN_ENV}/{TG_CHAT_ID_ENV} is set; notifications disabled"
                );
                None
            }
        };

        let secret_store = match (get(REPO_TOKEN_ENV), get(REPOSITORY_ENV)) {
            (Some(token), Some(repository)) => {
                let (owner, repo) = repository.split_once('/').ok_or_else(|| {
                    RunError::config(format!(
                        "{REPOSITORY_ENV} must be owner/name, got {repository:?}"
                    ))
                })?;
                Some(SecretStoreConfig {
                    token,
                    owner: owner.to_string(),
                    repo: repo.to_string(),
                })
            }
            (Some(_), None) => {
                warn!("{REPO_TOKEN_ENV} set without {REPOSITORY_ENV}; secret republish disabled");
                None
            }
            _ => None,
        };

        Ok(Self {
            cookie,
            dashboard_url: args.dashboard_url.clone(),
            screenshot_path: args.screenshot_path.clone(),
            cookie_domain: COOKIE_DOMAIN.to_string(),
            domain_filter: DOMAIN_FILTER.to_string(),
            markers: VerifyMarkers::default(),
            settle: Duration::from_millis(args.settle_ms),
            nav_timeout: Duration::from_secs(args.timeout),
            chrome_path: args.chrome_path.clone(),
            telegram,
            secret_store,
        })
    }
}
