//! Telegram Bot API notification channel.
//!
//! Sends status text (`sendMessage`, HTML parse mode) and screenshot uploads
//! (`sendPhoto`, multipart) to an operator's chat. Every failure (transport,
//! non-2xx, unreadable photo file) is logged and reported as `false`:
//! notification delivery is best-effort and must never abort the run that
//! triggered it.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

/// Telegram `sendMessage` text limit (UTF-8 characters).
const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

/// Timeout for JSON API calls.
const TEXT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for the photo upload.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

const API_BASE: &str = "https://api.telegram.org";

/// Why a send failed. Internal to the channel: the public surface swallows
/// these into a boolean after logging.
#[derive(Debug, Error)]
enum NotifyError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("photo not readable: {0}")]
    Io(#[from] std::io::Error),
}

/// Telegram channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Telegram Bot API token.
    pub bot_token: String,
    /// Target chat ID (user, group, or channel).
    pub chat_id: String,
    /// Parse mode for message formatting.
    #[serde(default = "default_parse_mode")]
    pub parse_mode: String,
}

fn default_parse_mode() -> String {
    "HTML".to_string()
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            parse_mode: default_parse_mode(),
        }
    }
}

/// The notification capability used by the keep-alive workflow.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a text message. Returns whether delivery succeeded.
    async fn send_text(&self, text: &str) -> bool;
    /// Upload a local image with an optional caption. Returns whether
    /// delivery succeeded.
    async fn send_photo(&self, photo_path: &Path, caption: &str) -> bool;
}

/// Telegram-backed [`Notifier`].
pub struct TelegramNotifier {
    config: TelegramConfig,
    client: Client,
    api_base: String,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: Client::new(),
            api_base: API_BASE.to_string(),
        }
    }

    /// Point the channel at a different API host (tests).
    #[doc(hidden)]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.config.bot_token, method)
    }

    async fn try_send_text(&self, text: &str) -> Result<(), NotifyError> {
        let payload = json!({
            "chat_id": self.config.chat_id,
            "text": truncate_message(text, TELEGRAM_MESSAGE_LIMIT),
            "parse_mode": self.config.parse_mode,
        });

        let response = self
            .client
            .post(self.endpoint("sendMessage"))
            .timeout(TEXT_TIMEOUT)
            .json(&payload)
            .send()
            .await?;

        check_response(response).await
    }

    async fn try_send_photo(&self, photo_path: &Path, caption: &str) -> Result<(), NotifyError> {
        let bytes = tokio::fs::read(photo_path).await?;
        let filename = photo_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "photo.png".to_string());

        let photo = Part::bytes(bytes).file_name(filename).mime_str("image/png")?;
        let form = Form::new()
            .text("chat_id", self.config.chat_id.clone())
            .text("caption", caption.to_string())
            .part("photo", photo);

        let response = self
            .client
            .post(self.endpoint("sendPhoto"))
            .timeout(UPLOAD_TIMEOUT)
            .multipart(form)
            .send()
            .await?;

        check_response(response).await
    }
}

async fn check_response(response: reqwest::Response) -> Result<(), NotifyError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(NotifyError::Api {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_text(&self, text: &str) -> bool {
        match self.try_send_text(text).await {
            Ok(()) => {
                debug!("telegram message sent");
                true
            }
            Err(e) => {
                warn!(error = %e, "telegram message failed");
                false
            }
        }
    }

    async fn send_photo(&self, photo_path: &Path, caption: &str) -> bool {
        match self.try_send_photo(photo_path, caption).await {
            Ok(()) => {
                debug!(path = %photo_path.display(), "telegram photo sent");
                true
            }
            Err(e) => {
                warn!(error = %e, "telegram photo failed");
                false
            }
        }
    }
}

/// Truncate a message to fit within the Telegram character limit.
fn truncate_message(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let suffix = "\n\n[truncated]";
    let budget = limit - suffix.len();
    let truncated: String = text.chars().take(budget).collect();
    format!("{truncated}{suffix}")
}
