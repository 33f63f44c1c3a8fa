//! vigil: session keep-alive runner.
//!
//! One invocation = one run: launch a headless browser, re-authenticate the
//! dashboard session from the stored cookie string, verify it, capture
//! evidence, notify the operator, and republish rotated cookies to the
//! secret store. Exit code 0 on success, 1 on any failure.

mod cli;
mod config;
mod error;
mod workflow;

use std::process;
use std::sync::OnceLock;

use clap::Parser;
use tracing::{Level, debug, error, info};
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

use browser_driver::{ChromeLauncher, CdpPage};
use gh_secrets::{GithubSecretsClient, SecretPublisher};
use telegram_notify::{Notifier, TelegramNotifier};

use crate::cli::Args;
use crate::config::RunConfig;
use crate::error::{Result, RunOutcome};
use crate::workflow::{Workflow, notify_failure};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);
    install_rustls_provider();

    let outcome = run(args).await;
    process::exit(outcome.exit_code());
}

async fn run(args: Args) -> RunOutcome {
    // Pre-flight: configuration problems never launch a browser.
    let config = match RunConfig::from_env(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return RunOutcome::ExecutionError;
        }
    };

    let notifier = config.telegram.clone().map(TelegramNotifier::new);
    let notifier_ref = notifier.as_ref().map(|n| n as &dyn Notifier);

    let publisher = config
        .secret_store
        .as_ref()
        .map(|store| {
            GithubSecretsClient::new(store.token.clone(), store.owner.clone(), store.repo.clone())
        });
    let publisher_ref = publisher.as_ref().map(|p| p as &dyn SecretPublisher);

    let launcher = match &config.chrome_path {
        Some(path) => ChromeLauncher::with_binary(path),
        None => ChromeLauncher::new(),
    };

    let chrome = match launcher.launch().await {
        Ok(chrome) => chrome,
        Err(e) => {
            error!("browser launch failed: {e}");
            return RunOutcome::ExecutionError;
        }
    };

    let result = drive(&chrome, &config, notifier_ref, publisher_ref).await;

    // The browser is released on every exit path.
    chrome.close().await;

    match result {
        Ok(()) => {
            info!("keep-alive run completed");
            RunOutcome::Success
        }
        Err(e) => {
            error!("{e}");
            notify_failure(notifier_ref, &e).await;
            e.outcome()
        }
    }
}

async fn drive(
    chrome: &browser_driver::Chrome,
    config: &RunConfig,
    notifier: Option<&dyn Notifier>,
    publisher: Option<&dyn SecretPublisher>,
) -> Result<()> {
    let page = CdpPage::attach(chrome, config.nav_timeout).await?;
    Workflow {
        page: &page,
        notifier,
        publisher,
        config,
    }
    .execute()
    .await
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::builder()
            .with_default_directive(LevelFilter::from_level(Level::INFO).into())
            .from_env_lossy()
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Can happen if another crate installed one first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}
