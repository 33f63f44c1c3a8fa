//! Chromium process lifecycle.
//!
//! Spawns a headless Chromium with a throwaway profile directory and
//! `--remote-debugging-port=0`, then scrapes the `DevTools listening on ws://…`
//! line from stderr to learn the browser's DevTools endpoint. The process is
//! killed on [`Chrome::close`] and, as a backstop, on drop.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, trace, warn};

use crate::error::{BrowserError, Result};

/// How long to wait for the DevTools endpoint line on stderr.
const DEVTOOLS_WAIT: Duration = Duration::from_secs(30);

const DEVTOOLS_LINE_PREFIX: &str = "DevTools listening on ";

/// Well-known Chromium binary locations, probed in order.
const BINARY_CANDIDATES: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
];

/// Locates and launches a headless Chromium instance.
#[derive(Debug, Default)]
pub struct ChromeLauncher {
    binary: Option<PathBuf>,
}

impl ChromeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit browser binary instead of probing.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: Some(binary.into()),
        }
    }

    fn resolve_binary(&self) -> Result<PathBuf> {
        if let Some(path) = &self.binary {
            return Ok(path.clone());
        }

        if let Ok(path) = std::env::var("CHROME_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(path);
            }
            warn!(path = %path.display(), "CHROME_PATH does not exist; probing known locations");
        }

        BINARY_CANDIDATES
            .iter()
            .map(PathBuf::from)
            .find(|candidate| candidate.exists())
            .ok_or_else(|| {
                BrowserError::Launch(
                    "no Chromium binary found; set CHROME_PATH or pass --chrome-path".to_string(),
                )
            })
    }

    /// Spawn the browser and wait for its DevTools endpoint.
    pub async fn launch(&self) -> Result<Chrome> {
        let binary = self.resolve_binary()?;
        let profile_dir = tempfile::tempdir()?;

        info!(binary = %binary.display(), "launching headless browser");

        let mut child = Command::new(&binary)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-dev-shm-usage")
            .arg(format!("--user-data-dir={}", profile_dir.path().display()))
            .arg("--remote-debugging-port=0")
            .arg("about:blank")
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BrowserError::Launch(format!("{}: {e}", binary.display())))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BrowserError::Launch("browser stderr not captured".to_string()))?;

        let devtools_url = tokio::time::timeout(DEVTOOLS_WAIT, async {
            let mut lines = BufReader::new(stderr).lines();
            while let Some(line) = lines.next_line().await? {
                trace!(target: "browser_stderr", "{line}");
                if let Some(url) = line.strip_prefix(DEVTOOLS_LINE_PREFIX) {
                    let url = url.trim().to_string();
                    // Keep draining stderr so the pipe never backs up.
                    tokio::spawn(async move {
                        while let Ok(Some(line)) = lines.next_line().await {
                            trace!(target: "browser_stderr", "{line}");
                        }
                    });
                    return Ok(url);
                }
            }
            Err(BrowserError::Launch(
                "browser exited before announcing its DevTools endpoint".to_string(),
            ))
        })
        .await
        .map_err(|_| BrowserError::Timeout("DevTools endpoint announcement"))??;

        debug!(%devtools_url, "browser ready");

        Ok(Chrome {
            child,
            devtools_url,
            _profile_dir: profile_dir,
        })
    }
}

/// A running headless browser instance.
///
/// Must be released via [`Chrome::close`] on every exit path; dropping the
/// handle kills the process as a last resort.
pub struct Chrome {
    child: Child,
    devtools_url: String,
    _profile_dir: tempfile::TempDir,
}

impl Chrome {
    /// The browser-level DevTools WebSocket URL (`ws://…/devtools/browser/…`).
    pub fn devtools_url(&self) -> &str {
        &self.devtools_url
    }

    /// Terminate the browser process.
    pub async fn close(mut self) {
        if let Err(e) = self.child.kill().await {
            warn!(error = %e, "failed to kill browser process");
        }
        debug!("browser closed");
    }
}
