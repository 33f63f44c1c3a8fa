//! Page capability: the trait the workflow programs against, and its CDP impl.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, trace};
use url::Url;

use cookie_codec::CookieRecord;

use crate::cdp::CdpConnection;
use crate::error::{BrowserError, Result};
use crate::launcher::Chrome;

/// Quiet window with no network activity that counts as "idle".
const NETWORK_QUIET: Duration = Duration::from_millis(500);

/// Attempts/polling interval while waiting for the page target to appear.
const TARGET_POLL_ATTEMPTS: u32 = 20;
const TARGET_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// The browser capability used by the keep-alive workflow.
///
/// Everything observable about the session flows through these six
/// operations; the browser engine behind them stays opaque.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Navigate and wait for load plus network idleness.
    async fn navigate(&self, url: &str) -> Result<()>;
    /// The page's current URL.
    async fn current_url(&self) -> Result<String>;
    /// The page's current title.
    async fn title(&self) -> Result<String>;
    /// Inject cookies into the browser context (before navigation).
    async fn set_cookies(&self, cookies: &[CookieRecord]) -> Result<()>;
    /// Read all cookies currently held by the browser context.
    async fn cookies(&self) -> Result<Vec<CookieRecord>>;
    /// Capture a viewport (non-full-page) PNG screenshot to `path`.
    async fn screenshot(&self, path: &Path) -> Result<()>;
}

/// [`BrowserPage`] implementation over a DevTools connection.
pub struct CdpPage {
    conn: CdpConnection,
    nav_timeout: Duration,
}

impl CdpPage {
    /// Attach to the first page target of a running browser.
    pub async fn attach(chrome: &Chrome, nav_timeout: Duration) -> Result<Self> {
        let ws_url = discover_page_target(chrome.devtools_url()).await?;
        debug!(%ws_url, "attaching to page target");

        let conn = CdpConnection::connect(&ws_url).await?;
        conn.call("Page.enable", json!({})).await?;
        conn.call("Network.enable", json!({})).await?;
        conn.call("Runtime.enable", json!({})).await?;

        Ok(Self { conn, nav_timeout })
    }

    async fn evaluate_string(&self, expression: &str) -> Result<String> {
        let result = self
            .conn
            .call(
                "Runtime.evaluate",
                json!({ "expression": expression, "returnByValue": true }),
            )
            .await?;

        result
            .pointer("/result/value")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                BrowserError::Protocol(format!("{expression} did not evaluate to a string"))
            })
    }

    /// Wait until the load event has fired and the network has been quiet
    /// for [`NETWORK_QUIET`], bounded by the navigation timeout.
    async fn await_load_and_idle(
        &self,
        events: &mut broadcast::Receiver<crate::cdp::CdpEvent>,
    ) -> Result<()> {
        let deadline = Instant::now() + self.nav_timeout;
        let mut inflight: HashSet<String> = HashSet::new();
        let mut load_fired = false;
        let mut last_activity = Instant::now();

        loop {
            if load_fired && inflight.is_empty() && last_activity.elapsed() >= NETWORK_QUIET {
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(BrowserError::Timeout("navigation (load + network idle)"));
            }

            // When only the quiet window is outstanding, wake up as soon as
            // it can possibly have elapsed; otherwise sleep until the deadline
            // and rely on events to wake us.
            let wait = if load_fired && inflight.is_empty() {
                NETWORK_QUIET
                    .saturating_sub(last_activity.elapsed())
                    .min(deadline - now)
            } else {
                deadline - now
            };

            match tokio::time::timeout(wait, events.recv()).await {
                Ok(Ok(event)) => match event.method.as_str() {
                    "Page.loadEventFired" => {
                        trace!("load event fired");
                        load_fired = true;
                        last_activity = Instant::now();
                    }
                    "Network.requestWillBeSent" => {
                        if let Some(id) = event.params.get("requestId").and_then(Value::as_str) {
                            inflight.insert(id.to_string());
                        }
                        last_activity = Instant::now();
                    }
                    "Network.loadingFinished" | "Network.loadingFailed" => {
                        if let Some(id) = event.params.get("requestId").and_then(Value::as_str) {
                            inflight.remove(id);
                        }
                        last_activity = Instant::now();
                    }
                    _ => {}
                },
                // Missed events: reset the accounting rather than guess.
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    trace!(skipped, "event subscriber lagged; clearing in-flight set");
                    inflight.clear();
                    last_activity = Instant::now();
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => return Err(BrowserError::Closed),
                // Quiet window elapsed; the loop re-checks the idle condition.
                Err(_) => {}
            }
        }
    }
}

#[async_trait]
impl BrowserPage for CdpPage {
    async fn navigate(&self, url: &str) -> Result<()> {
        debug!(%url, "navigating");
        let mut events = self.conn.subscribe();
        self.conn.call("Page.navigate", json!({ "url": url })).await?;
        self.await_load_and_idle(&mut events).await
    }

    async fn current_url(&self) -> Result<String> {
        self.evaluate_string("location.href").await
    }

    async fn title(&self) -> Result<String> {
        self.evaluate_string("document.title").await
    }

    async fn set_cookies(&self, cookies: &[CookieRecord]) -> Result<()> {
        let cookies: Vec<Value> = cookies
            .iter()
            .map(|c| {
                json!({
                    "name": c.name,
                    "value": c.value,
                    "domain": c.domain,
                    "path": c.path,
                })
            })
            .collect();
        debug!(count = cookies.len(), "injecting cookies");
        self.conn
            .call("Network.setCookies", json!({ "cookies": cookies }))
            .await?;
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<CookieRecord>> {
        let result = self.conn.call("Network.getAllCookies", json!({})).await?;
        let cookies = result
            .get("cookies")
            .and_then(Value::as_array)
            .ok_or_else(|| BrowserError::Protocol("getAllCookies returned no array".to_string()))?;

        Ok(cookies
            .iter()
            .filter_map(|c| {
                let name = c.get("name").and_then(Value::as_str)?;
                let value = c.get("value").and_then(Value::as_str).unwrap_or_default();
                let domain = c.get("domain").and_then(Value::as_str).unwrap_or_default();
                let mut record = CookieRecord::new(name, value, domain);
                if let Some(path) = c.get("path").and_then(Value::as_str) {
                    record.path = path.to_string();
                }
                Some(record)
            })
            .collect())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        let result = self
            .conn
            .call("Page.captureScreenshot", json!({ "format": "png" }))
            .await?;
        let data = result
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Protocol("captureScreenshot returned no data".to_string()))?;
        let bytes = BASE64
            .decode(data)
            .map_err(|e| BrowserError::Protocol(format!("invalid screenshot payload: {e}")))?;
        tokio::fs::write(path, bytes).await?;
        debug!(path = %path.display(), "screenshot written");
        Ok(())
    }
}

/// Resolve the first page target's WebSocket URL via the DevTools HTTP API.
///
/// The page target can appear slightly after the browser endpoint is
/// announced, so this polls `/json/list` for a short while.
async fn discover_page_target(devtools_url: &str) -> Result<String> {
    let ws = Url::parse(devtools_url)
        .map_err(|e| BrowserError::Discovery(format!("bad devtools url: {e}")))?;
    let host = ws
        .host_str()
        .ok_or_else(|| BrowserError::Discovery("devtools url has no host".to_string()))?;
    let port = ws
        .port()
        .ok_or_else(|| BrowserError::Discovery("devtools url has no port".to_string()))?;

    let list_url = format!("http://{host}:{port}/json/list");
    let client = reqwest::Client::new();

    for _ in 0..TARGET_POLL_ATTEMPTS {
        let targets: Vec<Value> = client.get(&list_url).send().await?.json().await?;
        let page_ws = targets.iter().find_map(|t| {
            (t.get("type").and_then(Value::as_str) == Some("page"))
                .then(|| t.get("webSocketDebuggerUrl").and_then(Value::as_str))
                .flatten()
        });
        if let Some(url) = page_ws {
            return Ok(url.to_string());
        }
        tokio::time::sleep(TARGET_POLL_INTERVAL).await;
    }

    Err(BrowserError::Discovery(
        "no page target appeared on the DevTools endpoint".to_string(),
    ))
}
