//! The keep-alive workflow.
//!
//! Strictly linear, single pass: inject cookies → navigate → verify →
//! screenshot → notify → rotation check → conditional republish. Failure
//! notifications are the caller's job (via [`notify_failure`]) so that the
//! same wording covers both authentication failures and execution errors;
//! success notifications happen inline because they interleave with the
//! evidence capture.

use browser_driver::{BrowserPage, is_authenticated};
use gh_secrets::SecretPublisher;
use telegram_notify::Notifier;
use tracing::{debug, info};

use crate::config::{RunConfig, SECRET_NAME};
use crate::error::{Result, RunError};

pub struct Workflow<'a> {
    pub page: &'a dyn BrowserPage,
    pub notifier: Option<&'a dyn Notifier>,
    pub publisher: Option<&'a dyn SecretPublisher>,
    pub config: &'a RunConfig,
}

impl Workflow<'_> {
    /// Drive one run from cookie injection through the rotation check.
    pub async fn execute(&self) -> Result<()> {
        let config = self.config;

        let records = cookie_codec::parse(&config.cookie, &config.cookie_domain);
        info!(count = records.len(), "injecting session cookies");
        self.page.set_cookies(&records).await?;

        info!(url = %config.dashboard_url, "visiting dashboard");
        self.page.navigate(&config.dashboard_url).await?;

        if !is_authenticated(self.page, &config.markers, config.settle).await {
            return Err(RunError::Auth(
                "cookie was rejected by the dashboard; it may have expired".to_string(),
            ));
        }

        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        info!(%timestamp, "login verified");

        self.page.screenshot(&config.screenshot_path).await?;
        info!(path = %config.screenshot_path.display(), "screenshot captured");

        if let Some(notifier) = self.notifier {
            let message = format!("\u{2705} Zeabur keep-alive succeeded!\n\u{23f0} {timestamp}");
            notifier.send_text(&message).await;
            notifier
                .send_photo(&config.screenshot_path, "Zeabur dashboard")
                .await;
        }

        let current = self.page.cookies().await?;
        let refreshed = cookie_codec::format(&current, &config.domain_filter);

        if refreshed == config.cookie {
            debug!("cookies unchanged; nothing to republish");
            return Ok(());
        }

        match self.publisher {
            Some(publisher) => {
                info!("cookie rotation detected; updating stored secret");
                publisher.publish(SECRET_NAME, &refreshed).await?;
            }
            None => {
                info!("cookie rotation detected but no secret store configured; skipping");
            }
        }

        Ok(())
    }
}

/// Best-effort failure notification. Never fails; delivery problems are
/// already logged by the channel.
pub async fn notify_failure(notifier: Option<&dyn Notifier>, error: &RunError) {
    if let Some(notifier) = notifier {
        let message = match error {
            RunError::Auth(reason) => {
                format!("\u{274c} Zeabur login failed: {reason}")
            }
            other => format!("\u{274c} Zeabur keep-alive run failed: {other}"),
        };
        notifier.send_text(&message).await;
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use browser_driver::{BrowserError, VerifyMarkers};
    use cookie_codec::CookieRecord;
    use gh_secrets::SecretStoreError;

    use super::*;

    /// Browser double: canned url/title/cookies, records what was asked of it.
    struct ScriptedPage {
        url: String,
        title: String,
        cookies_after: Vec<CookieRecord>,
        injected: Mutex<Vec<CookieRecord>>,
        navigations: Mutex<Vec<String>>,
        screenshots: AtomicUsize,
    }

    impl ScriptedPage {
        fn authenticated(cookies_after: Vec<CookieRecord>) -> Self {
            Self {
                url: "https://zeabur.com/projects".to_string(),
                title: "Projects | Zeabur".to_string(),
                cookies_after,
                injected: Mutex::new(Vec::new()),
                navigations: Mutex::new(Vec::new()),
                screenshots: AtomicUsize::new(0),
            }
        }

        fn logged_out() -> Self {
            let mut page = Self::authenticated(Vec::new());
            page.url = "https://zeabur.com/login?next=/projects".to_string();
            page.title = "Zeabur Login".to_string();
            page
        }
    }

    #[async_trait]
    impl BrowserPage for ScriptedPage {
        async fn navigate(&self, url: &str) -> std::result::Result<(), BrowserError> {
            self.navigations.lock().unwrap().push(url.to_string());
            Ok(())
        }

        async fn current_url(&self) -> std::result::Result<String, BrowserError> {
            Ok(self.url.clone())
        }

        async fn title(&self) -> std::result::Result<String, BrowserError> {
            Ok(self.title.clone())
        }

        async fn set_cookies(&self, cookies: &[CookieRecord]) -> std::result::Result<(), BrowserError> {
            self.injected.lock().unwrap().extend_from_slice(cookies);
            Ok(())
        }

        async fn cookies(&self) -> std::result::Result<Vec<CookieRecord>, BrowserError> {
            Ok(self.cookies_after.clone())
        }

        async fn screenshot(&self, _path: &Path) -> std::result::Result<(), BrowserError> {
            self.screenshots.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        texts: Mutex<Vec<String>>,
        photos: Mutex<Vec<(PathBuf, String)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_text(&self, text: &str) -> bool {
            self.texts.lock().unwrap().push(text.to_string());
            true
        }

        async fn send_photo(&self, photo_path: &Path, caption: &str) -> bool {
            self.photos
                .lock()
                .unwrap()
                .push((photo_path.to_path_buf(), caption.to_string()));
            true
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl SecretPublisher for RecordingPublisher {
        async fn publish(
            &self,
            secret_name: &str,
            plaintext: &str,
        ) -> std::result::Result<(), SecretStoreError> {
            self.published
                .lock()
                .unwrap()
                .push((secret_name.to_string(), plaintext.to_string()));
            Ok(())
        }
    }

    fn config(cookie: &str) -> RunConfig {
        RunConfig {
            cookie: cookie.to_string(),
            dashboard_url: "https://zeabur.com/projects".to_string(),
            screenshot_path: PathBuf::from("/tmp/vigil-test.png"),
            cookie_domain: ".zeabur.com".to_string(),
            domain_filter: "zeabur.com".to_string(),
            markers: VerifyMarkers::default(),
            settle: Duration::ZERO,
            nav_timeout: Duration::from_secs(1),
            chrome_path: None,
            telegram: None,
            secret_store: None,
        }
    }

    fn records(pairs: &[(&str, &str)]) -> Vec<CookieRecord> {
        pairs
            .iter()
            .map(|(name, value)| CookieRecord::new(*name, *value, ".zeabur.com"))
            .collect()
    }

    #[tokio::test]
    async fn unchanged_cookies_never_touch_the_publisher() {
        let page = ScriptedPage::authenticated(records(&[("a", "1"), ("b", "2")]));
        let notifier = RecordingNotifier::default();
        let publisher = RecordingPublisher::default();
        let config = config("a=1; b=2");

        let workflow = Workflow {
            page: &page,
            notifier: Some(&notifier),
            publisher: Some(&publisher),
            config: &config,
        };
        workflow.execute().await.expect("run succeeds");

        assert!(publisher.published.lock().unwrap().is_empty());
        assert_eq!(notifier.texts.lock().unwrap().len(), 1);
        assert_eq!(notifier.photos.lock().unwrap().len(), 1);
        assert_eq!(page.screenshots.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rotated_cookies_publish_exactly_once() {
        let page = ScriptedPage::authenticated(records(&[("a", "1"), ("b", "fresh")]));
        let publisher = RecordingPublisher::default();
        let config = config("a=1; b=2");

        let workflow = Workflow {
            page: &page,
            notifier: None,
            publisher: Some(&publisher),
            config: &config,
        };
        workflow.execute().await.expect("run succeeds");

        let published = publisher.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, SECRET_NAME);
        assert_eq!(published[0].1, "a=1; b=fresh");
    }

    #[tokio::test]
    async fn rotation_without_a_store_is_skipped() {
        let page = ScriptedPage::authenticated(records(&[("a", "changed")]));
        let config = config("a=1");

        let workflow = Workflow {
            page: &page,
            notifier: None,
            publisher: None,
            config: &config,
        };
        workflow.execute().await.expect("run succeeds");
    }

    #[tokio::test]
    async fn foreign_domain_cookies_do_not_count_as_rotation() {
        let mut cookies = records(&[("a", "1")]);
        cookies.push(CookieRecord::new("tracker", "x", "ads.example.com"));
        let page = ScriptedPage::authenticated(cookies);
        let publisher = RecordingPublisher::default();
        let config = config("a=1");

        let workflow = Workflow {
            page: &page,
            notifier: None,
            publisher: Some(&publisher),
            config: &config,
        };
        workflow.execute().await.expect("run succeeds");

        assert!(publisher.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn logged_out_session_stops_before_evidence_capture() {
        let page = ScriptedPage::logged_out();
        let notifier = RecordingNotifier::default();
        let publisher = RecordingPublisher::default();
        let config = config("a=1");

        let workflow = Workflow {
            page: &page,
            notifier: Some(&notifier),
            publisher: Some(&publisher),
            config: &config,
        };
        let error = workflow.execute().await.unwrap_err();
        assert!(matches!(error, RunError::Auth(_)));

        // No screenshot, no success messages, no republish.
        assert_eq!(page.screenshots.load(Ordering::SeqCst), 0);
        assert!(notifier.texts.lock().unwrap().is_empty());
        assert!(notifier.photos.lock().unwrap().is_empty());
        assert!(publisher.published.lock().unwrap().is_empty());

        // The caller sends exactly one failure message.
        notify_failure(Some(&notifier), &error).await;
        let texts = notifier.texts.lock().unwrap();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("login failed"));
    }

    #[tokio::test]
    async fn cookies_are_injected_before_navigation() {
        let page = ScriptedPage::authenticated(records(&[("session", "abc")]));
        let config = config("session=abc");

        let workflow = Workflow {
            page: &page,
            notifier: None,
            publisher: None,
            config: &config,
        };
        workflow.execute().await.expect("run succeeds");

        let injected = page.injected.lock().unwrap();
        assert_eq!(injected.len(), 1);
        assert_eq!(injected[0].name, "session");
        assert_eq!(injected[0].domain, ".zeabur.com");

        let navigations = page.navigations.lock().unwrap();
        assert_eq!(navigations.as_slice(), ["https://zeabur.com/projects"]);
    }
}
