//! Session verification from observable page signals.

use std::time::Duration;

use tracing::debug;

use crate::page::BrowserPage;

/// Markers used to classify the page after navigation.
#[derive(Debug, Clone)]
pub struct VerifyMarkers {
    /// URL path segment that identifies the login page.
    pub login_url_marker: String,
    /// Substring the title must contain on an authenticated dashboard.
    pub product_title_marker: String,
    /// Substring the title must NOT contain (login page title).
    pub login_title_marker: String,
}

impl Default for VerifyMarkers {
    fn default() -> Self {
        Self {
            login_url_marker: "/login".to_string(),
            product_title_marker: "Zeabur".to_string(),
            login_title_marker: "Login".to_string(),
        }
    }
}

/// Determine whether the current session is authenticated.
///
/// A URL containing the login marker is an immediate `false`: no settle
/// delay. Otherwise the settle delay lets client-side redirects finish, and
/// the title decides: it must contain the product marker and not the login
/// marker. Any failure reading page state is treated as not-authenticated
/// rather than propagated (fail-closed).
pub async fn is_authenticated(
    page: &dyn BrowserPage,
    markers: &VerifyMarkers,
    settle: Duration,
) -> bool {
    let url = match page.current_url().await {
        Ok(url) => url,
        Err(e) => {
            debug!(error = %e, "could not read page url; treating as not authenticated");
            return false;
        }
    };

    if url.contains(&markers.login_url_marker) {
        debug!(%url, "landed on login page");
        return false;
    }

    tokio::time::sleep(settle).await;

    match page.title().await {
        Ok(title) => {
            let ok = title.contains(&markers.product_title_marker)
                && !title.contains(&markers.login_title_marker);
            debug!(%title, authenticated = ok, "title check");
            ok
        }
        Err(e) => {
            debug!(error = %e, "could not read page title; treating as not authenticated");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use cookie_codec::CookieRecord;

    use super::*;
    use crate::error::{BrowserError, Result};

    /// Page double returning canned url/title values.
    struct FakePage {
        url: Option<String>,
        title: Option<String>,
        title_reads: AtomicUsize,
    }

    impl FakePage {
        fn new(url: Option<&str>, title: Option<&str>) -> Self {
            Self {
                url: url.map(str::to_string),
                title: title.map(str::to_string),
                title_reads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl BrowserPage for FakePage {
        async fn navigate(&self, _url: &str) -> Result<()> {
            Ok(())
        }

        async fn current_url(&self) -> Result<String> {
            self.url
                .clone()
                .ok_or_else(|| BrowserError::Protocol("detached".to_string()))
        }

        async fn title(&self) -> Result<String> {
            self.title_reads.fetch_add(1, Ordering::SeqCst);
            self.title
                .clone()
                .ok_or_else(|| BrowserError::Protocol("detached".to_string()))
        }

        async fn set_cookies(&self, _cookies: &[CookieRecord]) -> Result<()> {
            Ok(())
        }

        async fn cookies(&self) -> Result<Vec<CookieRecord>> {
            Ok(Vec::new())
        }

        async fn screenshot(&self, _path: &Path) -> Result<()> {
            Ok(())
        }
    }

    fn markers() -> VerifyMarkers {
        VerifyMarkers::default()
    }

    #[tokio::test]
    async fn login_url_fails_without_consulting_title() {
        let page = FakePage::new(Some("https://zeabur.com/login?next=/projects"), Some("Zeabur"));
        assert!(!is_authenticated(&page, &markers(), Duration::ZERO).await);
        assert_eq!(page.title_reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dashboard_title_passes() {
        let page = FakePage::new(Some("https://zeabur.com/projects"), Some("Projects | Zeabur"));
        assert!(is_authenticated(&page, &markers(), Duration::ZERO).await);
    }

    #[tokio::test]
    async fn login_title_fails() {
        let page = FakePage::new(Some("https://zeabur.com/projects"), Some("Zeabur Login"));
        assert!(!is_authenticated(&page, &markers(), Duration::ZERO).await);
    }

    #[tokio::test]
    async fn missing_product_marker_fails() {
        let page = FakePage::new(Some("https://zeabur.com/projects"), Some("404"));
        assert!(!is_authenticated(&page, &markers(), Duration::ZERO).await);
    }

    #[tokio::test]
    async fn url_read_failure_is_not_authenticated() {
        let page = FakePage::new(None, Some("Zeabur"));
        assert!(!is_authenticated(&page, &markers(), Duration::ZERO).await);
    }

    #[tokio::test]
    async fn title_read_failure_is_not_authenticated() {
        let page = FakePage::new(Some("https://zeabur.com/projects"), None);
        assert!(!is_authenticated(&page, &markers(), Duration::ZERO).await);
    }
}
