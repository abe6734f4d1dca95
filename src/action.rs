//! Downstream link actions
//!
//! The watcher never drives a browser itself. It hands each surviving link to a
//! [`LinkActionHandler`], which reports an [`ActionOutcome`] instead of raising:
//! "element not found" or "timed out" are ordinary results the caller logs
//! before moving on to the next link.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Result of a single handler interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Completed,
    /// The page loaded but the requested element was not there
    NotFound,
    TimedOut,
    /// The handler cannot perform this kind of action
    Unsupported,
    Failed(String),
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ActionOutcome::Completed)
    }
}

impl std::fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionOutcome::Completed => write!(f, "completed"),
            ActionOutcome::NotFound => write!(f, "element not found"),
            ActionOutcome::TimedOut => write!(f, "timed out"),
            ActionOutcome::Unsupported => write!(f, "not supported by this handler"),
            ActionOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Browser-level effects performed on behalf of the watcher
#[async_trait]
pub trait LinkActionHandler: Send {
    /// One-time sign-in to the platform the links point at
    async fn login_to_platform(&mut self, identity: &str, secret: &str) -> ActionOutcome;

    async fn open(&mut self, url: &str, timeout: Duration) -> ActionOutcome;

    /// Click the element whose visible text is `label` on the page opened last
    async fn click_by_label(&mut self, label: &str, timeout: Duration) -> ActionOutcome;

    /// Release browser resources. Must tolerate repeated calls.
    async fn close(&mut self);
}

/// Only absolute http(s) URLs with a host are handed to a handler
pub fn validate_link_url(raw: &str) -> std::result::Result<Url, String> {
    let parsed = Url::parse(raw).map_err(|e| format!("invalid URL: {}", e))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(format!("blocked URL scheme: '{}'", other)),
    }

    if parsed.host_str().map_or(true, str::is_empty) {
        return Err("URL has no host".to_string());
    }

    Ok(parsed)
}

/// Dry-run handler: logs what would happen and reports success
#[derive(Debug, Default)]
pub struct LogOnlyHandler {
    opened: Vec<String>,
    clicked: Vec<String>,
}

impl LogOnlyHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opened(&self) -> &[String] {
        &self.opened
    }

    pub fn clicked(&self) -> &[String] {
        &self.clicked
    }
}

#[async_trait]
impl LinkActionHandler for LogOnlyHandler {
    async fn login_to_platform(&mut self, identity: &str, _secret: &str) -> ActionOutcome {
        info!("[dry run] Would sign in to platform as {}", identity);
        ActionOutcome::Completed
    }

    async fn open(&mut self, url: &str, _timeout: Duration) -> ActionOutcome {
        info!("[dry run] Would open {}", url);
        self.opened.push(url.to_string());
        ActionOutcome::Completed
    }

    async fn click_by_label(&mut self, label: &str, _timeout: Duration) -> ActionOutcome {
        info!("[dry run] Would click '{}'", label);
        self.clicked.push(label.to_string());
        ActionOutcome::Completed
    }

    async fn close(&mut self) {
        debug!(
            "[dry run] Closing handler ({} opened, {} clicked)",
            self.opened.len(),
            self.clicked.len()
        );
    }
}

/// Opens links in the desktop's default browser.
///
/// It has no view into the page, so clicks are reported as unsupported and
/// platform login only brings up the sign-in page for the operator.
#[derive(Debug, Clone)]
pub struct SystemBrowserHandler {
    login_url: Option<String>,
}

impl SystemBrowserHandler {
    pub fn new(login_url: Option<String>) -> Self {
        Self { login_url }
    }

    async fn launch(&self, url: &str, timeout: Duration) -> ActionOutcome {
        let target = url.to_string();
        let task = tokio::task::spawn_blocking(move || open::that(&target));

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(()))) => ActionOutcome::Completed,
            Ok(Ok(Err(e))) => ActionOutcome::Failed(format!("could not launch browser: {}", e)),
            Ok(Err(e)) => ActionOutcome::Failed(format!("browser task panicked: {}", e)),
            Err(_) => ActionOutcome::TimedOut,
        }
    }
}

#[async_trait]
impl LinkActionHandler for SystemBrowserHandler {
    async fn login_to_platform(&mut self, identity: &str, _secret: &str) -> ActionOutcome {
        let Some(login_url) = self.login_url.clone() else {
            debug!("No login page configured, assuming an existing browser session");
            return ActionOutcome::Completed;
        };

        info!("Opening platform sign-in page for {}", identity);
        self.launch(&login_url, Duration::from_secs(30)).await
    }

    async fn open(&mut self, url: &str, timeout: Duration) -> ActionOutcome {
        debug!("Opening {} in the default browser", url);
        self.launch(url, timeout).await
    }

    async fn click_by_label(&mut self, label: &str, _timeout: Duration) -> ActionOutcome {
        warn!("Cannot click '{}': the system browser is not automatable", label);
        ActionOutcome::Unsupported
    }

    async fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_success() {
        assert!(ActionOutcome::Completed.is_success());
        assert!(!ActionOutcome::NotFound.is_success());
        assert!(!ActionOutcome::TimedOut.is_success());
        assert!(!ActionOutcome::Unsupported.is_success());
        assert!(!ActionOutcome::Failed("x".to_string()).is_success());
    }

    #[test]
    fn test_validate_link_url() {
        assert!(validate_link_url("https://x/3").is_ok());
        assert!(validate_link_url("http://example.com/path?q=1").is_ok());

        assert!(validate_link_url("javascript:alert(1)").is_err());
        assert!(validate_link_url("file:///etc/passwd").is_err());
        assert!(validate_link_url("mailto:a@example.com").is_err());
        assert!(validate_link_url("not a url").is_err());
    }

    #[tokio::test]
    async fn test_log_only_handler_records_intent() {
        let mut handler = LogOnlyHandler::new();
        let timeout = Duration::from_secs(1);

        assert!(handler.login_to_platform("me", "secret").await.is_success());
        assert!(handler.open("https://x/1", timeout).await.is_success());
        assert!(handler.click_by_label("Accept", timeout).await.is_success());
        handler.close().await;
        handler.close().await;

        assert_eq!(handler.opened(), ["https://x/1".to_string()]);
        assert_eq!(handler.clicked(), ["Accept".to_string()]);
    }

    #[tokio::test]
    async fn test_system_browser_cannot_click() {
        let mut handler = SystemBrowserHandler::new(None);

        let outcome = handler.click_by_label("Accept", Duration::from_secs(1)).await;
        assert_eq!(outcome, ActionOutcome::Unsupported);

        let outcome = handler.login_to_platform("me", "secret").await;
        assert_eq!(outcome, ActionOutcome::Completed);
    }
}
