use crate::error::{BrowserError, Result};
use crate::network::RequestObserver;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Cookie visible to the automated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
}

/// One isolated tab inside the shared authenticated session.
#[async_trait::async_trait]
pub trait PageSession: Send + Sync {
    /// Navigate to a URL and wait for the load to finish
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Serialized HTML of the current document
    async fn content(&self) -> Result<String>;

    /// Evaluate a JavaScript expression and return its JSON value
    /// (`Null` for `undefined`)
    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value>;

    /// Click an element by selector
    async fn click(&self, selector: &str) -> Result<()>;

    /// Wait for a selector to appear
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()>;

    /// Cookies of the shared session
    async fn cookies(&self) -> Result<Vec<SessionCookie>>;

    /// Install cookies into the shared session
    async fn set_cookies(&self, cookies: &[SessionCookie]) -> Result<()>;

    /// Register an observer on this page's network traffic
    fn observe_network(&self) -> RequestObserver;

    /// Close the tab
    async fn close(&self) -> Result<()>;
}

/// Factory for tabs that share one browser profile.
#[async_trait::async_trait]
pub trait PageAutomation: Send + Sync {
    /// Open a new tab in the shared session
    async fn open_page(&self) -> Result<Arc<dyn PageSession>>;

    /// Close the browser
    async fn shutdown(&self) -> Result<()>;
}

/// Run `operation` under a deadline, mapping expiry to [`BrowserError::Timeout`].
pub async fn with_timeout<T, F>(what: &str, timeout: Duration, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(BrowserError::Timeout(format!("{what} exceeded {timeout:?}"))),
    }
}

/// Render cookies as a `Cookie` header value.
pub fn cookie_header(cookies: &[SessionCookie]) -> String {
    cookies
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}
