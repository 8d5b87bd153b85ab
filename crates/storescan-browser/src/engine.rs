use crate::actions::{PageAutomation, PageSession, SessionCookie};
use crate::error::{BrowserError, Result};
use crate::fingerprint::FingerprintConfig;
use crate::network::{NetworkEvent, NetworkTap, RequestObserver};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, EnableParams, EventRequestWillBeSent, EventResponseReceived,
    SetUserAgentOverrideParams,
};
use chromiumoxide::Page;
use futures_util::stream::StreamExt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Poll interval while waiting for a selector.
const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Launch options for [`BrowserEngine`].
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub executable: Option<PathBuf>,
    pub user_agent: Option<String>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            executable: None,
            user_agent: None,
        }
    }
}

/// Browser automation engine.
///
/// All tabs opened through [`PageAutomation::open_page`] live in the default
/// browser context, so cookies (and therefore the active location) are shared.
pub struct BrowserEngine {
    browser: Mutex<Browser>,
    fingerprint: FingerprintConfig,
    handler: JoinHandle<()>,
}

impl BrowserEngine {
    /// Launch Chromium with the given options.
    pub async fn launch(options: LaunchOptions) -> Result<Self> {
        let fingerprint = FingerprintConfig::from_settings(
            options.user_agent.as_deref(),
            options.window_width,
            options.window_height,
        );

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(fingerprint.viewport_width, fingerprint.viewport_height);
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &options.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder.build().map_err(BrowserError::ChromiumError)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        // Spawn browser handler
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("Browser handler error: {}", e);
                }
            }
        });

        tracing::info!(
            "Browser launched (headless: {}, user agent: {})",
            options.headless,
            fingerprint.user_agent
        );

        Ok(Self {
            browser: Mutex::new(browser),
            fingerprint,
            handler,
        })
    }

    /// Create a new browser engine with default options
    pub async fn new() -> Result<Self> {
        Self::launch(LaunchOptions::default()).await
    }

    /// Identity every tab presents; privileged requests should reuse its user agent.
    pub fn fingerprint(&self) -> &FingerprintConfig {
        &self.fingerprint
    }

    async fn install_network_forwarding(page: &Page, tap: &NetworkTap) -> Result<Vec<JoinHandle<()>>> {
        page.execute(EnableParams::default())
            .await
            .map_err(|e| BrowserError::ChromiumError(format!("enable network domain: {e}")))?;

        let mut requests = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        let request_tap = tap.clone();
        let request_task = tokio::spawn(async move {
            while let Some(event) = requests.next().await {
                let headers = header_pairs(event.request.headers.inner());
                request_tap.publish(NetworkEvent::request(
                    event.request.url.clone(),
                    event.request.method.clone(),
                    headers,
                ));
            }
        });

        let response_tap = tap.clone();
        let response_task = tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                response_tap.publish(NetworkEvent::Response {
                    url: event.response.url.clone(),
                    status: u16::try_from(event.response.status).unwrap_or(0),
                });
            }
        });

        Ok(vec![request_task, response_task])
    }
}

#[async_trait::async_trait]
impl PageAutomation for BrowserEngine {
    async fn open_page(&self) -> Result<Arc<dyn PageSession>> {
        let page = {
            let browser = self.browser.lock().await;
            browser
                .new_page("about:blank")
                .await
                .map_err(|e| BrowserError::ChromiumError(e.to_string()))?
        };

        page.execute(SetUserAgentOverrideParams::new(
            self.fingerprint.user_agent.clone(),
        ))
        .await
        .map_err(|e| BrowserError::ChromiumError(format!("set user agent: {e}")))?;

        let tap = NetworkTap::new();
        let listeners = Self::install_network_forwarding(&page, &tap).await?;

        Ok(Arc::new(ChromiumPage {
            page,
            tap,
            listeners: StdMutex::new(listeners),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        browser
            .close()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        if let Err(e) = browser.wait().await {
            tracing::warn!("Browser process did not exit cleanly: {}", e);
        }
        self.handler.abort();
        tracing::info!("Browser closed");
        Ok(())
    }
}

/// One Chromium tab.
struct ChromiumPage {
    page: Page,
    tap: NetworkTap,
    listeners: StdMutex<Vec<JoinHandle<()>>>,
}

impl ChromiumPage {
    fn stop_listeners(&self) {
        if let Ok(mut listeners) = self.listeners.lock() {
            for listener in listeners.drain(..) {
                listener.abort();
            }
        }
    }
}

#[async_trait::async_trait]
impl PageSession for ChromiumPage {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| BrowserError::NavigationError(format!("{url}: {e}")))?;
        Ok(())
    }

    async fn content(&self) -> Result<String> {
        self.page
            .content()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))
    }

    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(expression)
            .await
            .map_err(|e| BrowserError::ScriptError(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::SelectorNotFound(selector.to_string()))?;
        element
            .click()
            .await
            .map_err(|e| BrowserError::ChromiumError(format!("click {selector}: {e}")))?;
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(BrowserError::Timeout(format!(
                    "selector {selector} not present after {timeout:?}"
                )));
            }
            tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    async fn cookies(&self) -> Result<Vec<SessionCookie>> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        Ok(cookies
            .into_iter()
            .map(|c| SessionCookie {
                name: c.name,
                value: c.value,
            })
            .collect())
    }

    async fn set_cookies(&self, cookies: &[SessionCookie]) -> Result<()> {
        // Cookies without a url are scoped to the page's current document.
        let params = cookies
            .iter()
            .map(|c| CookieParam::new(c.name.clone(), c.value.clone()))
            .collect();
        self.page
            .set_cookies(params)
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        Ok(())
    }

    fn observe_network(&self) -> RequestObserver {
        self.tap.subscribe()
    }

    async fn close(&self) -> Result<()> {
        self.stop_listeners();
        self.page
            .clone()
            .close()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))
    }
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        self.stop_listeners();
    }
}

/// Flatten a CDP header object into `(name, value)` pairs.
fn header_pairs(headers: &serde_json::Value) -> Vec<(String, String)> {
    headers
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(name, value)| value.as_str().map(|v| (name.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}
