//! Scripted fakes for the page-automation, privileged-request and storage
//! capabilities.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use storescan_browser::{
    BrowserError, NetworkEvent, NetworkTap, PageAutomation, PageSession, PrivilegedClient,
    RequestObserver, SessionCookie, SwitchRequest, SwitchResponse,
};
use storescan_core::{
    AppConfig, ItemId, KeyValueStore, LocationCode, LocationId, ScanTask, StoreScanError,
};
use storescan_scanner::WorkList;

pub const BASE_URL: &str = "https://shop.test";
pub const ENTRY_URL: &str = "https://shop.test/";
pub const HEADER: &str = "anti-csrftoken-a2z";

/// Config pointing at the fake site with pacing disabled.
pub fn test_config(agents: usize) -> AppConfig {
    let mut config = AppConfig::default();
    config.site.base_url = BASE_URL.to_string();
    config.site.alternate_url_template = None;
    config.scanning.agents = agents;
    config.scanning.navigation_timeout_secs = 5;
    config.scanning.item_delay_ms = 0;
    config.scanning.item_retries = 0;
    config.scanning.retry_delay_ms = 10;
    config
}

pub fn item_url(item: &str) -> String {
    format!("{BASE_URL}/dp/{item}")
}

/// Item page embedding a catalog payload with `ids`.
pub fn item_page(title: &str, ids: &[&str]) -> String {
    let ids = serde_json::to_string(ids).expect("serialize ids");
    format!(
        "<html><head><title>{title}</title></head><body>\
         <div data-catalog-state='{{\"itemIds\":{ids},\"title\":\"{title}\",\"price\":\"$4.99\"}}'></div>\
         </body></html>"
    )
}

/// Entry page carrying the token in a meta tag and both store ids as text.
pub fn entry_page_with_meta(token: &str) -> String {
    format!(
        "<html><head><meta name=\"{HEADER}\" content=\"{token}\"></head>\
         <body>Your store: 1001 1002</body></html>"
    )
}

pub const BARE_ENTRY: &str = "<html><head></head><body>Welcome</body></html>";

/// Work list: every item at every location.
pub fn work_list(locations: &[(&str, &str)], items: &[&str]) -> WorkList {
    let mut tasks = Vec::new();
    let mut mapping = HashMap::new();
    for (code, id) in locations {
        let code = LocationCode::new(*code).expect("valid location");
        mapping.insert(code.clone(), LocationId::new(*id).expect("valid id"));
        for item in items {
            tasks.push(ScanTask::new(
                code.clone(),
                ItemId::new(*item).expect("valid item"),
                format!("Item {item}"),
            ));
        }
    }
    WorkList::new(tasks, mapping)
}

/// What the fake site serves and how it behaves.
#[derive(Debug, Clone, Default)]
pub struct SiteScript {
    pub entry_html: String,
    pub pages: HashMap<String, String>,
    pub failing_urls: HashSet<String>,
    /// Token carried by the request issued when the entry page loads
    pub passive_token: Option<String>,
    /// Token carried by the request issued when the confirm control is clicked
    pub provoked_token: Option<String>,
    pub selectors: HashSet<String>,
    /// Global path fragment -> value returned by `evaluate`
    pub globals: HashMap<String, String>,
    /// Number of `open_page` calls that fail before pages open
    pub open_failures: usize,
}

impl SiteScript {
    pub fn with_entry(entry_html: impl Into<String>) -> Self {
        Self {
            entry_html: entry_html.into(),
            ..Self::default()
        }
    }

    pub fn with_item(mut self, item: &str, ids: &[&str]) -> Self {
        self.pages
            .insert(item_url(item), item_page(&format!("Item {item}"), ids));
        self
    }
}

/// Everything the fake pages were asked to do.
#[derive(Debug, Default)]
pub struct CallLog {
    pub navigations: Vec<(usize, String)>,
    pub clicks: Vec<String>,
    pub content_reads: usize,
    pub evaluations: Vec<String>,
    pub selector_waits: Vec<String>,
    pub installed_cookies: Vec<(usize, SessionCookie)>,
    pub closed: Vec<usize>,
}

impl CallLog {
    pub fn item_navigations(&self) -> usize {
        self.navigations
            .iter()
            .filter(|(_, url)| url.contains("/dp/"))
            .count()
    }

    pub fn dom_interactions(&self) -> usize {
        self.clicks.len() + self.content_reads + self.evaluations.len() + self.selector_waits.len()
    }
}

pub struct FakeBrowser {
    script: Arc<SiteScript>,
    pub log: Arc<Mutex<CallLog>>,
    opened: AtomicUsize,
    pub shutdowns: AtomicUsize,
}

impl FakeBrowser {
    pub fn new(script: SiteScript) -> Arc<Self> {
        Arc::new(Self {
            script: Arc::new(script),
            log: Arc::new(Mutex::new(CallLog::default())),
            opened: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
        })
    }

    /// A standalone page on this site, for component tests.
    pub fn page(&self) -> Arc<FakePage> {
        let id = self.opened.fetch_add(1, Ordering::SeqCst);
        Arc::new(FakePage {
            id,
            script: Arc::clone(&self.script),
            log: Arc::clone(&self.log),
            tap: NetworkTap::new(),
            current: Mutex::new(String::new()),
        })
    }

    pub fn log(&self) -> std::sync::MutexGuard<'_, CallLog> {
        self.log.lock().expect("log lock")
    }

    /// Pages opened or attempted so far.
    pub fn opened_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageAutomation for FakeBrowser {
    async fn open_page(&self) -> storescan_browser::Result<Arc<dyn PageSession>> {
        let attempt = self.opened.load(Ordering::SeqCst);
        if attempt < self.script.open_failures {
            self.opened.fetch_add(1, Ordering::SeqCst);
            return Err(BrowserError::ChromiumError("tab refused".to_string()));
        }
        Ok(self.page())
    }

    async fn shutdown(&self) -> storescan_browser::Result<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakePage {
    pub id: usize,
    script: Arc<SiteScript>,
    log: Arc<Mutex<CallLog>>,
    tap: NetworkTap,
    current: Mutex<String>,
}

impl FakePage {
    fn emit_token(&self, url: &str, token: &str) {
        self.tap.publish(NetworkEvent::request(
            url,
            "POST",
            vec![(HEADER.to_string(), token.to_string())],
        ));
    }
}

#[async_trait]
impl PageSession for FakePage {
    async fn navigate(&self, url: &str) -> storescan_browser::Result<()> {
        // Suspension point so agents interleave like real page loads.
        tokio::task::yield_now().await;
        self.log
            .lock()
            .expect("log lock")
            .navigations
            .push((self.id, url.to_string()));
        if self.script.failing_urls.contains(url) {
            return Err(BrowserError::NavigationError(format!("{url}: net::ERR_FAILED")));
        }
        *self.current.lock().expect("current lock") = url.to_string();
        if url == ENTRY_URL {
            if let Some(token) = &self.script.passive_token {
                self.emit_token(&format!("{BASE_URL}/api/metrics"), token);
            }
        }
        Ok(())
    }

    async fn content(&self) -> storescan_browser::Result<String> {
        self.log.lock().expect("log lock").content_reads += 1;
        let current = self.current.lock().expect("current lock").clone();
        Ok(self
            .script
            .pages
            .get(&current)
            .cloned()
            .unwrap_or_else(|| self.script.entry_html.clone()))
    }

    async fn evaluate(&self, expression: &str) -> storescan_browser::Result<Value> {
        self.log
            .lock()
            .expect("log lock")
            .evaluations
            .push(expression.to_string());
        Ok(self
            .script
            .globals
            .iter()
            .find(|(path, _)| expression.contains(path.as_str()))
            .map_or(Value::Null, |(_, value)| Value::String(value.clone())))
    }

    async fn click(&self, selector: &str) -> storescan_browser::Result<()> {
        self.log
            .lock()
            .expect("log lock")
            .clicks
            .push(selector.to_string());
        if !self.script.selectors.contains(selector) {
            return Err(BrowserError::SelectorNotFound(selector.to_string()));
        }
        if selector == "#location-selector-confirm" {
            if let Some(token) = &self.script.provoked_token {
                self.emit_token(&format!("{BASE_URL}/location/api/preview"), token);
            }
        }
        Ok(())
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        _timeout: Duration,
    ) -> storescan_browser::Result<()> {
        self.log
            .lock()
            .expect("log lock")
            .selector_waits
            .push(selector.to_string());
        if self.script.selectors.contains(selector) {
            Ok(())
        } else {
            Err(BrowserError::Timeout(format!("selector {selector}")))
        }
    }

    async fn cookies(&self) -> storescan_browser::Result<Vec<SessionCookie>> {
        Ok(vec![SessionCookie {
            name: "session-id".to_string(),
            value: "fake-session".to_string(),
        }])
    }

    async fn set_cookies(&self, cookies: &[SessionCookie]) -> storescan_browser::Result<()> {
        let mut log = self.log.lock().expect("log lock");
        log.installed_cookies
            .extend(cookies.iter().map(|c| (self.id, c.clone())));
        Ok(())
    }

    fn observe_network(&self) -> RequestObserver {
        self.tap.subscribe()
    }

    async fn close(&self) -> storescan_browser::Result<()> {
        self.log.lock().expect("log lock").closed.push(self.id);
        Ok(())
    }
}

/// Privileged client answering with scripted statuses (200 once exhausted).
/// Successful answers carry `cookies`.
#[derive(Default)]
pub struct FakeClient {
    statuses: Mutex<VecDeque<u16>>,
    cookies: Vec<SessionCookie>,
    pub requests: Mutex<Vec<SwitchRequest>>,
}

impl FakeClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_statuses(statuses: &[u16]) -> Arc<Self> {
        Arc::new(Self {
            statuses: Mutex::new(statuses.iter().copied().collect()),
            ..Self::default()
        })
    }

    pub fn with_cookies(cookies: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            cookies: cookies
                .iter()
                .map(|(name, value)| SessionCookie {
                    name: (*name).to_string(),
                    value: (*value).to_string(),
                })
                .collect(),
            ..Self::default()
        })
    }

    pub fn push_status(&self, status: u16) {
        self.statuses
            .lock()
            .expect("statuses lock")
            .push_back(status);
    }

    pub fn requests(&self) -> Vec<SwitchRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl PrivilegedClient for FakeClient {
    async fn send_switch(
        &self,
        request: &SwitchRequest,
    ) -> storescan_browser::Result<SwitchResponse> {
        tokio::task::yield_now().await;
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        let status = self
            .statuses
            .lock()
            .expect("statuses lock")
            .pop_front()
            .unwrap_or(200);
        let cookies = if (200..300).contains(&status) {
            self.cookies.clone()
        } else {
            Vec::new()
        };
        Ok(SwitchResponse { status, cookies })
    }
}

/// Storage whose every operation fails.
pub struct FailingStore;

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, _key: &str) -> storescan_core::Result<Option<Value>> {
        Err(StoreScanError::Storage("disk unavailable".to_string()))
    }

    async fn set(&self, _key: &str, _value: Value) -> storescan_core::Result<()> {
        Err(StoreScanError::Storage("disk unavailable".to_string()))
    }

    async fn delete(&self, _key: &str) -> storescan_core::Result<()> {
        Err(StoreScanError::Storage("disk unavailable".to_string()))
    }
}
