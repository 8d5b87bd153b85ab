//! Run-scoped shared state.
//!
//! Everything the components would otherwise keep in process-wide globals
//! lives in one [`SessionContext`] that is passed explicitly to each of them.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use storescan_core::{AppConfig, KeyValueStore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Shared state of one scan run.
pub struct SessionContext {
    config: Arc<AppConfig>,
    storage: Arc<dyn KeyValueStore>,
    passive_token: RwLock<Option<String>>,
    stop: CancellationToken,
    observers: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionContext {
    /// Create a context for a new run.
    #[must_use]
    pub fn new(config: AppConfig, storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            config: Arc::new(config),
            storage,
            passive_token: RwLock::new(None),
            stop: CancellationToken::new(),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Run configuration.
    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Durable storage handle.
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn KeyValueStore> {
        &self.storage
    }

    /// Timeout applied to every navigation and network operation.
    #[must_use]
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.config.scanning.navigation_timeout_secs)
    }

    /// Cooperative stop flag shared with the caller.
    #[must_use]
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Set the stop flag.
    pub fn request_stop(&self) {
        if !self.stop.is_cancelled() {
            tracing::info!("Stop requested");
        }
        self.stop.cancel();
    }

    /// Whether the stop flag is set.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Record a passively observed token. Only the first capture is kept.
    pub fn record_passive_token(&self, value: &str) -> bool {
        let Ok(mut slot) = self.passive_token.write() else {
            return false;
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(value.to_string());
        true
    }

    /// Passively observed token, if one was seen.
    #[must_use]
    pub fn passive_token(&self) -> Option<String> {
        self.passive_token.read().ok().and_then(|slot| slot.clone())
    }

    /// Forget the passively observed token.
    pub fn clear_passive_token(&self) {
        if let Ok(mut slot) = self.passive_token.write() {
            *slot = None;
        }
    }

    /// Keep a passive observer task so it can be aborted at teardown.
    pub fn track_observer(&self, handle: JoinHandle<()>) {
        if let Ok(mut observers) = self.observers.lock() {
            observers.retain(|h| !h.is_finished());
            observers.push(handle);
        }
    }

    /// Number of observer tasks still running.
    #[must_use]
    pub fn active_observers(&self) -> usize {
        self.observers
            .lock()
            .map(|observers| observers.iter().filter(|h| !h.is_finished()).count())
            .unwrap_or(0)
    }

    /// Abort every passive observer.
    pub fn abort_observers(&self) {
        if let Ok(mut observers) = self.observers.lock() {
            for handle in observers.drain(..) {
                handle.abort();
            }
        }
    }
}
