//! Session token acquisition and caching.
//!
//! [`TokenManager::get_token`] walks five tiers in order and stops at the first
//! hit: `cache`, `passive-observation`, `provoked-interaction`,
//! `document-scan` and `static-fallback`. Every fresh capture is written back
//! to storage under [`TOKEN_CACHE_KEY`].

pub mod document;

use crate::context::SessionContext;
use crate::error::{Result, ScanError};
use crate::strategy::{run_async_chain, Attempt, AsyncStrategy, StrategyResult};
use chrono::Utc;
use document::InlinePatterns;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use storescan_browser::{with_timeout, PageSession};
use storescan_core::{SessionToken, TokenSource};

/// Storage key of the cached token.
pub const TOKEN_CACHE_KEY: &str = "token.session";

/// Storage key overriding `token.use_fallback`.
pub const USE_FALLBACK_KEY: &str = "token.use_fallback";

/// Fixed wait for the request provoked through the location selector.
pub const PROVOKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one acquisition, with the tier log.
#[derive(Debug, Clone)]
pub struct TokenAcquisition {
    /// Acquired token
    pub token: Option<SessionToken>,
    /// Tier attempts in order; document lookups appear as `document-scan/<name>`
    pub attempts: Vec<Attempt>,
}

impl TokenAcquisition {
    /// Names of the attempted tiers and lookups, in order.
    #[must_use]
    pub fn attempted(&self) -> Vec<&str> {
        self.attempts.iter().map(|a| a.strategy.as_str()).collect()
    }
}

/// Obtains and caches the anti-forgery token.
pub struct TokenManager {
    ctx: Arc<SessionContext>,
    patterns: InlinePatterns,
}

impl TokenManager {
    /// Create a manager for the context's token settings.
    pub fn new(ctx: Arc<SessionContext>) -> Result<Self> {
        let patterns = InlinePatterns::new(&ctx.config().token.header_name)
            .map_err(|e| ScanError::TokenAcquisition(format!("invalid header pattern: {e}")))?;
        Ok(Self { ctx, patterns })
    }

    /// Start recording the first token seen in `page`'s outgoing requests.
    ///
    /// Call before the page's first navigation. The observer runs until it
    /// captures a token or the context aborts it at teardown.
    pub fn observe_passively(&self, page: &dyn PageSession) {
        let mut observer = page.observe_network();
        let header = self.ctx.config().token.header_name.clone();
        let ctx = Arc::clone(&self.ctx);

        let handle = tokio::spawn(async move {
            while let Some(event) = observer.next_event().await {
                if let Some(value) = event.header(&header) {
                    if ctx.record_passive_token(value) {
                        tracing::debug!("Captured session token from passing traffic");
                    }
                    break;
                }
            }
        });
        self.ctx.track_observer(handle);
    }

    /// Best available token, or `None` when every tier fails. Never errors.
    pub async fn get_token(&self, page: &dyn PageSession) -> Option<SessionToken> {
        self.acquire(page).await.token
    }

    /// Run the tier chain and return the token with the attempt log.
    pub async fn acquire(&self, page: &dyn PageSession) -> TokenAcquisition {
        let mut document_attempts = Vec::new();

        let tiers: Vec<AsyncStrategy<'_, SessionToken>> = vec![
            ("cache", async { Ok(self.cached().await) }.boxed()),
            ("passive-observation", async { Ok(self.passive()) }.boxed()),
            ("provoked-interaction", self.provoke(page).boxed()),
            (
                "document-scan",
                self.scan_document(page, &mut document_attempts).boxed(),
            ),
            ("static-fallback", self.fallback().boxed()),
        ];

        let report = run_async_chain(tiers).await;

        let mut attempts = Vec::with_capacity(report.attempts.len() + document_attempts.len());
        for attempt in report.attempts {
            let is_document = attempt.strategy == "document-scan";
            attempts.push(attempt);
            if is_document {
                attempts.append(&mut document_attempts);
            }
        }

        match &report.value {
            Some(token) => {
                tracing::info!("Session token acquired via {}", token.source);
                if token.source != TokenSource::Cache {
                    self.persist(token).await;
                }
            }
            None => tracing::warn!("No session token available from any source"),
        }

        TokenAcquisition {
            token: report.value,
            attempts,
        }
    }

    /// Cached token if it is still fresh.
    pub async fn cached(&self) -> Option<SessionToken> {
        let value = match self.ctx.storage().get(TOKEN_CACHE_KEY).await {
            Ok(Some(value)) => value,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Could not read token cache: {}", e);
                return None;
            }
        };

        let token: SessionToken = match serde_json::from_value(value) {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!("Ignoring malformed token cache entry: {}", e);
                return None;
            }
        };

        let max_age = chrono::Duration::hours(i64::from(self.ctx.config().token.freshness_hours));
        if token.is_fresh(Utc::now(), max_age) {
            Some(SessionToken {
                source: TokenSource::Cache,
                ..token
            })
        } else {
            tracing::debug!(
                "Cached token is stale (captured {})",
                token.captured_at.to_rfc3339()
            );
            None
        }
    }

    /// Drop the cached and passively captured token so the next call re-acquires.
    pub async fn invalidate(&self) {
        self.ctx.clear_passive_token();
        if let Err(e) = self.ctx.storage().delete(TOKEN_CACHE_KEY).await {
            tracing::warn!("Could not clear token cache: {}", e);
        } else {
            tracing::debug!("Token cache invalidated");
        }
    }

    async fn persist(&self, token: &SessionToken) {
        let value = match serde_json::to_value(token) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Could not serialize token: {}", e);
                return;
            }
        };
        if let Err(e) = self.ctx.storage().set(TOKEN_CACHE_KEY, value).await {
            tracing::warn!("Could not persist token: {}", e);
        }
    }

    fn passive(&self) -> Option<SessionToken> {
        self.ctx
            .passive_token()
            .map(|value| SessionToken::captured(value, TokenSource::PassiveObservation))
    }

    async fn provoke(&self, page: &dyn PageSession) -> StrategyResult<SessionToken> {
        let token = &self.ctx.config().token;
        let timeout = self.ctx.navigation_timeout();
        let wait = timeout.min(PROVOKE_TIMEOUT);

        page.wait_for_selector(&token.location_selector, wait)
            .await
            .map_err(|e| format!("location selector: {e}"))?;
        page.click(&token.location_selector)
            .await
            .map_err(|e| format!("open location selector: {e}"))?;
        page.wait_for_selector(&token.confirm_selector, wait)
            .await
            .map_err(|e| format!("confirm control: {e}"))?;

        let mut observer = page.observe_network();
        with_timeout("confirm click", timeout, page.click(&token.confirm_selector))
            .await
            .map_err(|e| format!("confirm location: {e}"))?;

        Ok(observer
            .wait_for_header(&token.header_name, PROVOKE_TIMEOUT)
            .await
            .map(|value| SessionToken::captured(value, TokenSource::ProvokedInteraction)))
    }

    async fn scan_document(
        &self,
        page: &dyn PageSession,
        log: &mut Vec<Attempt>,
    ) -> StrategyResult<SessionToken> {
        let html = page.content().await.map_err(|e| e.to_string())?;
        let report =
            document::scan_document(page, &html, &self.ctx.config().token, &self.patterns).await;
        log.extend(report.attempts.into_iter().map(|attempt| {
            Attempt::new(format!("document-scan/{}", attempt.strategy), attempt.outcome)
        }));
        Ok(report
            .value
            .map(|value| SessionToken::captured(value, TokenSource::DocumentScan)))
    }

    async fn fallback(&self) -> StrategyResult<SessionToken> {
        let config = &self.ctx.config().token;
        let enabled = match self.ctx.storage().get(USE_FALLBACK_KEY).await {
            Ok(Some(value)) => value.as_bool().unwrap_or(config.use_fallback),
            Ok(None) => config.use_fallback,
            Err(e) => {
                tracing::warn!("Could not read fallback override: {}", e);
                config.use_fallback
            }
        };
        if !enabled {
            return Ok(None);
        }
        match config.fallback_token.as_deref().map(str::trim) {
            Some(value) if !value.is_empty() => Ok(Some(SessionToken::captured(
                value,
                TokenSource::StaticFallback,
            ))),
            _ => Err("fallback enabled but no fallback token configured".to_string()),
        }
    }
}
