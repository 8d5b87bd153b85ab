//! Location switch state machine.
//!
//! ```text
//! Idle -> Switching -> Verifying -> Settled
//!            |            |
//!            +-> Failed <-+
//!                  |
//!                  +-> (alternate navigation, once) -> Settled | Failed
//! ```
//!
//! The active location belongs to the whole browser session, so switches are
//! serialized: a second `switch_to` waits for the first to finish.

use crate::context::SessionContext;
use crate::error::{Result, ScanError};
use crate::token::TokenManager;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use storescan_browser::{with_timeout, BrowserError, PageSession, PrivilegedClient, SwitchRequest};
use storescan_core::{LocationCode, LocationId};

/// Switch phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SwitchPhase {
    Idle,
    Switching,
    Verifying,
    Settled,
    Failed,
}

/// Current phase and the location it refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwitchState {
    pub current: SwitchPhase,
    pub target: Option<LocationCode>,
}

/// How a settled switch was achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchMethod {
    /// Privileged `PUT` with the session token
    Privileged,
    /// Navigation to the location-scoped page
    AlternateNavigation,
}

/// Result of one `switch_to` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SwitchOutcome {
    Settled {
        method: SwitchMethod,
        /// Whether the entry page showed the location marker; `None` when inconclusive
        verified: Option<bool>,
    },
    Failed {
        reason: String,
    },
}

impl SwitchOutcome {
    /// Whether the switch settled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Settled { .. })
    }
}

/// One recorded transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwitchTransition {
    pub location: LocationCode,
    pub from: SwitchPhase,
    pub to: SwitchPhase,
}

/// Serializes location switches against the shared session.
pub struct StoreSwitcher {
    ctx: Arc<SessionContext>,
    tokens: Arc<TokenManager>,
    client: Arc<dyn PrivilegedClient>,
    in_flight: tokio::sync::Mutex<()>,
    state: Mutex<SwitchState>,
    transitions: Mutex<Vec<SwitchTransition>>,
}

impl StoreSwitcher {
    #[must_use]
    pub fn new(
        ctx: Arc<SessionContext>,
        tokens: Arc<TokenManager>,
        client: Arc<dyn PrivilegedClient>,
    ) -> Self {
        Self {
            ctx,
            tokens,
            client,
            in_flight: tokio::sync::Mutex::new(()),
            state: Mutex::new(SwitchState {
                current: SwitchPhase::Idle,
                target: None,
            }),
            transitions: Mutex::new(Vec::new()),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SwitchState {
        self.state.lock().map(|s| s.clone()).unwrap_or(SwitchState {
            current: SwitchPhase::Idle,
            target: None,
        })
    }

    /// Every transition so far, in order.
    #[must_use]
    pub fn transitions(&self) -> Vec<SwitchTransition> {
        self.transitions
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    /// Transitions recorded for one location.
    #[must_use]
    pub fn transitions_for(&self, location: &LocationCode) -> Vec<SwitchTransition> {
        self.transitions()
            .into_iter()
            .filter(|t| &t.location == location)
            .collect()
    }

    /// Make `location` the session's active location, using `page` to read
    /// the token and verify the result.
    pub async fn switch_to(
        &self,
        page: &dyn PageSession,
        location: &LocationCode,
        location_id: &LocationId,
    ) -> SwitchOutcome {
        let _guard = self.in_flight.lock().await;

        self.reset(location);
        self.transition(location, SwitchPhase::Switching);
        tracing::info!("Switching to location {} (store {})", location, location_id);

        let error = match self.privileged_switch(page, location, location_id).await {
            Ok(()) => {
                self.transition(location, SwitchPhase::Verifying);
                match self.verify(page, location, location_id).await {
                    Ok(verified) => {
                        self.transition(location, SwitchPhase::Settled);
                        return SwitchOutcome::Settled {
                            method: SwitchMethod::Privileged,
                            verified,
                        };
                    }
                    Err(e) => e,
                }
            }
            Err(e) => e,
        };

        tracing::warn!("Switch to {} failed: {}", location, error);
        self.transition(location, SwitchPhase::Failed);
        self.alternate(page, location, location_id, &error).await
    }

    fn reset(&self, location: &LocationCode) {
        if let Ok(mut state) = self.state.lock() {
            state.current = SwitchPhase::Idle;
            state.target = Some(location.clone());
        }
    }

    fn transition(&self, location: &LocationCode, to: SwitchPhase) {
        let from = match self.state.lock() {
            Ok(mut state) => std::mem::replace(&mut state.current, to),
            Err(_) => return,
        };
        tracing::debug!("Switch {}: {:?} -> {:?}", location, from, to);
        if let Ok(mut transitions) = self.transitions.lock() {
            transitions.push(SwitchTransition {
                location: location.clone(),
                from,
                to,
            });
        }
    }

    async fn privileged_switch(
        &self,
        page: &dyn PageSession,
        location: &LocationCode,
        location_id: &LocationId,
    ) -> Result<()> {
        let config = self.ctx.config();
        let timeout = self.ctx.navigation_timeout();
        let failed = |reason: String| ScanError::LocationSwitch {
            location: location.clone(),
            reason,
        };

        let token = self.tokens.get_token(page).await.ok_or_else(|| {
            ScanError::TokenAcquisition("no session token available".to_string())
        })?;

        let cookies = with_timeout("read cookies", timeout, page.cookies())
            .await
            .map_err(|e| failed(format!("read cookies: {e}")))?;

        let request = SwitchRequest {
            url: config.site.switch_url(),
            header_name: config.token.header_name.clone(),
            token: token.value,
            store_id: location_id.as_str().to_string(),
            cookies,
        };

        let response = with_timeout("switch request", timeout, self.client.send_switch(&request))
            .await
            .map_err(|e| failed(format!("switch request: {e}")))?;

        if !response.is_success() {
            // The token may have been rejected; make the next switch re-acquire.
            self.tokens.invalidate().await;
            return Err(failed(format!(
                "switch request returned HTTP {}",
                response.status
            )));
        }

        if !response.cookies.is_empty() {
            with_timeout("apply cookies", timeout, page.set_cookies(&response.cookies))
                .await
                .map_err(|e| failed(format!("apply session cookies: {e}")))?;
            tracing::debug!(
                "Applied {} cookies from the switch response",
                response.cookies.len()
            );
        }
        Ok(())
    }

    /// Best-effort check that the entry page reflects the new location.
    ///
    /// `Ok(None)` when inconclusive; only a lost page is an error.
    async fn verify(
        &self,
        page: &dyn PageSession,
        location: &LocationCode,
        location_id: &LocationId,
    ) -> Result<Option<bool>> {
        let site = &self.ctx.config().site;
        let Some(marker) = site.verify_marker(location.as_str(), location_id.as_str()) else {
            return Ok(None);
        };

        let timeout = self.ctx.navigation_timeout();
        let loaded = with_timeout("verification", timeout, async {
            page.navigate(&site.entry_url()).await?;
            page.content().await
        })
        .await;

        match loaded {
            Ok(html) => {
                let found = html.contains(&marker);
                if !found {
                    tracing::warn!("Location {} not confirmed on the entry page", location);
                }
                Ok(Some(found))
            }
            Err(BrowserError::PageClosed) => Err(ScanError::LocationSwitch {
                location: location.clone(),
                reason: "page closed during verification".to_string(),
            }),
            Err(e) => {
                tracing::warn!("Verification for {} inconclusive: {}", location, e);
                Ok(None)
            }
        }
    }

    /// Navigate to the location-scoped page, then require the entry page to
    /// show the location marker before settling.
    async fn alternate(
        &self,
        page: &dyn PageSession,
        location: &LocationCode,
        location_id: &LocationId,
        error: &ScanError,
    ) -> SwitchOutcome {
        let Some(url) = self
            .ctx
            .config()
            .site
            .alternate_url(location.as_str(), location_id.as_str())
        else {
            tracing::error!("Location {} could not be activated: {}", location, error);
            return SwitchOutcome::Failed {
                reason: error.to_string(),
            };
        };

        if self.ctx.is_stopped() {
            return SwitchOutcome::Failed {
                reason: error.to_string(),
            };
        }

        tracing::info!("Trying alternate navigation for {}: {}", location, url);
        let timeout = self.ctx.navigation_timeout();
        let attempt = match with_timeout("alternate navigation", timeout, page.navigate(&url)).await
        {
            Ok(()) => match self.verify(page, location, location_id).await {
                Ok(Some(true)) => Ok(()),
                Ok(Some(false)) => Err("location not confirmed on the entry page".to_string()),
                Ok(None) => Err("location could not be confirmed".to_string()),
                Err(e) => Err(e.to_string()),
            },
            Err(e) => Err(e.to_string()),
        };

        match attempt {
            Ok(()) => {
                self.transition(location, SwitchPhase::Settled);
                SwitchOutcome::Settled {
                    method: SwitchMethod::AlternateNavigation,
                    verified: Some(true),
                }
            }
            Err(alternate) => {
                tracing::error!(
                    "Location {} could not be activated: {}; alternate navigation: {}",
                    location,
                    error,
                    alternate
                );
                SwitchOutcome::Failed {
                    reason: format!("{error}; alternate navigation: {alternate}"),
                }
            }
        }
    }
}
