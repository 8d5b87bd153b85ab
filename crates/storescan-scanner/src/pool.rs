//! Agent pool.
//!
//! Every agent is one tab in the shared browser profile, so a location switch
//! made through any tab applies to all of them while navigation state stays
//! per tab.

use crate::context::SessionContext;
use crate::error::{Result, ScanError};
use crate::token::TokenManager;
use futures::future::join_all;
use std::sync::{Arc, Mutex};
use storescan_browser::{with_timeout, PageAutomation, PageSession};
use storescan_core::LocationCode;

/// One persistent automated session.
pub struct Agent {
    id: usize,
    page: Arc<dyn PageSession>,
}

impl Agent {
    /// Agent id, stable for the run.
    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    /// The agent's tab.
    #[must_use]
    pub fn page(&self) -> &dyn PageSession {
        self.page.as_ref()
    }
}

/// Bookkeeping view of an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentStatus {
    pub id: usize,
    pub assigned_location: Option<LocationCode>,
    pub busy: bool,
}

/// Fixed-size pool of agents for one run.
pub struct AgentPool {
    automation: Arc<dyn PageAutomation>,
    agents: Vec<Arc<Agent>>,
    status: Mutex<Vec<AgentStatus>>,
    creation_failures: Vec<ScanError>,
}

impl AgentPool {
    /// Create up to `n` agents.
    ///
    /// Each agent registers its passive token observer and then loads the
    /// entry page. Agents that fail are dropped and the pool runs smaller;
    /// only a pool with no agents at all is an error.
    pub async fn initialize(
        automation: Arc<dyn PageAutomation>,
        n: usize,
        tokens: &TokenManager,
        ctx: &SessionContext,
    ) -> Result<Self> {
        let entry_url = ctx.config().site.entry_url();
        let timeout = ctx.navigation_timeout();

        let attempts = (0..n).map(|id| {
            let automation = Arc::clone(&automation);
            let entry_url = entry_url.clone();
            async move {
                let page = automation
                    .open_page()
                    .await
                    .map_err(|e| ScanError::AgentCreation {
                        agent_id: id,
                        reason: e.to_string(),
                    })?;
                tokens.observe_passively(page.as_ref());
                if let Err(e) = with_timeout("entry navigation", timeout, page.navigate(&entry_url)).await {
                    if let Err(close_err) = page.close().await {
                        tracing::debug!("Closing failed agent {} tab: {}", id, close_err);
                    }
                    return Err(ScanError::AgentCreation {
                        agent_id: id,
                        reason: e.to_string(),
                    });
                }
                Ok(page)
            }
        });

        let mut agents = Vec::new();
        let mut creation_failures = Vec::new();
        for (id, outcome) in join_all(attempts).await.into_iter().enumerate() {
            match outcome {
                Ok(page) => agents.push(Arc::new(Agent { id, page })),
                Err(e) => {
                    tracing::warn!("{}", e);
                    creation_failures.push(e);
                }
            }
        }

        if agents.is_empty() {
            let reason = creation_failures
                .first()
                .map_or_else(|| "pool size is zero".to_string(), ToString::to_string);
            if let Err(e) = automation.shutdown().await {
                tracing::debug!("Shutdown after failed initialisation: {}", e);
            }
            ctx.abort_observers();
            return Err(ScanError::CapabilityUnavailable(format!(
                "no agents could be created ({reason})"
            )));
        }

        tracing::info!("Agent pool ready with {} of {} agents", agents.len(), n);

        let status = agents
            .iter()
            .map(|agent| AgentStatus {
                id: agent.id,
                assigned_location: None,
                busy: false,
            })
            .collect();

        Ok(Self {
            automation,
            agents,
            status: Mutex::new(status),
            creation_failures,
        })
    }

    /// Agents in id order.
    #[must_use]
    pub fn agents(&self) -> &[Arc<Agent>] {
        &self.agents
    }

    /// Number of live agents.
    #[must_use]
    pub fn size(&self) -> usize {
        self.agents.len()
    }

    /// Agent used to drive location switches.
    #[must_use]
    pub fn control(&self) -> &Arc<Agent> {
        // initialize() never returns an empty pool
        &self.agents[0]
    }

    /// Errors of agents that could not be created.
    #[must_use]
    pub fn creation_failures(&self) -> &[ScanError] {
        &self.creation_failures
    }

    /// Record that `agent_id` now works on `location`. Bookkeeping only.
    pub fn reassign(&self, agent_id: usize, location: &LocationCode) {
        self.update(agent_id, |status| {
            status.assigned_location = Some(location.clone());
        });
    }

    /// Reassign every agent to `location`.
    pub fn reassign_all(&self, location: &LocationCode) {
        for agent in &self.agents {
            self.reassign(agent.id, location);
        }
    }

    /// Mark an agent busy or idle.
    pub fn set_busy(&self, agent_id: usize, busy: bool) {
        self.update(agent_id, |status| status.busy = busy);
    }

    /// Snapshot of every agent's bookkeeping.
    #[must_use]
    pub fn status(&self) -> Vec<AgentStatus> {
        self.status.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn update(&self, agent_id: usize, f: impl FnOnce(&mut AgentStatus)) {
        if let Ok(mut status) = self.status.lock() {
            if let Some(entry) = status.iter_mut().find(|s| s.id == agent_id) {
                f(entry);
            }
        }
    }

    /// Close every tab, stop passive observers and shut the browser down.
    pub async fn teardown(&self, ctx: &SessionContext) {
        ctx.abort_observers();
        let closes = self.agents.iter().map(|agent| async move {
            if let Err(e) = agent.page.close().await {
                tracing::debug!("Closing agent {} tab: {}", agent.id, e);
            }
        });
        join_all(closes).await;

        if let Err(e) = self.automation.shutdown().await {
            tracing::warn!("Browser shutdown failed: {}", e);
        }
        tracing::info!("Agent pool torn down");
    }
}
