//! Scan orchestrator.
//!
//! Drives one run: build the agent pool, then for each location partition
//! switch the session, expose the partition and let every agent claim tasks
//! until it is drained. Failures are recorded per task or per partition; only
//! an unusable page-automation capability aborts the run.

use crate::collaborators::{ReportExporter, WorkList};
use crate::context::SessionContext;
use crate::error::{Result, ScanError};
use crate::extract::{DocumentSnapshot, ExtractionPipeline};
use crate::pool::{Agent, AgentPool};
use crate::queue::TaskQueue;
use crate::reporter::{ProgressReporter, ScanEvent};
use crate::retry::{pace, retry_with_backoff};
use crate::switch::StoreSwitcher;
use crate::token::TokenManager;
use futures::future::join_all;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use storescan_browser::{with_timeout, BrowserError, PageAutomation, PrivilegedClient};
use storescan_core::{LocationCode, ScanResult, ScanTask};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Failure reason recorded for every task of a partition whose switch failed.
pub const SWITCH_FAILED: &str = "location switch failed";

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Orchestrates a scan run across locations and agents.
pub struct ScanOrchestrator {
    ctx: Arc<SessionContext>,
    automation: Arc<dyn PageAutomation>,
    tokens: Arc<TokenManager>,
    switcher: StoreSwitcher,
    pipeline: ExtractionPipeline,
    reporter: Arc<ProgressReporter>,
    exporter: Option<Arc<dyn ReportExporter>>,
}

impl ScanOrchestrator {
    /// Create an orchestrator over the given capabilities.
    pub fn new(
        ctx: Arc<SessionContext>,
        automation: Arc<dyn PageAutomation>,
        client: Arc<dyn PrivilegedClient>,
    ) -> Result<Self> {
        let tokens = Arc::new(TokenManager::new(Arc::clone(&ctx))?);
        let switcher = StoreSwitcher::new(Arc::clone(&ctx), Arc::clone(&tokens), client);
        let pipeline = ExtractionPipeline::new(ctx.config().extraction.clone());
        Ok(Self {
            ctx,
            automation,
            tokens,
            switcher,
            pipeline,
            reporter: Arc::new(ProgressReporter::new()),
            exporter: None,
        })
    }

    /// Hand the final results to `exporter` when a run completes.
    #[must_use]
    pub fn with_exporter(mut self, exporter: Arc<dyn ReportExporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    /// Shared run context.
    #[must_use]
    pub fn context(&self) -> &Arc<SessionContext> {
        &self.ctx
    }

    /// Progress reporter.
    #[must_use]
    pub fn reporter(&self) -> &Arc<ProgressReporter> {
        &self.reporter
    }

    /// Location switch state machine.
    #[must_use]
    pub fn switcher(&self) -> &StoreSwitcher {
        &self.switcher
    }

    /// Token manager.
    #[must_use]
    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Register a callback for progress, switch and result events.
    pub fn on_event(&self, callback: impl Fn(&ScanEvent) + Send + Sync + 'static) {
        self.reporter.on_event(callback);
    }

    /// Request a graceful stop: in-flight tasks finish, nothing new is claimed.
    pub fn stop_scan(&self) {
        self.ctx.request_stop();
    }

    /// Spawn the run and return a handle streaming its events.
    pub fn start_scan(self: Arc<Self>, work: WorkList) -> ScanHandle {
        let (tx, events) = mpsc::unbounded_channel();
        let sender = Arc::new(Mutex::new(Some(tx)));

        let forward = Arc::clone(&sender);
        self.reporter.on_event(move |event| {
            if let Ok(guard) = forward.lock() {
                if let Some(tx) = guard.as_ref() {
                    // Receiver dropped means the caller stopped listening.
                    let _ = tx.send(event.clone());
                }
            }
        });

        let stop = self.ctx.stop_token();
        let task = tokio::spawn(async move {
            let outcome = self.run(work).await;
            if let Ok(mut guard) = sender.lock() {
                guard.take();
            }
            outcome
        });

        ScanHandle { events, stop, task }
    }

    /// Execute a run to completion and return every recorded result.
    pub async fn run(&self, work: WorkList) -> Result<Vec<ScanResult>> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let queue = TaskQueue::new(work.tasks.clone(), self.ctx.stop_token());
        self.reporter.begin(queue.total());

        tracing::info!(
            "Scan run {} starting: {} items across {} locations",
            run_id,
            queue.total(),
            queue.locations().len()
        );
        for location in work.unmapped_locations() {
            tracing::warn!("Location {} has no store id and will be skipped", location);
        }

        if queue.total() > 0 {
            let pool = match AgentPool::initialize(
                Arc::clone(&self.automation),
                self.ctx.config().scanning.agents,
                &self.tokens,
                &self.ctx,
            )
            .await
            {
                Ok(pool) => pool,
                Err(e) => {
                    tracing::error!("Scan run {} aborted: {}", run_id, e);
                    return Err(e);
                }
            };
            if !pool.creation_failures().is_empty() {
                tracing::warn!(
                    "Scan run {} continues with {} agents; {} could not be created",
                    run_id,
                    pool.size(),
                    pool.creation_failures().len()
                );
            }

            self.process_partitions(&pool, &queue, &work).await;
            pool.teardown(&self.ctx).await;
        }

        let results = self.reporter.results();
        let summary = self
            .reporter
            .summary(run_id, self.ctx.is_stopped(), elapsed_ms(started));
        tracing::info!(
            "Scan run {} finished in {} ms: {} succeeded, {} failed, {} not processed",
            run_id,
            summary.duration_ms,
            summary.succeeded,
            summary.failed,
            summary.unrecorded()
        );
        for (location, counts) in &summary.per_location {
            tracing::debug!(
                "  {}: {} succeeded, {} failed",
                location,
                counts.succeeded,
                counts.failed
            );
        }
        self.reporter.finish(summary);

        if let Some(exporter) = &self.exporter {
            match exporter.export(&results) {
                Ok(()) => tracing::info!("Exported {} results", results.len()),
                Err(e) => tracing::error!("Report export failed: {}", e),
            }
        }

        Ok(results)
    }

    async fn process_partitions(&self, pool: &AgentPool, queue: &TaskQueue, work: &WorkList) {
        for location in queue.locations() {
            if self.ctx.is_stopped() {
                tracing::info!("Stop flag set, not starting location {}", location);
                break;
            }
            self.reporter.record_location_start(&location);

            let Some(location_id) = work.location_id(&location) else {
                let reason = format!("{SWITCH_FAILED}: no store id mapped for {location}");
                self.fail_partition(queue, &location, &reason);
                continue;
            };

            let outcome = self
                .switcher
                .switch_to(pool.control().page(), &location, location_id)
                .await;
            self.reporter.record_switch(&location, &outcome);
            if !outcome.is_settled() {
                self.fail_partition(queue, &location, SWITCH_FAILED);
                continue;
            }

            queue.expose(&location);
            pool.reassign_all(&location);
            let workers = pool
                .agents()
                .iter()
                .map(|agent| self.agent_loop(pool, queue, &location, agent));
            join_all(workers).await;
            tracing::info!("Location {} complete", location);
        }
    }

    fn fail_partition(&self, queue: &TaskQueue, location: &LocationCode, reason: &str) {
        let skipped = queue.drain_unclaimed(location);
        tracing::warn!(
            "Skipping {} tasks at location {}: {}",
            skipped.len(),
            location,
            reason
        );
        for task in skipped {
            self.reporter
                .record_result(ScanResult::failure(&task, reason, 0, None));
        }
    }

    async fn agent_loop(
        &self,
        pool: &AgentPool,
        queue: &TaskQueue,
        location: &LocationCode,
        agent: &Agent,
    ) {
        let stop = self.ctx.stop_token();
        let delay = Duration::from_millis(self.ctx.config().scanning.item_delay_ms);

        while let Some(task) = queue.claim_next(location) {
            pool.set_busy(agent.id(), true);
            let result = self.process_task(agent, &task).await;
            pool.set_busy(agent.id(), false);
            self.reporter.record_result(result);

            if stop.is_cancelled() {
                break;
            }
            pace(delay, &stop).await;
        }
    }

    async fn process_task(&self, agent: &Agent, task: &ScanTask) -> ScanResult {
        let started = Instant::now();
        let config = self.ctx.config();
        let timeout = self.ctx.navigation_timeout();
        let stop = self.ctx.stop_token();
        let url = config.site.item_url(task.item_id.as_str());
        let page = agent.page();

        let url_ref = &url;
        let loaded = retry_with_backoff(
            || {
                with_timeout("item page load", timeout, async move {
                    page.navigate(url_ref).await?;
                    page.content().await
                })
            },
            config.scanning.item_retries.saturating_add(1),
            Duration::from_millis(config.scanning.retry_delay_ms),
            &stop,
        )
        .await;

        let html = match loaded {
            Ok(html) => html,
            Err(e) => {
                let error = match e {
                    BrowserError::Timeout(_) => ScanError::Timeout {
                        operation: format!("item page load for {}", task.item_id),
                    },
                    other => ScanError::from(other),
                };
                tracing::warn!("Agent {} failed on {}: {}", agent.id(), task.item_id, error);
                return ScanResult::failure(task, error.to_string(), elapsed_ms(started), Some(agent.id()));
            }
        };

        let extraction = self.pipeline.extract(&DocumentSnapshot::new(url.as_str(), html));
        if extraction.is_empty() {
            let error = ScanError::TaskExtraction {
                item_id: task.item_id.clone(),
                reason: "no catalog identifiers found".to_string(),
            };
            tracing::warn!("Agent {}: {}", agent.id(), error);
            return ScanResult::failure(task, error.to_string(), elapsed_ms(started), Some(agent.id()));
        }

        let mut fields = extraction.to_fields();
        fields.insert("item_name".to_string(), json!(task.item_name));
        fields.insert("url".to_string(), json!(url));
        tracing::debug!(
            "Agent {} scanned {} at {} ({} identifiers)",
            agent.id(),
            task.item_id,
            task.location_code,
            extraction.records.len()
        );
        ScanResult::success(task, fields, elapsed_ms(started), agent.id())
    }
}

/// Handle to a spawned run.
pub struct ScanHandle {
    events: mpsc::UnboundedReceiver<ScanEvent>,
    stop: CancellationToken,
    task: JoinHandle<Result<Vec<ScanResult>>>,
}

impl ScanHandle {
    /// Next event; `None` once the run has finished and every event was read.
    pub async fn next_event(&mut self) -> Option<ScanEvent> {
        self.events.recv().await
    }

    /// Request a graceful stop.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// The run's stop flag, e.g. for a signal handler.
    #[must_use]
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Wait for the run and return its results.
    pub async fn wait(self) -> Result<Vec<ScanResult>> {
        self.task
            .await
            .map_err(|e| ScanError::CapabilityUnavailable(format!("scan task ended abnormally: {e}")))?
    }
}
