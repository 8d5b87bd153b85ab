//! Progress counters and caller callbacks.

use crate::switch::SwitchOutcome;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError, RwLock};
use storescan_core::{LocationCode, ProgressSnapshot, ScanResult};
use uuid::Uuid;

/// Event forwarded to registered callbacks.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ScanEvent {
    /// Work on a location partition begins
    LocationStarted(LocationCode),
    /// A location switch finished
    Switch {
        location: LocationCode,
        outcome: SwitchOutcome,
    },
    /// Counters after a task or a switch
    Progress(ProgressSnapshot),
    /// A task result was recorded
    Result(ScanResult),
    /// The run ended
    Finished(RunSummary),
}

/// Per-location result counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LocationSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// End-of-run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub total_items: usize,
    pub recorded: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub switches_settled: usize,
    pub switches_failed: usize,
    pub stopped: bool,
    pub duration_ms: u64,
    pub per_location: BTreeMap<LocationCode, LocationSummary>,
}

impl RunSummary {
    /// Tasks that never produced a result (only after a stop).
    #[must_use]
    pub fn unrecorded(&self) -> usize {
        self.total_items.saturating_sub(self.recorded)
    }
}

/// Callback receiving every [`ScanEvent`].
pub type EventCallback = Box<dyn Fn(&ScanEvent) + Send + Sync>;

#[derive(Default)]
struct ReporterState {
    snapshot: ProgressSnapshot,
    results: Vec<ScanResult>,
    switches: Vec<(LocationCode, SwitchOutcome)>,
}

/// Accumulates results and counters and forwards events to callbacks.
///
/// Recording never blocks on I/O and never fails. Callbacks run on the
/// recording task after the counters are updated.
#[derive(Default)]
pub struct ProgressReporter {
    state: Mutex<ReporterState>,
    callbacks: RwLock<Vec<EventCallback>>,
}

impl ProgressReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for every subsequent event.
    pub fn on_event(&self, callback: impl Fn(&ScanEvent) + Send + Sync + 'static) {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(callback));
    }

    /// Reset counters for a run of `total_items` tasks.
    pub fn begin(&self, total_items: usize) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = ReporterState {
            snapshot: ProgressSnapshot {
                total_items,
                ..ProgressSnapshot::default()
            },
            ..ReporterState::default()
        };
    }

    /// Work on `location` begins.
    pub fn record_location_start(&self, location: &LocationCode) {
        let snapshot = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.snapshot.current_location = Some(location.clone());
            state.snapshot.clone()
        };
        self.emit(&ScanEvent::LocationStarted(location.clone()));
        self.emit(&ScanEvent::Progress(snapshot));
    }

    /// A switch for `location` finished.
    pub fn record_switch(&self, location: &LocationCode, outcome: &SwitchOutcome) {
        let snapshot = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.switches.push((location.clone(), outcome.clone()));
            state.snapshot.clone()
        };
        self.emit(&ScanEvent::Switch {
            location: location.clone(),
            outcome: outcome.clone(),
        });
        self.emit(&ScanEvent::Progress(snapshot));
    }

    /// Append a task result.
    pub fn record_result(&self, result: ScanResult) {
        let snapshot = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.snapshot.items_processed += 1;
            if result.success {
                state.snapshot.success_count += 1;
            } else {
                state.snapshot.error_count += 1;
            }
            state.results.push(result.clone());
            state.snapshot.clone()
        };
        self.emit(&ScanEvent::Result(result));
        self.emit(&ScanEvent::Progress(snapshot));
    }

    /// Build the summary of everything recorded since [`begin`](Self::begin).
    #[must_use]
    pub fn summary(&self, run_id: Uuid, stopped: bool, duration_ms: u64) -> RunSummary {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut per_location: BTreeMap<LocationCode, LocationSummary> = BTreeMap::new();
        for result in &state.results {
            let entry = per_location.entry(result.location_code.clone()).or_default();
            if result.success {
                entry.succeeded += 1;
            } else {
                entry.failed += 1;
            }
        }
        let switches_settled = state
            .switches
            .iter()
            .filter(|(_, outcome)| outcome.is_settled())
            .count();

        RunSummary {
            run_id,
            total_items: state.snapshot.total_items,
            recorded: state.results.len(),
            succeeded: state.snapshot.success_count,
            failed: state.snapshot.error_count,
            switches_settled,
            switches_failed: state.switches.len() - switches_settled,
            stopped,
            duration_ms,
            per_location,
        }
    }

    /// Emit the end-of-run event.
    pub fn finish(&self, summary: RunSummary) {
        self.emit(&ScanEvent::Finished(summary));
    }

    /// Current counters.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot
            .clone()
    }

    /// Results recorded so far, in recording order.
    #[must_use]
    pub fn results(&self) -> Vec<ScanResult> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .results
            .clone()
    }

    /// Switch outcomes recorded so far.
    #[must_use]
    pub fn switch_events(&self) -> Vec<(LocationCode, SwitchOutcome)> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .switches
            .clone()
    }

    fn emit(&self, event: &ScanEvent) {
        let callbacks = self.callbacks.read().unwrap_or_else(PoisonError::into_inner);
        for callback in callbacks.iter() {
            callback(event);
        }
    }
}
