//! Storescan Scanner - per-location catalog scan orchestration.
//!
//! This crate is the engine of storescan. For every location in a work list it
//! activates the location on a shared browser session, then lets a pool of
//! agents load and extract every item of that location concurrently.
//!
//! # Components
//!
//! - [`queue`] - location-partitioned task queue with exactly-once claims
//! - [`pool`] - agent pool sharing one authenticated browser session
//! - [`token`] - anti-forgery token acquisition over five fallback tiers
//! - [`switch`] - serialized location switch state machine
//! - [`extract`] - multi-strategy identifier and field extraction
//! - [`reporter`] - progress counters and caller callbacks
//! - [`orchestrator`] - drives a run from work list to result set
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use storescan_scanner::{ScanOrchestrator, SessionContext};
//!
//! let ctx = Arc::new(SessionContext::new(config, storage));
//! let orchestrator = Arc::new(ScanOrchestrator::new(ctx, browser, client)?);
//!
//! let mut handle = orchestrator.start_scan(work_list);
//! while let Some(event) = handle.next_event().await {
//!     println!("{event:?}");
//! }
//! let results = handle.wait().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[allow(missing_docs)]
pub mod collaborators;
pub mod context;
#[allow(missing_docs)]
pub mod error;
pub mod extract;
pub mod orchestrator;
#[allow(missing_docs)]
pub mod pool;
pub mod queue;
#[allow(missing_docs)]
pub mod reporter;
pub mod retry;
pub mod strategy;
#[allow(missing_docs)]
pub mod switch;
pub mod token;

// Re-export commonly used types
pub use collaborators::{ReportExporter, WorkList, WorkListLoader};
pub use context::SessionContext;
pub use error::{Result, ScanError};
pub use extract::{DocumentSnapshot, Extraction, ExtractionPipeline, Record};
pub use orchestrator::{ScanHandle, ScanOrchestrator, SWITCH_FAILED};
pub use pool::{Agent, AgentPool, AgentStatus};
pub use queue::TaskQueue;
pub use reporter::{LocationSummary, ProgressReporter, RunSummary, ScanEvent};
pub use strategy::{Attempt, AttemptOutcome, StrategyChain, StrategyReport};
pub use switch::{StoreSwitcher, SwitchMethod, SwitchOutcome, SwitchPhase, SwitchState};
pub use token::{TokenAcquisition, TokenManager, PROVOKE_TIMEOUT, TOKEN_CACHE_KEY, USE_FALLBACK_KEY};
