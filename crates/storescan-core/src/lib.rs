//! Storescan Core - Foundation crate for the storescan catalog scanner.
//!
//! This crate provides shared types, error handling, configuration management,
//! and the durable storage contract that all other storescan crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`types`] - Domain newtypes and records (`LocationCode`, `ScanTask`, `ScanResult`, `SessionToken`)
//! - [`storage`] - Durable key-value storage contract and an in-memory implementation
//!
//! # Example
//!
//! ```rust
//! use storescan_core::{AppConfig, LocationCode};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! assert_eq!(config.token.freshness_hours, 24);
//!
//! let code = LocationCode::new("SEA-12")?;
//! assert_eq!(code.as_str(), "SEA-12");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use config::{
    AppConfig, BrowserConfig, ExtractionConfig, ScanningConfig, SiteConfig, StorageConfig,
    TokenConfig,
};
pub use error::{ConfigError, ConfigResult, Result, StoreScanError};
pub use storage::{KeyValueStore, MemoryStore};
pub use types::{
    ItemId, LocationCode, LocationId, ProgressSnapshot, ScanResult, ScanTask, SessionToken,
    TokenSource,
};
