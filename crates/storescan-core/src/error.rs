//! Core error types for storescan.
//!
//! This module defines the central error type shared by the collaborator
//! contracts (storage, configuration). Each crate layers its own error enum on
//! top and converts into this one at the boundaries.

use thiserror::Error;

/// Central error type for storescan operations that cross crate boundaries.
#[derive(Error, Debug)]
pub enum StoreScanError {
    /// Configuration errors (file loading, parsing, validation)
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Durable storage errors (reads, writes, serialization)
    #[error("storage error: {0}")]
    Storage(String),

    /// Work-list loading errors (missing file, malformed rows)
    #[error("work list error: {0}")]
    WorkList(String),

    /// Report export errors
    #[error("export error: {0}")]
    Export(String),

    /// Validation errors (invalid input, constraints)
    #[error("validation error: {0}")]
    Validation(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to determine config directory path
    #[error("could not determine config directory (XDG base directories not available)")]
    NoConfigDir,

    /// Failed to parse TOML
    #[error("failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize config
    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// I/O error reading/writing config
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("invalid config value for {field}: {reason}")]
    InvalidValue {
        /// Field name
        field: String,
        /// Reason for invalidity
        reason: String,
    },
}

/// Result type alias using `StoreScanError`.
pub type Result<T> = std::result::Result<T, StoreScanError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
