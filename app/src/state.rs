//! Resolved configuration and storage for one invocation.

use anyhow::Context;
use std::path::{Path, PathBuf};
use storescan_core::{AppConfig, ConfigResult};
use storescan_db::Database;

/// Everything a command needs before it touches the browser.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Effective configuration (file, then `STORESCAN_*` overrides)
    pub config: AppConfig,
    /// File the configuration was read from (may not exist)
    pub config_path: PathBuf,
}

impl AppState {
    /// Load configuration from `config_path`, or the XDG default when `None`.
    pub fn load(config_path: Option<&Path>) -> ConfigResult<Self> {
        let config_path = match config_path {
            Some(path) => path.to_path_buf(),
            None => AppConfig::config_path()?,
        };
        let mut config = AppConfig::load_from(&config_path)?;
        config.apply_env_overrides();
        config.validate()?;

        tracing::debug!("Configuration resolved from {}", config_path.display());
        Ok(Self {
            config,
            config_path,
        })
    }

    /// State over an already-built configuration.
    pub fn with_config(config: AppConfig, config_path: impl Into<PathBuf>) -> Self {
        Self {
            config,
            config_path: config_path.into(),
        }
    }

    /// Open the durable store, creating and migrating it on first use.
    pub async fn open_storage(&self) -> anyhow::Result<Database> {
        let path = self
            .config
            .storage
            .resolve_database_path()
            .context("could not resolve database path")?;
        tracing::info!("Database: {}", path.display());
        Database::open(&path)
            .await
            .with_context(|| format!("failed to open database at {}", path.display()))
    }
}
