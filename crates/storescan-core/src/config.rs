//! Configuration management for storescan.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration.
///
/// This is loaded from `~/.config/storescan/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Target site endpoints and URL templates
    pub site: SiteConfig,
    /// Session token acquisition settings
    pub token: TokenConfig,
    /// Worker pool and pacing settings
    pub scanning: ScanningConfig,
    /// Item page extraction settings
    pub extraction: ExtractionConfig,
    /// Browser automation settings
    pub browser: BrowserConfig,
    /// Durable storage settings
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path, falling back to defaults if missing.
    pub fn load_from(config_path: &Path) -> ConfigResult<Self> {
        if config_path.exists() {
            tracing::debug!("Loading config from {}", config_path.display());
            let contents = fs::read_to_string(config_path)?;
            let config: Self = toml::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `STORESCAN_AGENTS`: Override the agent pool size
    /// - `STORESCAN_HEADLESS`: Override browser headless mode (true/false)
    /// - `STORESCAN_USE_FALLBACK_TOKEN`: Override the static token fallback (true/false)
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `STORESCAN_*` environment overrides in place.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("STORESCAN_AGENTS") {
            if let Ok(agents) = val.parse() {
                self.scanning.agents = agents;
                tracing::debug!("Override scanning.agents from env: {}", agents);
            }
        }

        if let Ok(val) = std::env::var("STORESCAN_HEADLESS") {
            if let Ok(headless) = val.parse() {
                self.browser.headless = headless;
                tracing::debug!("Override browser.headless from env: {}", headless);
            }
        }

        if let Ok(val) = std::env::var("STORESCAN_USE_FALLBACK_TOKEN") {
            if let Ok(enabled) = val.parse() {
                self.token.use_fallback = enabled;
                tracing::debug!("Override token.use_fallback from env: {}", enabled);
            }
        }
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.scanning.agents == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scanning.agents".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.token.freshness_hours == 0 {
            return Err(ConfigError::InvalidValue {
                field: "token.freshness_hours".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if !self.site.item_url_template.contains("{item_id}") {
            return Err(ConfigError::InvalidValue {
                field: "site.item_url_template".to_string(),
                reason: "must contain the {item_id} placeholder".to_string(),
            });
        }
        if self.token.header_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "token.header_name".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Save configuration to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn save(&self) -> ConfigResult<()> {
        let config_path = Self::config_path()?;
        let config_dir = config_path
            .parent()
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "config_path".to_string(),
                reason: "no parent directory".to_string(),
            })?;

        fs::create_dir_all(config_dir)?;
        tracing::debug!("Saving config to {}", config_path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/storescan/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("com", "storescan", "storescan").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path.
    ///
    /// Uses XDG base directories: `~/.local/share/storescan`
    pub fn data_dir() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("com", "storescan", "storescan").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.data_dir().to_path_buf())
    }
}

/// Target site endpoints and URL templates.
///
/// Paths may be absolute URLs or paths relative to `base_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Site origin, e.g. `https://www.example.com`
    pub base_url: String,
    /// Baseline page every agent loads to establish the shared session
    pub entry_path: String,
    /// Item page template; `{item_id}` is substituted
    pub item_url_template: String,
    /// Endpoint receiving the privileged `PUT {"storeId": ...}` request
    pub switch_endpoint: String,
    /// Location-scoped page used when the privileged request fails;
    /// `{location_id}` and `{location_code}` are substituted
    pub alternate_url_template: Option<String>,
    /// Text expected in the entry page once a location is active;
    /// `{location_id}` and `{location_code}` are substituted
    pub verify_marker_template: Option<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.example.com".to_string(),
            entry_path: "/".to_string(),
            item_url_template: "/dp/{item_id}".to_string(),
            switch_endpoint: "/location/api/store".to_string(),
            alternate_url_template: Some("/stores/{location_id}".to_string()),
            verify_marker_template: Some("{location_id}".to_string()),
        }
    }
}

impl SiteConfig {
    /// Resolve a path or absolute URL against `base_url`.
    #[must_use]
    pub fn resolve(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    /// URL of the baseline entry page.
    #[must_use]
    pub fn entry_url(&self) -> String {
        self.resolve(&self.entry_path)
    }

    /// URL of an item page.
    #[must_use]
    pub fn item_url(&self, item_id: &str) -> String {
        self.resolve(&self.item_url_template.replace("{item_id}", item_id))
    }

    /// URL of the privileged switch endpoint.
    #[must_use]
    pub fn switch_url(&self) -> String {
        self.resolve(&self.switch_endpoint)
    }

    /// URL of the location-scoped alternate page, if configured.
    #[must_use]
    pub fn alternate_url(&self, location_code: &str, location_id: &str) -> Option<String> {
        self.alternate_url_template.as_ref().map(|template| {
            self.resolve(
                &template
                    .replace("{location_id}", location_id)
                    .replace("{location_code}", location_code),
            )
        })
    }

    /// Rendered verification marker, if configured.
    #[must_use]
    pub fn verify_marker(&self, location_code: &str, location_id: &str) -> Option<String> {
        self.verify_marker_template.as_ref().map(|template| {
            template
                .replace("{location_id}", location_id)
                .replace("{location_code}", location_code)
        })
    }
}

/// Session token acquisition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Anti-forgery header carrying the token on privileged requests
    pub header_name: String,
    /// `<meta name=...>` tags that may carry the token
    pub meta_names: Vec<String>,
    /// Element attributes that may carry the token
    pub data_attributes: Vec<String>,
    /// Global-state expressions evaluated in the page, e.g. `window.csrfToken`
    pub global_paths: Vec<String>,
    /// Hidden `<input>` names that may carry the token
    pub hidden_field_names: Vec<String>,
    /// Control that opens the location selector
    pub location_selector: String,
    /// Confirm control inside the revealed selector UI
    pub confirm_selector: String,
    /// Maximum cached token age in hours
    pub freshness_hours: u32,
    /// Whether to fall back to `fallback_token` when every strategy fails
    pub use_fallback: bool,
    /// Statically configured fallback credential
    pub fallback_token: Option<String>,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            header_name: "anti-csrftoken-a2z".to_string(),
            meta_names: vec!["anti-csrftoken-a2z".to_string(), "csrf-token".to_string()],
            data_attributes: vec![
                "data-anti-csrftoken-a2z".to_string(),
                "data-csrf-token".to_string(),
            ],
            global_paths: vec![
                "window.ue_csrf".to_string(),
                "window.csrfToken".to_string(),
                "window.__STATE__ && window.__STATE__.csrfToken".to_string(),
            ],
            hidden_field_names: vec![
                "anti-csrftoken-a2z".to_string(),
                "csrfToken".to_string(),
                "authenticity_token".to_string(),
            ],
            location_selector: "#location-selector-link".to_string(),
            confirm_selector: "#location-selector-confirm".to_string(),
            freshness_hours: 24,
            use_fallback: false,
            fallback_token: None,
        }
    }
}

/// Worker pool and pacing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanningConfig {
    /// Number of concurrent agents
    pub agents: usize,
    /// Timeout for every navigation and network operation, in seconds
    pub navigation_timeout_secs: u64,
    /// Pause after each item, in milliseconds (jittered by 25%)
    pub item_delay_ms: u64,
    /// Extra attempts for a failed item page load
    pub item_retries: u32,
    /// Base backoff between item page load attempts, in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for ScanningConfig {
    fn default() -> Self {
        Self {
            agents: 3,
            navigation_timeout_secs: 30,
            item_delay_ms: 1500,
            item_retries: 1,
            retry_delay_ms: 2000,
        }
    }
}

/// Item page extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// CSS selector of the element carrying the structured payload
    pub payload_selector: String,
    /// Attribute holding the JSON payload
    pub payload_attribute: String,
    /// Top-level payload key holding the primary identifier list
    pub primary_key: String,
    /// Dotted secondary payload locations checked after `primary_key`
    pub nested_paths: Vec<String>,
    /// Recursion limit for the exhaustive array search
    pub max_depth: usize,
    /// Payload keys tried for the item title
    pub title_keys: Vec<String>,
    /// Payload keys tried for the price
    pub price_keys: Vec<String>,
    /// Payload keys tried for availability
    pub availability_keys: Vec<String>,
    /// Payload keys tried for the variant count
    pub variant_count_keys: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            payload_selector: "[data-catalog-state]".to_string(),
            payload_attribute: "data-catalog-state".to_string(),
            primary_key: "itemIds".to_string(),
            nested_paths: vec![
                "params.itemIds".to_string(),
                "state.variations.itemIds".to_string(),
            ],
            max_depth: 12,
            title_keys: vec!["title".to_string(), "productTitle".to_string()],
            price_keys: vec!["price".to_string(), "displayPrice".to_string()],
            availability_keys: vec!["availability".to_string(), "stockStatus".to_string()],
            variant_count_keys: vec!["variantCount".to_string(), "numVariants".to_string()],
        }
    }
}

/// Browser automation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    pub headless: bool,
    /// Browser window width
    pub window_width: u32,
    /// Browser window height
    pub window_height: u32,
    /// Explicit Chromium executable; auto-detected when unset
    pub executable: Option<PathBuf>,
    /// Fixed user agent; randomized per run when unset
    pub user_agent: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            executable: None,
            user_agent: None,
        }
    }
}

/// Durable storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path; defaults to `<data dir>/storescan.db`
    pub database_path: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the effective database path.
    pub fn resolve_database_path(&self) -> ConfigResult<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(AppConfig::data_dir()?.join("storescan.db")),
        }
    }
}
