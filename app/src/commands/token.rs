use crate::cli::FallbackSetting;
use anyhow::Context;
use chrono::Utc;
use std::fmt;
use storescan_core::{AppConfig, KeyValueStore, SessionToken};
use storescan_scanner::{TOKEN_CACHE_KEY, USE_FALLBACK_KEY};

/// Cached token as seen from the command line.
#[derive(Debug, Clone)]
pub struct TokenStatus {
    pub token: SessionToken,
    pub age: chrono::Duration,
    pub fresh: bool,
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (via {}, captured {}, {}h{:02}m ago, {})",
            mask(&self.token.value),
            self.token.source,
            self.token.captured_at.to_rfc3339(),
            self.age.num_hours(),
            self.age.num_minutes() % 60,
            if self.fresh { "fresh" } else { "stale" }
        )
    }
}

/// Keep the first few characters so tokens can be told apart in a terminal.
pub fn mask(value: &str) -> String {
    let visible: String = value.chars().take(6).collect();
    if visible.len() == value.len() {
        visible
    } else {
        format!("{visible}…")
    }
}

/// Read the cached token, fresh or not.
pub async fn status(
    storage: &dyn KeyValueStore,
    config: &AppConfig,
) -> anyhow::Result<Option<TokenStatus>> {
    let Some(value) = storage
        .get(TOKEN_CACHE_KEY)
        .await
        .context("failed to read token cache")?
    else {
        return Ok(None);
    };
    let token: SessionToken =
        serde_json::from_value(value).context("token cache entry is malformed")?;

    let now = Utc::now();
    let max_age = chrono::Duration::hours(i64::from(config.token.freshness_hours));
    Ok(Some(TokenStatus {
        age: token.age(now),
        fresh: token.is_fresh(now, max_age),
        token,
    }))
}

/// Delete the cached token so the next run re-acquires one.
pub async fn clear(storage: &dyn KeyValueStore) -> anyhow::Result<()> {
    storage
        .delete(TOKEN_CACHE_KEY)
        .await
        .context("failed to clear token cache")
}

/// Persist or remove the fallback override.
pub async fn set_fallback(
    storage: &dyn KeyValueStore,
    setting: FallbackSetting,
) -> anyhow::Result<()> {
    let result = match setting {
        FallbackSetting::On => storage.set(USE_FALLBACK_KEY, serde_json::json!(true)).await,
        FallbackSetting::Off => storage.set(USE_FALLBACK_KEY, serde_json::json!(false)).await,
        FallbackSetting::Default => storage.delete(USE_FALLBACK_KEY).await,
    };
    result.context("failed to update fallback override")
}
