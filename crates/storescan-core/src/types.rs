//! Shared types used across storescan.
//!
//! Newtypes validate identifiers at construction; records (`ScanTask`,
//! `ScanResult`, `ProgressSnapshot`, `SessionToken`) are plain serializable data.

use crate::error::StoreScanError;
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// Newtype for location (store) codes.
///
/// Codes are 1-32 characters of ASCII letters, digits, `-` or `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationCode(String);

impl LocationCode {
    /// Create a new `LocationCode` from a string.
    ///
    /// # Errors
    /// Returns error if the code is empty, too long or contains other characters.
    pub fn new(code: impl Into<String>) -> Result<Self, StoreScanError> {
        let code = code.into().trim().to_string();
        static CODE_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex =
            CODE_REGEX.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,32}$").expect("valid regex"));

        if regex.is_match(&code) {
            Ok(Self(code))
        } else {
            Err(StoreScanError::Validation(format!(
                "invalid location code: must be 1-32 alphanumeric characters, got '{code}'"
            )))
        }
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Numeric store identifier sent in the switch request body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocationId(String);

impl LocationId {
    /// Create a new `LocationId`.
    ///
    /// # Errors
    /// Returns error unless the id is a non-empty string of ASCII digits.
    pub fn new(id: impl Into<String>) -> Result<Self, StoreScanError> {
        let id = id.into().trim().to_string();
        if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
            Ok(Self(id))
        } else {
            Err(StoreScanError::Validation(format!(
                "invalid location id: must be numeric, got '{id}'"
            )))
        }
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Catalog item identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(String);

impl ItemId {
    /// Create a new `ItemId`.
    ///
    /// # Errors
    /// Returns error if the id is empty or contains whitespace.
    pub fn new(id: impl Into<String>) -> Result<Self, StoreScanError> {
        let id = id.into().trim().to_string();
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(StoreScanError::Validation(format!(
                "invalid item id: must be non-empty without whitespace, got '{id}'"
            )));
        }
        Ok(Self(id))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unit of work: one item at one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanTask {
    /// Location the item is scanned at
    pub location_code: LocationCode,
    /// Item to load
    pub item_id: ItemId,
    /// Human-readable item name from the work list
    pub item_name: String,
}

impl ScanTask {
    /// Create a new task.
    #[must_use]
    pub fn new(location_code: LocationCode, item_id: ItemId, item_name: impl Into<String>) -> Self {
        Self {
            location_code,
            item_id,
            item_name: item_name.into(),
        }
    }
}

/// Outcome record for one claimed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Location the task belonged to
    pub location_code: LocationCode,
    /// Item that was scanned
    pub item_id: ItemId,
    /// Whether extraction produced data
    pub success: bool,
    /// Extracted fields (empty on failure)
    pub fields: BTreeMap<String, serde_json::Value>,
    /// Human-readable failure reason
    pub error: Option<String>,
    /// Wall time spent on the task
    pub timing_ms: u64,
    /// Agent that processed the task (`None` when the task never reached an agent)
    pub agent_id: Option<usize>,
}

impl ScanResult {
    /// Build a success record.
    #[must_use]
    pub fn success(
        task: &ScanTask,
        fields: BTreeMap<String, serde_json::Value>,
        timing_ms: u64,
        agent_id: usize,
    ) -> Self {
        Self {
            location_code: task.location_code.clone(),
            item_id: task.item_id.clone(),
            success: true,
            fields,
            error: None,
            timing_ms,
            agent_id: Some(agent_id),
        }
    }

    /// Build a failure record.
    #[must_use]
    pub fn failure(
        task: &ScanTask,
        reason: impl Into<String>,
        timing_ms: u64,
        agent_id: Option<usize>,
    ) -> Self {
        Self {
            location_code: task.location_code.clone(),
            item_id: task.item_id.clone(),
            success: false,
            fields: BTreeMap::new(),
            error: Some(reason.into()),
            timing_ms,
            agent_id,
        }
    }
}

/// Derived progress counters, emitted after each task and each switch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Location currently being processed
    pub current_location: Option<LocationCode>,
    /// Tasks with a recorded result
    pub items_processed: usize,
    /// Tasks in the run
    pub total_items: usize,
    /// Successful results
    pub success_count: usize,
    /// Failed results
    pub error_count: usize,
}

/// Where a session token was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
    /// Read back from durable storage
    Cache,
    /// Captured from in-flight traffic during unrelated navigation
    PassiveObservation,
    /// Captured from a request provoked through the location selector
    ProvokedInteraction,
    /// Found by scanning the loaded document
    DocumentScan,
    /// Statically configured fallback value
    StaticFallback,
}

impl fmt::Display for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cache => "cache",
            Self::PassiveObservation => "passive-observation",
            Self::ProvokedInteraction => "provoked-interaction",
            Self::DocumentScan => "document-scan",
            Self::StaticFallback => "static-fallback",
        };
        f.write_str(name)
    }
}

/// Anti-forgery credential required for privileged requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    /// Raw token value
    pub value: String,
    /// Capture time
    pub captured_at: DateTime<Utc>,
    /// Acquisition tier
    pub source: TokenSource,
}

impl SessionToken {
    /// Create a token captured now.
    #[must_use]
    pub fn captured(value: impl Into<String>, source: TokenSource) -> Self {
        Self {
            value: value.into(),
            captured_at: Utc::now(),
            source,
        }
    }

    /// Age of the token relative to `now`.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.captured_at)
    }

    /// A token is fresh while `now - captured_at < max_age`.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.age(now) < max_age
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_code_validation() {
        assert!(LocationCode::new("SEA-12").is_ok());
        assert!(LocationCode::new(" 0042 ").is_ok());
        assert!(LocationCode::new("").is_err());
        assert!(LocationCode::new("has space").is_err());
        assert!(LocationCode::new("x".repeat(33)).is_err());
    }

    #[test]
    fn test_location_code_trims() {
        let code = LocationCode::new(" 0042 ").expect("valid code");
        assert_eq!(code.as_str(), "0042");
        assert_eq!(code.to_string(), "0042");
    }

    #[test]
    fn test_location_id_numeric_only() {
        assert_eq!(LocationId::new("1234").expect("valid id").as_str(), "1234");
        assert!(LocationId::new("12a4").is_err());
        assert!(LocationId::new("").is_err());
    }

    #[test]
    fn test_item_id_validation() {
        assert!(ItemId::new("B00TEST123").is_ok());
        assert!(ItemId::new("   ").is_err());
        assert!(ItemId::new("two words").is_err());
    }

    #[test]
    fn test_scan_result_constructors() {
        let task = ScanTask::new(
            LocationCode::new("A1").expect("valid code"),
            ItemId::new("B00TEST123").expect("valid id"),
            "Test item",
        );

        let ok = ScanResult::success(&task, BTreeMap::new(), 12, 0);
        assert!(ok.success);
        assert_eq!(ok.agent_id, Some(0));
        assert!(ok.error.is_none());

        let failed = ScanResult::failure(&task, "location switch failed", 0, None);
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("location switch failed"));
        assert!(failed.fields.is_empty());
    }

    #[test]
    fn test_token_freshness_boundary() {
        let now = Utc::now();
        let mut token = SessionToken::captured("abc", TokenSource::DocumentScan);

        token.captured_at = now - Duration::hours(23);
        assert!(token.is_fresh(now, Duration::hours(24)));

        token.captured_at = now - Duration::hours(24);
        assert!(!token.is_fresh(now, Duration::hours(24)));
    }

    #[test]
    fn test_token_source_serde() {
        let json = serde_json::to_string(&TokenSource::PassiveObservation).expect("serialize");
        assert_eq!(json, "\"passive_observation\"");
        assert_eq!(TokenSource::StaticFallback.to_string(), "static-fallback");
    }
}
