use storescan_core::{ItemId, LocationCode, StoreScanError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Token acquisition failed: {0}")]
    TokenAcquisition(String),

    #[error("Location switch failed for {location}: {reason}")]
    LocationSwitch {
        location: LocationCode,
        reason: String,
    },

    #[error("Extraction failed for item {item_id}: {reason}")]
    TaskExtraction { item_id: ItemId, reason: String },

    #[error("Agent {agent_id} could not be created: {reason}")]
    AgentCreation { agent_id: usize, reason: String },

    #[error("{operation} timed out")]
    Timeout { operation: String },

    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("Browser error: {0}")]
    Browser(#[from] storescan_browser::BrowserError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreScanError),
}

impl ScanError {
    /// Whether the run can continue after this error.
    ///
    /// Only capability-level unavailability aborts a run; everything else is
    /// recorded at task, switch or agent granularity.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::CapabilityUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;
    use storescan_browser::BrowserError;

    #[test]
    fn test_only_capability_errors_abort() {
        assert!(!ScanError::CapabilityUnavailable("no browser".to_string()).is_recoverable());
        assert!(ScanError::TokenAcquisition("none".to_string()).is_recoverable());
        assert!(ScanError::Timeout {
            operation: "navigate".to_string()
        }
        .is_recoverable());
        assert!(ScanError::from(BrowserError::PageClosed).is_recoverable());
    }

    #[test]
    fn test_display_names_the_item() {
        let err = ScanError::TaskExtraction {
            item_id: ItemId::new("B00TEST123").expect("valid item id"),
            reason: "no catalog data".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Extraction failed for item B00TEST123: no catalog data"
        );
    }
}
