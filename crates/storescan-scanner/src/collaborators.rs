//! Contracts for the work-list source and the report sink.

use std::collections::HashMap;
use storescan_core::{LocationCode, LocationId, ScanResult, ScanTask, StoreScanError};

/// Ordered tasks plus the location → store id mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkList {
    pub tasks: Vec<ScanTask>,
    pub locations: HashMap<LocationCode, LocationId>,
}

impl WorkList {
    #[must_use]
    pub fn new(tasks: Vec<ScanTask>, locations: HashMap<LocationCode, LocationId>) -> Self {
        Self { tasks, locations }
    }

    /// Store id for a location, if mapped.
    #[must_use]
    pub fn location_id(&self, location: &LocationCode) -> Option<&LocationId> {
        self.locations.get(location)
    }

    /// Locations that have tasks but no store id.
    #[must_use]
    pub fn unmapped_locations(&self) -> Vec<LocationCode> {
        let mut missing: Vec<LocationCode> = self
            .tasks
            .iter()
            .map(|task| &task.location_code)
            .filter(|code| !self.locations.contains_key(*code))
            .cloned()
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }
}

/// Supplies the work list for a run.
pub trait WorkListLoader {
    fn load(&self) -> Result<WorkList, StoreScanError>;
}

/// Receives the final result set.
pub trait ReportExporter: Send + Sync {
    fn export(&self, results: &[ScanResult]) -> Result<(), StoreScanError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use storescan_core::ItemId;

    #[test]
    fn test_unmapped_locations() {
        let a = LocationCode::new("A").expect("valid");
        let b = LocationCode::new("B").expect("valid");
        let item = ItemId::new("B000000001").expect("valid");
        let work = WorkList::new(
            vec![
                ScanTask::new(b.clone(), item.clone(), "x"),
                ScanTask::new(a.clone(), item.clone(), "x"),
                ScanTask::new(b.clone(), item, "x"),
            ],
            HashMap::from([(a.clone(), LocationId::new("1").expect("valid"))]),
        );
        assert_eq!(work.unmapped_locations(), vec![b]);
        assert_eq!(work.location_id(&a).map(LocationId::as_str), Some("1"));
    }
}
