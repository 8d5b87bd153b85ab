//! TOML work-list loader.
//!
//! ```toml
//! [locations]
//! SEA = "1001"
//! PDX = 1002
//!
//! [[tasks]]
//! location = "SEA"
//! item_id = "B000TEST01"
//! name = "Sparkling water, 12 pack"
//! ```
//!
//! Task order in the file is the order tasks are queued in.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use storescan_core::{ItemId, LocationCode, LocationId, ScanTask, StoreScanError};
use storescan_scanner::{WorkList, WorkListLoader};

#[derive(Debug, Deserialize)]
struct RawWorkList {
    #[serde(default)]
    locations: BTreeMap<String, RawLocationId>,
    #[serde(default)]
    tasks: Vec<RawTask>,
}

/// Store ids are often written as bare numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawLocationId {
    Text(String),
    Number(u64),
}

impl RawLocationId {
    fn into_string(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Number(number) => number.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawTask {
    location: String,
    item_id: String,
    #[serde(default)]
    name: Option<String>,
}

/// Reads a work list from a TOML file.
#[derive(Debug, Clone)]
pub struct TomlWorkListLoader {
    path: PathBuf,
}

impl TomlWorkListLoader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Parse work-list TOML.
    pub fn parse(contents: &str) -> Result<WorkList, StoreScanError> {
        let raw: RawWorkList = toml::from_str(contents)
            .map_err(|e| StoreScanError::WorkList(format!("invalid TOML: {e}")))?;

        let mut locations = HashMap::with_capacity(raw.locations.len());
        for (code, id) in raw.locations {
            let id = id.into_string();
            let code = LocationCode::new(code.as_str())
                .map_err(|e| StoreScanError::WorkList(format!("location '{code}': {e}")))?;
            let id = LocationId::new(id.as_str())
                .map_err(|e| StoreScanError::WorkList(format!("location {code}: {e}")))?;
            locations.insert(code, id);
        }

        let tasks = raw
            .tasks
            .into_iter()
            .enumerate()
            .map(|(index, task)| {
                let row = index + 1;
                let location = LocationCode::new(task.location)
                    .map_err(|e| StoreScanError::WorkList(format!("task {row}: {e}")))?;
                let item_id = ItemId::new(task.item_id)
                    .map_err(|e| StoreScanError::WorkList(format!("task {row}: {e}")))?;
                let name = task.name.unwrap_or_else(|| item_id.to_string());
                Ok(ScanTask::new(location, item_id, name))
            })
            .collect::<Result<Vec<_>, StoreScanError>>()?;

        let work = WorkList::new(tasks, locations);
        for location in work.unmapped_locations() {
            tracing::warn!("Location {} has tasks but no store id", location);
        }
        Ok(work)
    }
}

impl WorkListLoader for TomlWorkListLoader {
    fn load(&self) -> Result<WorkList, StoreScanError> {
        let contents = std::fs::read_to_string(&self.path).map_err(|e| {
            StoreScanError::WorkList(format!("cannot read {}: {e}", self.path.display()))
        })?;
        let work = Self::parse(&contents)?;
        tracing::info!(
            "Loaded {} tasks across {} locations from {}",
            work.tasks.len(),
            work.locations.len(),
            self.path.display()
        );
        Ok(work)
    }
}
