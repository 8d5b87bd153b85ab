//! JSON report exporter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use storescan_core::{ScanResult, StoreScanError};
use storescan_scanner::ReportExporter;

/// File written at the end of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// When the report was written
    pub generated_at: DateTime<Utc>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Every recorded result, in recording order
    pub results: Vec<ScanResult>,
}

impl Report {
    pub fn new(results: &[ScanResult]) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            generated_at: Utc::now(),
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results: results.to_vec(),
        }
    }

    /// Read a report from a file.
    pub fn read_from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Write the report to a file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
    }
}

/// Writes the final result set as a [`Report`].
#[derive(Debug, Clone)]
pub struct JsonReportExporter {
    path: PathBuf,
}

impl JsonReportExporter {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportExporter for JsonReportExporter {
    fn export(&self, results: &[ScanResult]) -> Result<(), StoreScanError> {
        Report::new(results)
            .write_to_file(&self.path)
            .map_err(|e| StoreScanError::Export(format!("{}: {e}", self.path.display())))?;
        tracing::info!("Wrote {} results to {}", results.len(), self.path.display());
        Ok(())
    }
}
