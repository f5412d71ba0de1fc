// packages/agent/src/interception/fault_slot.rs
//! Durable single-record slot for the last fault report
//!
//! Writes go to a sibling temp file that is synced and renamed over the slot,
//! so a reader never sees a half-written report.

use crate::capture::FaultReport;
use crate::utils::errors::{AgentError, Result};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File-backed fault slot
#[derive(Debug, Clone)]
pub struct FaultSlot {
    path: PathBuf,
}

impl FaultSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Persist a report synchronously, overwriting any previous one
    pub fn store(&self, report: &FaultReport) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let staging = self.staging_path();
        let bytes = serde_json::to_vec(report)?;
        {
            let mut file = File::create(&staging)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&staging, &self.path)?;

        debug!(path = %self.path.display(), "Persisted fault report");
        Ok(())
    }

    /// Read the pending report without clearing it
    pub fn peek(&self) -> Result<Option<FaultReport>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Read and clear the pending report.
    ///
    /// The slot is emptied before parsing so an unreadable report is
    /// surfaced at most once.
    pub fn take(&self) -> Result<Option<FaultReport>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        self.clear()?;

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| AgentError::StorageFailed(format!("Corrupt fault report: {}", e)))
    }

    /// Remove the pending report, if any
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::FaultKind;
    use chrono::Utc;

    fn report(reason: &str) -> FaultReport {
        FaultReport {
            kind: FaultKind::Panic,
            reason: reason.to_string(),
            backtrace: vec!["0: main".to_string()],
            thread: Some("main".to_string()),
            location: Some("src/main.rs:1:1".to_string()),
            captured_at: Utc::now(),
            recovered: false,
            partial: false,
            survived: false,
        }
    }

    #[test]
    fn test_store_then_take_once() {
        let dir = tempfile::tempdir().unwrap();
        let slot = FaultSlot::new(dir.path().join("nested").join("fault.json"));

        assert!(slot.take().unwrap().is_none());
        slot.store(&report("first")).unwrap();
        slot.store(&report("second")).unwrap();

        assert_eq!(slot.peek().unwrap().unwrap().reason, "second");
        let taken = slot.take().unwrap().unwrap();
        assert_eq!(taken.reason, "second");

        assert!(slot.is_empty());
        assert!(slot.take().unwrap().is_none());
        assert!(!slot.staging_path().exists());
    }

    #[test]
    fn test_corrupt_slot_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let slot = FaultSlot::new(dir.path().join("fault.json"));
        fs::write(slot.path(), b"{not json").unwrap();

        assert!(matches!(slot.take(), Err(AgentError::StorageFailed(_))));
        assert!(slot.is_empty());
    }
}
