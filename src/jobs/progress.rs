// Run checkpoint: progress persisted after every unit state transition so a
// killed run resumes without reprocessing completed units.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CinedupError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
    Skipped,
}

impl UnitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitStatus::Pending => "pending",
            UnitStatus::InProgress => "in_progress",
            UnitStatus::Succeeded => "succeeded",
            UnitStatus::Failed => "failed",
            UnitStatus::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UnitStatus::Succeeded | UnitStatus::Failed | UnitStatus::Skipped)
    }
}

/// Result of one processed unit (a candidate pair or a record).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitResult {
    pub key: String,
    pub status: UnitStatus,
    pub duration_ms: u64,
    /// Outcome label for grouping: merged, rejected, not_found, scored...
    pub outcome: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCheckpoint {
    pub run_id: String,
    /// Engine build that produced this checkpoint; kept alongside the run
    /// so a report can be traced back to the matching threshold calibration
    #[serde(default)]
    pub engine_version: u32,
    pub job_kind: String,
    pub worker: String,
    pub dry_run: bool,
    pub started_at: String,
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub units: Vec<UnitResult>,
}

impl RunCheckpoint {
    pub fn new(job_kind: &str, dry_run: bool, total: usize) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            engine_version: crate::constants::ENGINE_VERSION,
            job_kind: job_kind.to_string(),
            worker: worker_id(),
            dry_run,
            started_at: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            total,
            processed: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            units: Vec::new(),
        }
    }

    /// Record a unit state transition. Terminal transitions bump the
    /// counters; an in-progress marker just lands in the unit list so a
    /// crash between transitions is visible.
    pub fn record(&mut self, result: UnitResult) {
        let status = result.status;
        if let Some(existing) = self.units.iter_mut().find(|u| u.key == result.key) {
            if existing.status.is_terminal() {
                // Replayed transition; counters already reflect this unit
                *existing = result;
                return;
            }
            *existing = result;
        } else {
            self.units.push(result);
        }

        match status {
            UnitStatus::Succeeded => {
                self.processed += 1;
                self.succeeded += 1;
            }
            UnitStatus::Failed => {
                self.processed += 1;
                self.failed += 1;
            }
            UnitStatus::Skipped => {
                self.processed += 1;
                self.skipped += 1;
            }
            UnitStatus::Pending | UnitStatus::InProgress => {}
        }
    }

    /// Keys that already reached a terminal state (used by --resume).
    pub fn completed_keys(&self) -> HashSet<String> {
        self.units
            .iter()
            .filter(|u| u.status.is_terminal())
            .map(|u| u.key.clone())
            .collect()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Write-then-rename so a crash mid-write never corrupts the checkpoint
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CinedupError::Checkpoint(format!("cannot read {}: {}", path.display(), e))
        })?;
        let checkpoint = serde_json::from_str(&raw).map_err(|e| {
            CinedupError::Checkpoint(format!("malformed {}: {}", path.display(), e))
        })?;
        Ok(checkpoint)
    }
}

/// Worker identifier stamped into the checkpoint
fn worker_id() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    format!("{}:{}", host, std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(key: &str, status: UnitStatus) -> UnitResult {
        UnitResult {
            key: key.to_string(),
            status,
            duration_ms: 5,
            outcome: None,
            error: None,
        }
    }

    #[test]
    fn test_counters_follow_transitions() {
        let mut cp = RunCheckpoint::new("dedupe", true, 3);
        cp.record(unit("1:2", UnitStatus::InProgress));
        assert_eq!(cp.processed, 0);
        cp.record(unit("1:2", UnitStatus::Succeeded));
        cp.record(unit("3:4", UnitStatus::Failed));
        cp.record(unit("5:6", UnitStatus::Skipped));
        assert_eq!(cp.processed, 3);
        assert_eq!(cp.succeeded, 1);
        assert_eq!(cp.failed, 1);
        assert_eq!(cp.skipped, 1);
        // A terminal unit never double-counts
        cp.record(unit("1:2", UnitStatus::Succeeded));
        assert_eq!(cp.processed, 3);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");

        let mut cp = RunCheckpoint::new("dedupe", false, 2);
        cp.record(unit("1:2", UnitStatus::Succeeded));
        cp.save(&path).unwrap();

        let loaded = RunCheckpoint::load(&path).unwrap();
        assert_eq!(loaded.run_id, cp.run_id);
        assert_eq!(loaded.engine_version, crate::constants::ENGINE_VERSION);
        assert_eq!(loaded.total, 2);
        assert_eq!(loaded.completed_keys().len(), 1);
        assert!(loaded.completed_keys().contains("1:2"));
    }

    #[test]
    fn test_in_progress_units_not_completed() {
        let mut cp = RunCheckpoint::new("score", true, 1);
        cp.record(unit("7", UnitStatus::InProgress));
        assert!(cp.completed_keys().is_empty());
    }
}
