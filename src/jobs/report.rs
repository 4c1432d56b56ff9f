// Final run report: JSON summary plus a flattened CSV, one row per unit.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{SUMMARY_CSV_FILENAME, SUMMARY_JSON_FILENAME, SUMMARY_TOP_FAILURES};
use crate::error::Result;
use crate::jobs::progress::{RunCheckpoint, UnitStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub job_kind: String,
    pub dry_run: bool,
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Unit counts grouped by outcome label (merged, rejected, not_found...)
    pub by_outcome: BTreeMap<String, usize>,
    /// Most frequent failure reasons, largest first
    pub top_failures: Vec<FailureCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureCount {
    pub reason: String,
    pub count: usize,
}

impl RunSummary {
    pub fn from_checkpoint(checkpoint: &RunCheckpoint) -> Self {
        let mut by_outcome: BTreeMap<String, usize> = BTreeMap::new();
        let mut failures: BTreeMap<String, usize> = BTreeMap::new();

        for unit in &checkpoint.units {
            if let Some(ref outcome) = unit.outcome {
                *by_outcome.entry(outcome.clone()).or_insert(0) += 1;
            }
            if unit.status == UnitStatus::Failed {
                let reason = unit.error.clone().unwrap_or_else(|| "unknown".to_string());
                *failures.entry(reason).or_insert(0) += 1;
            }
        }

        let mut top_failures: Vec<FailureCount> = failures
            .into_iter()
            .map(|(reason, count)| FailureCount { reason, count })
            .collect();
        top_failures.sort_by(|a, b| b.count.cmp(&a.count).then(a.reason.cmp(&b.reason)));
        top_failures.truncate(SUMMARY_TOP_FAILURES);

        Self {
            run_id: checkpoint.run_id.clone(),
            job_kind: checkpoint.job_kind.clone(),
            dry_run: checkpoint.dry_run,
            total: checkpoint.total,
            processed: checkpoint.processed,
            succeeded: checkpoint.succeeded,
            failed: checkpoint.failed,
            skipped: checkpoint.skipped,
            by_outcome,
            top_failures,
        }
    }
}

/// Write summary.json and summary.csv into the report directory.
/// Returns (json_path, csv_path).
pub fn write_report(dir: &Path, checkpoint: &RunCheckpoint) -> Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir)?;

    let summary = RunSummary::from_checkpoint(checkpoint);
    let json_path = dir.join(SUMMARY_JSON_FILENAME);
    std::fs::write(&json_path, serde_json::to_string_pretty(&summary)?)?;

    let csv_path = dir.join(SUMMARY_CSV_FILENAME);
    let mut csv = String::from("unit,status,outcome,duration_ms,error\n");
    for unit in &checkpoint.units {
        csv.push_str(&format!(
            "{},{},{},{},{}\n",
            csv_field(&unit.key),
            unit.status.as_str(),
            csv_field(unit.outcome.as_deref().unwrap_or("")),
            unit.duration_ms,
            csv_field(unit.error.as_deref().unwrap_or("")),
        ));
    }
    std::fs::write(&csv_path, csv)?;

    Ok((json_path, csv_path))
}

/// Quote a CSV field when it contains a delimiter, quote or newline.
fn csv_field(raw: &str) -> String {
    if raw.contains(',') || raw.contains('"') || raw.contains('\n') {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}
