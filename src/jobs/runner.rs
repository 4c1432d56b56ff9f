// Batch job runner
// Drives the matcher, merge resolver and confidence scorer over a filtered
// record set, one unit at a time. State machine per unit:
// pending -> in_progress -> {succeeded, failed, skipped}, checkpointed after
// every transition. Per-unit errors never abort the batch; only
// configuration errors are fatal to the whole run.

use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::constants::{CHECKPOINT_FILENAME, ENTITY_TYPES};
use crate::db::schema::{self, RecordFilter};
use crate::error::{CinedupError, Result};
use crate::jobs::progress::{RunCheckpoint, UnitResult, UnitStatus};
use crate::jobs::report::{write_report, RunSummary};
use crate::matcher::{DuplicateCandidate, SimilarityMatcher};
use crate::merge::{MergeOutcome, MergeResolver};
use crate::rejections::RejectionSet;
use crate::sources::{corroborate_record, SourceClient};
use crate::confidence;

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Mutating effects only happen when true; the default is a dry run
    pub execute: bool,
    pub entity_type: Option<String>,
    /// Minimum dependent-row count for a record to be considered
    pub min_count: Option<i64>,
    /// Explicit id allowlist; empty means the whole partition
    pub ids: Vec<i64>,
    pub resume: bool,
    /// Start processing at this unit key, skipping everything before it
    pub resume_from: Option<String>,
    /// Units processed per invocation; None means run to the end
    pub batch_size: Option<usize>,
    /// Blocking sleep between units (rate limiting, third-party quotas)
    pub batch_delay_ms: u64,
    pub report_dir: PathBuf,
    pub rejections_path: Option<PathBuf>,
    /// Explicit clock for the freshness penalty, keeps scoring deterministic
    pub as_of: DateTime<Utc>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            execute: false,
            entity_type: None,
            min_count: None,
            ids: Vec::new(),
            resume: false,
            resume_from: None,
            batch_size: None,
            batch_delay_ms: crate::constants::DEFAULT_BATCH_DELAY_MS,
            report_dir: PathBuf::from("."),
            rejections_path: None,
            as_of: Utc::now(),
        }
    }
}

fn record_filter(opts: &RunOptions) -> RecordFilter {
    RecordFilter {
        entity_type: opts.entity_type.clone(),
        min_related: opts.min_count,
        ids: opts.ids.clone(),
        include_unpublished: false,
    }
}

fn pair_key(candidate: &DuplicateCandidate) -> String {
    let (a, b) = if candidate.record_a_id <= candidate.record_b_id {
        (candidate.record_a_id, candidate.record_b_id)
    } else {
        (candidate.record_b_id, candidate.record_a_id)
    };
    format!("{}:{}", a, b)
}

fn mode_label(execute: bool) -> &'static str {
    if execute {
        ""
    } else {
        "[dry-run] "
    }
}

/// Load or create the checkpoint for a run.
fn open_checkpoint(opts: &RunOptions, job_kind: &str, total: usize) -> Result<(RunCheckpoint, PathBuf)> {
    let path = opts.report_dir.join(CHECKPOINT_FILENAME);
    let mut checkpoint = if opts.resume && path.exists() {
        let existing = RunCheckpoint::load(&path)?;
        if existing.job_kind != job_kind {
            return Err(CinedupError::Config(format!(
                "checkpoint at {} belongs to a '{}' run, not '{}'",
                path.display(),
                existing.job_kind,
                job_kind
            )));
        }
        existing
    } else {
        RunCheckpoint::new(job_kind, !opts.execute, total)
    };
    // Matching is recomputed fresh each run, so the unit universe can shift
    // between resumes
    checkpoint.total = total;
    Ok((checkpoint, path))
}

/// Unit loop shared by the dedupe and score passes.
fn drive_units<F>(
    opts: &RunOptions,
    checkpoint: &mut RunCheckpoint,
    checkpoint_path: &PathBuf,
    units: Vec<String>,
    mut process: F,
) -> Result<()>
where
    F: FnMut(&str) -> Result<(UnitStatus, Option<String>, Option<String>)>,
{
    let completed = checkpoint.completed_keys();
    let mut skipping_until = opts.resume_from.clone();
    let mut processed_now = 0usize;
    let total = units.len();

    for (idx, key) in units.iter().enumerate() {
        if let Some(ref anchor) = skipping_until {
            if key != anchor {
                continue;
            }
            skipping_until = None;
        }
        if completed.contains(key) {
            continue;
        }
        if let Some(limit) = opts.batch_size {
            if processed_now >= limit {
                log::info!("Batch size {} reached, stopping before unit {}", limit, key);
                break;
            }
        }
        if processed_now > 0 && opts.batch_delay_ms > 0 {
            std::thread::sleep(std::time::Duration::from_millis(opts.batch_delay_ms));
        }

        checkpoint.record(UnitResult {
            key: key.clone(),
            status: UnitStatus::InProgress,
            duration_ms: 0,
            outcome: None,
            error: None,
        });
        checkpoint.save(checkpoint_path)?;

        let started = Instant::now();
        let (status, outcome, error) = match process(key) {
            Ok(result) => result,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => (UnitStatus::Failed, None, Some(e.to_string())),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        println!(
            "{}[{}/{}] {} -> {}{}",
            mode_label(opts.execute),
            idx + 1,
            total,
            key,
            outcome.as_deref().unwrap_or(status.as_str()),
            error.as_deref().map(|e| format!(" ({})", e)).unwrap_or_default(),
        );

        checkpoint.record(UnitResult { key: key.clone(), status, duration_ms, outcome, error });
        checkpoint.save(checkpoint_path)?;
        processed_now += 1;
    }

    // An anchor that never matched would otherwise skip the entire run
    // without a trace (likely after a merge removed the named pair)
    if let Some(anchor) = skipping_until {
        return Err(CinedupError::Config(format!(
            "resume-from key '{}' does not match any unit in this run",
            anchor
        )));
    }
    Ok(())
}

/// Match + merge pass over the filtered record set.
pub fn run_dedupe(conn: &Connection, opts: &RunOptions) -> Result<RunSummary> {
    // Configuration problems surface before any unit is touched
    let rejections = match &opts.rejections_path {
        Some(path) => RejectionSet::load(path)?,
        None => RejectionSet::empty(),
    };
    std::fs::create_dir_all(&opts.report_dir)?;

    let records = schema::list_records(conn, &record_filter(opts))?;
    let entity_types: Vec<String> = match &opts.entity_type {
        Some(t) => vec![t.clone()],
        None => ENTITY_TYPES.iter().map(|s| s.to_string()).collect(),
    };

    let mut candidates: Vec<DuplicateCandidate> = Vec::new();
    for entity_type in &entity_types {
        candidates.extend(SimilarityMatcher::new(entity_type, &records).candidates());
    }
    log::info!(
        "Matcher proposed {} candidate pairs over {} records ({} rejection entries loaded)",
        candidates.len(),
        records.len(),
        rejections.len()
    );

    let (mut checkpoint, checkpoint_path) = open_checkpoint(opts, "dedupe", candidates.len())?;
    let resolver = MergeResolver::new(conn, opts.execute);

    let by_key: std::collections::HashMap<String, &DuplicateCandidate> =
        candidates.iter().map(|c| (pair_key(c), c)).collect();
    let mut keys: Vec<String> = candidates.iter().map(pair_key).collect();
    keys.dedup();

    drive_units(opts, &mut checkpoint, &checkpoint_path, keys, |key| {
        let candidate = by_key
            .get(key)
            .ok_or_else(|| CinedupError::Other(format!("unknown unit {}", key)))?;
        match resolver.resolve(candidate, &rejections)? {
            MergeOutcome::Merged(decision) => {
                let outcome = if decision.soft_delete_fallback {
                    "merged_soft_delete"
                } else {
                    "merged"
                };
                let error = if decision.update_failures.is_empty() {
                    None
                } else {
                    Some(decision.update_failures.join("; "))
                };
                Ok((UnitStatus::Succeeded, Some(outcome.to_string()), error))
            }
            MergeOutcome::Rejected => Ok((UnitStatus::Skipped, Some("rejected".to_string()), None)),
            MergeOutcome::NotFound { missing_id } => Ok((
                UnitStatus::Skipped,
                Some("not_found".to_string()),
                Some(format!("record {} no longer exists", missing_id)),
            )),
        }
    })?;

    write_report(&opts.report_dir, &checkpoint)?;
    Ok(RunSummary::from_checkpoint(&checkpoint))
}

/// Confidence-annotation pass over the filtered record set. An optional
/// external source corroborates ledger entries before scoring (execute mode
/// only; its failures degrade to no data).
pub fn run_score(
    conn: &Connection,
    opts: &RunOptions,
    source: Option<&dyn SourceClient>,
) -> Result<RunSummary> {
    std::fs::create_dir_all(&opts.report_dir)?;

    let records = schema::list_records(conn, &record_filter(opts))?;
    let (mut checkpoint, checkpoint_path) = open_checkpoint(opts, "score", records.len())?;

    let by_key: std::collections::HashMap<String, &schema::CatalogRecord> =
        records.iter().map(|r| (r.id.to_string(), r)).collect();
    let keys: Vec<String> = records.iter().map(|r| r.id.to_string()).collect();

    drive_units(opts, &mut checkpoint, &checkpoint_path, keys, |key| {
        let record = *by_key
            .get(key)
            .ok_or_else(|| CinedupError::Other(format!("unknown unit {}", key)))?;

        if opts.execute {
            if let Some(client) = source {
                let added = corroborate_record(conn, record, client)?;
                if added > 0 {
                    log::info!("Record {}: {} corroborating ledger entries added", record.id, added);
                }
            }
        }

        let sources = schema::list_field_sources(conn, record.id)?;
        let score = confidence::score_record(record, &sources, opts.as_of)?;

        if opts.execute {
            schema::set_confidence(
                conn,
                record.id,
                score.overall,
                &serde_json::to_string(&score)?,
                score.verification_status.as_str(),
                score.needs_review,
            )?;
        }

        let outcome = if score.needs_review {
            format!("{}_needs_review", score.verification_status.as_str())
        } else {
            score.verification_status.as_str().to_string()
        };
        Ok((UnitStatus::Succeeded, Some(outcome), None))
    })?;

    write_report(&opts.report_dir, &checkpoint)?;
    Ok(RunSummary::from_checkpoint(&checkpoint))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_db;
    use crate::db::schema::{get_record, insert_credit, insert_record, NewRecord};
    use chrono::TimeZone;

    fn movie(title: &str, year: i64) -> NewRecord {
        NewRecord {
            entity_type: "movie".to_string(),
            title: title.to_string(),
            release_year: Some(year),
            director: None,
            cast_names: None,
            synopsis: None,
            poster_url: None,
            genres: None,
            runtime_minutes: None,
            rating: None,
        }
    }

    fn test_opts(dir: &std::path::Path, execute: bool) -> RunOptions {
        RunOptions {
            execute,
            report_dir: dir.to_path_buf(),
            as_of: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            ..RunOptions::default()
        }
    }

    #[test]
    fn test_dry_run_dedupe_leaves_records_untouched() {
        let conn = open_memory_db().unwrap();
        let a = insert_record(&conn, &movie("Devi", 1999)).unwrap();
        let b = insert_record(&conn, &movie("Devi", 1999)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let summary = run_dedupe(&conn, &test_opts(dir.path(), false)).unwrap();

        assert!(summary.dry_run);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.by_outcome.get("merged"), Some(&1));
        assert!(get_record(&conn, a).unwrap().is_some());
        assert!(get_record(&conn, b).unwrap().is_some());
        assert!(dir.path().join(crate::constants::SUMMARY_JSON_FILENAME).exists());
        assert!(dir.path().join(crate::constants::SUMMARY_CSV_FILENAME).exists());
        assert!(dir.path().join(CHECKPOINT_FILENAME).exists());
    }

    #[test]
    fn test_execute_dedupe_merges_and_rerun_is_idempotent() {
        let conn = open_memory_db().unwrap();
        let mut richer = movie("Devi", 1999);
        richer.director = Some("Kodi Ramakrishna".to_string());
        let survivor = insert_record(&conn, &richer).unwrap();
        let loser = insert_record(&conn, &movie("Devi", 1999)).unwrap();
        insert_credit(&conn, loser, "Prema", "actor").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let summary = run_dedupe(&conn, &test_opts(dir.path(), true)).unwrap();
        assert_eq!(summary.succeeded, 1);
        assert!(get_record(&conn, survivor).unwrap().is_some());
        assert!(get_record(&conn, loser).unwrap().is_none());

        // After the merge only the survivor remains, so a second run finds
        // no candidate pairs at all.
        let dir2 = tempfile::tempdir().unwrap();
        let again = run_dedupe(&conn, &test_opts(dir2.path(), true)).unwrap();
        assert_eq!(again.total, 0);
        assert_eq!(again.processed, 0);
    }

    #[test]
    fn test_rejected_pair_is_skipped() {
        let conn = open_memory_db().unwrap();
        insert_record(&conn, &movie("Inti Dongalu", 1972)).unwrap();
        insert_record(&conn, &movie("Inti Dongalu", 1973)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let rejections = dir.path().join("rejections.json");
        std::fs::write(
            &rejections,
            r#"[{"a": {"title": "Inti Dongalu", "year": 1972},
                 "b": {"title": "Inti Dongalu", "year": 1973}}]"#,
        )
        .unwrap();

        let mut opts = test_opts(dir.path(), true);
        opts.rejections_path = Some(rejections);
        let summary = run_dedupe(&conn, &opts).unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.by_outcome.get("rejected"), Some(&1));
    }

    #[test]
    fn test_batch_size_caps_units_and_resume_finishes() {
        let conn = open_memory_db().unwrap();
        for title in ["Alpha", "Bravo", "Charlie"] {
            insert_record(&conn, &movie(title, 2000)).unwrap();
            insert_record(&conn, &movie(title, 2000)).unwrap();
        }

        let dir = tempfile::tempdir().unwrap();
        let mut opts = test_opts(dir.path(), false);
        opts.batch_size = Some(2);
        let first = run_dedupe(&conn, &opts).unwrap();
        assert_eq!(first.processed, 2);

        opts.resume = true;
        opts.batch_size = None;
        let second = run_dedupe(&conn, &opts).unwrap();
        assert_eq!(second.processed, 3);
        assert_eq!(second.succeeded, 3);
    }

    #[test]
    fn test_resume_rejects_other_job_kind() {
        let conn = open_memory_db().unwrap();
        insert_record(&conn, &movie("Devi", 1999)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        run_score(&conn, &test_opts(dir.path(), false), None).unwrap();

        let mut opts = test_opts(dir.path(), false);
        opts.resume = true;
        let err = run_dedupe(&conn, &opts).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_score_execute_annotates_records() {
        let conn = open_memory_db().unwrap();
        let id = insert_record(&conn, &movie("Devi", 1999)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let summary = run_score(&conn, &test_opts(dir.path(), true), None).unwrap();
        assert_eq!(summary.succeeded, 1);

        let record = get_record(&conn, id).unwrap().unwrap();
        // Two populated fields with no provenance at all: baseline scores
        let overall = record.confidence_overall.unwrap();
        assert!((overall - 0.3).abs() < 1e-9);
        assert_eq!(record.verification_status.as_deref(), Some("unverified"));
        assert!(record.needs_review);
        assert!(record.confidence_detail.is_some());
    }

    #[test]
    fn test_score_dry_run_does_not_annotate() {
        let conn = open_memory_db().unwrap();
        let id = insert_record(&conn, &movie("Devi", 1999)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        run_score(&conn, &test_opts(dir.path(), false), None).unwrap();
        let record = get_record(&conn, id).unwrap().unwrap();
        assert!(record.confidence_overall.is_none());
    }

    #[test]
    fn test_resume_from_starts_at_anchor() {
        let conn = open_memory_db().unwrap();
        let first = insert_record(&conn, &movie("Alpha", 2000)).unwrap();
        let second = insert_record(&conn, &movie("Bravo", 2000)).unwrap();
        let third = insert_record(&conn, &movie("Charlie", 2000)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let mut opts = test_opts(dir.path(), false);
        opts.resume_from = Some(second.to_string());
        let summary = run_score(&conn, &opts, None).unwrap();

        assert_eq!(summary.processed, 2);
        let keys: Vec<String> = {
            let checkpoint =
                RunCheckpoint::load(&dir.path().join(CHECKPOINT_FILENAME)).unwrap();
            checkpoint.units.iter().map(|u| u.key.clone()).collect()
        };
        assert!(!keys.contains(&first.to_string()));
        assert!(keys.contains(&second.to_string()));
        assert!(keys.contains(&third.to_string()));
    }

    #[test]
    fn test_resume_from_unknown_key_is_fatal() {
        let conn = open_memory_db().unwrap();
        insert_record(&conn, &movie("Devi", 1999)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let mut opts = test_opts(dir.path(), false);
        opts.resume_from = Some("999".to_string());
        let err = run_score(&conn, &opts, None).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("999"));
    }
}
