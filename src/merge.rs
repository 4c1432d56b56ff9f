// Merge resolver
// Collapses a confirmed duplicate pair into one canonical record: picks the
// more complete record as survivor, fills its gaps from the loser, rewrites
// dependent foreign keys, then removes the loser (soft-delete fallback when
// a constraint blocks the hard delete). Dry-run produces the identical
// decision trace without touching the store.

use rusqlite::Connection;
use serde::Serialize;

use crate::constants::{
    COMPLETE_WEIGHT_CAST, COMPLETE_WEIGHT_DIRECTOR, COMPLETE_WEIGHT_GENRES,
    COMPLETE_WEIGHT_POSTER, COMPLETE_WEIGHT_RATING, COMPLETE_WEIGHT_RUNTIME,
    COMPLETE_WEIGHT_SYNOPSIS, COMPLETE_WEIGHT_TITLE, COMPLETE_WEIGHT_YEAR, DEPENDENT_TABLES,
};
use crate::confidence::fields::descriptors_for;
use crate::db::schema::{
    self, count_rows_referencing, table_has_column, CatalogRecord,
};
use crate::error::{CinedupError, Result};
use crate::matcher::DuplicateCandidate;
use crate::rejections::{NaturalKey, RejectionSet};

/// Rows rewritten (or, in dry-run, that would be rewritten) in one table.
#[derive(Debug, Clone, Serialize)]
pub struct TableReassignment {
    pub table: String,
    pub rows: usize,
}

/// Full decision trace for one merge. Identical between dry-run and execute
/// up to the effects that only a live delete can reveal.
#[derive(Debug, Clone, Serialize)]
pub struct MergeDecision {
    pub survivor_id: i64,
    pub loser_id: i64,
    pub survivor_completeness: u32,
    pub loser_completeness: u32,
    pub fields_filled: Vec<String>,
    pub reassigned: Vec<TableReassignment>,
    /// Dependent tables without the expected foreign-key column
    pub skipped_tables: Vec<String>,
    /// Reassignment or fill updates that failed; surfaced in the report,
    /// never silently dropped
    pub update_failures: Vec<String>,
    pub soft_delete_fallback: bool,
}

/// What became of a candidate pair.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MergeOutcome {
    Merged(MergeDecision),
    /// Pair is in the curated rejection list
    Rejected,
    /// One side no longer exists (typically an already-merged pair)
    NotFound { missing_id: i64 },
}

pub struct MergeResolver<'a> {
    conn: &'a Connection,
    execute: bool,
}

impl<'a> MergeResolver<'a> {
    pub fn new(conn: &'a Connection, execute: bool) -> Self {
        Self { conn, execute }
    }

    /// Resolve one candidate pair. Per-pair problems come back as
    /// `MergeOutcome` variants or `Err`; neither aborts the batch.
    pub fn resolve(
        &self,
        candidate: &DuplicateCandidate,
        rejections: &RejectionSet,
    ) -> Result<MergeOutcome> {
        let record_a = match schema::get_record(self.conn, candidate.record_a_id)? {
            Some(r) => r,
            None => return Ok(MergeOutcome::NotFound { missing_id: candidate.record_a_id }),
        };
        let record_b = match schema::get_record(self.conn, candidate.record_b_id)? {
            Some(r) => r,
            None => return Ok(MergeOutcome::NotFound { missing_id: candidate.record_b_id }),
        };

        if rejections.contains(&NaturalKey::of(&record_a), &NaturalKey::of(&record_b)) {
            return Ok(MergeOutcome::Rejected);
        }

        let (survivor, loser) = pick_survivor(record_a, record_b);
        let mut decision = MergeDecision {
            survivor_id: survivor.id,
            loser_id: loser.id,
            survivor_completeness: completeness_score(&survivor),
            loser_completeness: completeness_score(&loser),
            fields_filled: Vec::new(),
            reassigned: Vec::new(),
            skipped_tables: Vec::new(),
            update_failures: Vec::new(),
            soft_delete_fallback: false,
        };

        // Fill-gaps fusion: survivor's non-empty values are never overwritten
        for desc in descriptors_for(&survivor.entity_type) {
            if survivor.has_field(desc.name) || !loser.has_field(desc.name) {
                continue;
            }
            if self.execute {
                match schema::copy_record_field(self.conn, desc.name, loser.id, survivor.id) {
                    Ok(_) => decision.fields_filled.push(desc.name.to_string()),
                    Err(e) => {
                        log::warn!("Fill of '{}' on record {} failed: {}", desc.name, survivor.id, e);
                        decision.update_failures.push(format!("fill {}: {}", desc.name, e));
                    }
                }
            } else {
                decision.fields_filled.push(desc.name.to_string());
            }
        }

        // Reassign dependent foreign keys table-by-table before deleting.
        // A table missing the column is skipped; a failing update is counted
        // and the remaining tables still get their pass.
        for (table, column) in DEPENDENT_TABLES {
            if !table_has_column(self.conn, table, column)? {
                decision.skipped_tables.push(table.to_string());
                continue;
            }
            let result = if self.execute {
                schema::reassign_foreign_keys(self.conn, table, column, loser.id, survivor.id)
            } else {
                count_rows_referencing(self.conn, table, column, loser.id).map(|n| n as usize)
            };
            match result {
                Ok(rows) => {
                    decision.reassigned.push(TableReassignment { table: table.to_string(), rows })
                }
                Err(e) => {
                    log::warn!("Reassigning {}.{} for record {} failed: {}", table, column, loser.id, e);
                    decision.update_failures.push(format!("reassign {}: {}", table, e));
                }
            }
        }

        if self.execute {
            self.remove_loser(loser.id, &mut decision)?;
        }

        Ok(MergeOutcome::Merged(decision))
    }

    /// Hard delete, falling back to unpublish when a constraint from an
    /// untracked dependent table still holds a reference. The fallback must
    /// land or the whole merge is a failure.
    fn remove_loser(&self, loser_id: i64, decision: &mut MergeDecision) -> Result<()> {
        match schema::delete_record(self.conn, loser_id) {
            Ok(_) => Ok(()),
            Err(delete_err) => {
                log::warn!(
                    "Hard delete of record {} blocked ({}); falling back to soft delete",
                    loser_id,
                    delete_err
                );
                match schema::soft_delete_record(self.conn, loser_id) {
                    Ok(_) => {
                        decision.soft_delete_fallback = true;
                        Ok(())
                    }
                    Err(soft_err) => Err(CinedupError::Merge(format!(
                        "record {}: hard delete failed ({}) and soft delete failed ({})",
                        loser_id, delete_err, soft_err
                    ))),
                }
            }
        }
    }
}

/// Data-completeness points for survivor selection.
pub fn completeness_score(record: &CatalogRecord) -> u32 {
    let mut score = 0;
    let weights: [(&str, u32); 9] = [
        ("title", COMPLETE_WEIGHT_TITLE),
        ("release_year", COMPLETE_WEIGHT_YEAR),
        ("director", COMPLETE_WEIGHT_DIRECTOR),
        ("cast_names", COMPLETE_WEIGHT_CAST),
        ("poster_url", COMPLETE_WEIGHT_POSTER),
        ("synopsis", COMPLETE_WEIGHT_SYNOPSIS),
        ("genres", COMPLETE_WEIGHT_GENRES),
        ("runtime_minutes", COMPLETE_WEIGHT_RUNTIME),
        ("rating", COMPLETE_WEIGHT_RATING),
    ];
    for (field, weight) in weights {
        if record.has_field(field) {
            score += weight;
        }
    }
    score
}

/// Higher completeness wins; ties go to the longer primary title (a proxy
/// for less-truncated data).
fn pick_survivor(a: CatalogRecord, b: CatalogRecord) -> (CatalogRecord, CatalogRecord) {
    let (sa, sb) = (completeness_score(&a), completeness_score(&b));
    if sa > sb {
        (a, b)
    } else if sb > sa {
        (b, a)
    } else if a.title.chars().count() >= b.title.chars().count() {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_db;
    use crate::db::schema::{
        get_record, insert_credit, insert_gallery_image, insert_record, insert_review,
        insert_watchlist_entry, NewRecord,
    };
    use crate::matcher::MatchType;

    fn new_movie(title: &str, year: Option<i64>) -> NewRecord {
        NewRecord {
            entity_type: "movie".to_string(),
            title: title.to_string(),
            release_year: year,
            ..Default::default()
        }
    }

    fn candidate(a: i64, b: i64) -> DuplicateCandidate {
        DuplicateCandidate {
            record_a_id: a,
            record_b_id: b,
            match_type: MatchType::ExactYear,
            similarity: 100,
            entity_type: "movie".to_string(),
        }
    }

    fn merged(outcome: MergeOutcome) -> MergeDecision {
        match outcome {
            MergeOutcome::Merged(d) => d,
            other => panic!("expected merge, got {:?}", other),
        }
    }

    #[test]
    fn test_fill_gaps_merge_loses_no_data() {
        // One record has a poster, the other a director; the merged survivor
        // carries both
        let conn = open_memory_db().unwrap();
        let mut a = new_movie("Devi", Some(1999));
        a.poster_url = Some("https://img.example.com/devi.jpg".to_string());
        let mut b = new_movie("Devi", Some(1999));
        b.director = Some("Kodi Ramakrishna".to_string());
        let id_a = insert_record(&conn, &a).unwrap();
        let id_b = insert_record(&conn, &b).unwrap();

        let resolver = MergeResolver::new(&conn, true);
        let decision = merged(resolver.resolve(&candidate(id_a, id_b), &RejectionSet::empty()).unwrap());

        let survivor = get_record(&conn, decision.survivor_id).unwrap().unwrap();
        assert!(survivor.poster_url.is_some());
        assert!(survivor.director.is_some());
        assert!(get_record(&conn, decision.loser_id).unwrap().is_none());
        assert!(!decision.soft_delete_fallback);
    }

    #[test]
    fn test_survivor_is_more_complete_record() {
        let conn = open_memory_db().unwrap();
        let mut rich = new_movie("Devi", Some(1999));
        rich.director = Some("Kodi Ramakrishna".to_string());
        rich.synopsis = Some("A snake goddess protects her devotee.".to_string());
        rich.poster_url = Some("https://img.example.com/devi.jpg".to_string());
        let poor = new_movie("Devi", Some(1999));
        let rich_id = insert_record(&conn, &rich).unwrap();
        let poor_id = insert_record(&conn, &poor).unwrap();

        let resolver = MergeResolver::new(&conn, true);
        let decision =
            merged(resolver.resolve(&candidate(poor_id, rich_id), &RejectionSet::empty()).unwrap());
        assert_eq!(decision.survivor_id, rich_id);
        assert!(decision.survivor_completeness > decision.loser_completeness);
    }

    #[test]
    fn test_tie_breaks_on_longer_title() {
        let conn = open_memory_db().unwrap();
        let short = insert_record(&conn, &new_movie("Devi...", Some(1999))).unwrap();
        let long = insert_record(&conn, &new_movie("Devi (Telugu)", Some(1999))).unwrap();

        let resolver = MergeResolver::new(&conn, true);
        let decision =
            merged(resolver.resolve(&candidate(short, long), &RejectionSet::empty()).unwrap());
        assert_eq!(decision.survivor_id, long);
    }

    #[test]
    fn test_survivor_values_never_overwritten() {
        let conn = open_memory_db().unwrap();
        let mut a = new_movie("Devi", Some(1999));
        a.director = Some("Kodi Ramakrishna".to_string());
        a.synopsis = Some("Original synopsis.".to_string());
        let mut b = new_movie("Devi", Some(1999));
        b.director = Some("Someone Else".to_string());
        let id_a = insert_record(&conn, &a).unwrap();
        let id_b = insert_record(&conn, &b).unwrap();

        let resolver = MergeResolver::new(&conn, true);
        let decision = merged(resolver.resolve(&candidate(id_a, id_b), &RejectionSet::empty()).unwrap());
        assert_eq!(decision.survivor_id, id_a);

        let survivor = get_record(&conn, id_a).unwrap().unwrap();
        assert_eq!(survivor.director.as_deref(), Some("Kodi Ramakrishna"));
    }

    #[test]
    fn test_dependent_rows_follow_survivor() {
        let conn = open_memory_db().unwrap();
        let mut keep = new_movie("Devi", Some(1999));
        keep.director = Some("Kodi Ramakrishna".to_string());
        let keep_id = insert_record(&conn, &keep).unwrap();
        let lose_id = insert_record(&conn, &new_movie("Devi", Some(1999))).unwrap();

        insert_credit(&conn, lose_id, "Prema", "actor").unwrap();
        insert_review(&conn, lose_id, Some("critic"), "Great fantasy.").unwrap();
        insert_gallery_image(&conn, lose_id, "https://img.example.com/devi-still.jpg").unwrap();
        insert_watchlist_entry(&conn, lose_id, "user-42").unwrap();

        let resolver = MergeResolver::new(&conn, true);
        let decision =
            merged(resolver.resolve(&candidate(keep_id, lose_id), &RejectionSet::empty()).unwrap());
        assert_eq!(decision.survivor_id, keep_id);

        for (table, column) in DEPENDENT_TABLES {
            assert_eq!(
                count_rows_referencing(&conn, table, column, lose_id).unwrap(),
                0,
                "{} still references the loser",
                table
            );
        }
        assert_eq!(count_rows_referencing(&conn, "credits", "record_id", keep_id).unwrap(), 1);
        assert_eq!(count_rows_referencing(&conn, "reviews", "record_id", keep_id).unwrap(), 1);
        assert_eq!(
            count_rows_referencing(&conn, "gallery_images", "record_id", keep_id).unwrap(),
            1
        );
        assert!(get_record(&conn, lose_id).unwrap().is_none());
    }

    #[test]
    fn test_untracked_constraint_falls_back_to_soft_delete() {
        let conn = open_memory_db().unwrap();
        // A dependent table the reassignment list does not know about
        conn.execute_batch(
            "CREATE TABLE awards (
                id INTEGER PRIMARY KEY,
                record_id INTEGER NOT NULL REFERENCES records(id),
                name TEXT NOT NULL
            );",
        )
        .unwrap();

        let mut keep = new_movie("Devi", Some(1999));
        keep.director = Some("Kodi Ramakrishna".to_string());
        let keep_id = insert_record(&conn, &keep).unwrap();
        let lose_id = insert_record(&conn, &new_movie("Devi", Some(1999))).unwrap();
        conn.execute(
            "INSERT INTO awards (record_id, name) VALUES (?1, 'Nandi Award')",
            rusqlite::params![lose_id],
        )
        .unwrap();

        let resolver = MergeResolver::new(&conn, true);
        let decision =
            merged(resolver.resolve(&candidate(keep_id, lose_id), &RejectionSet::empty()).unwrap());

        // Merge reported successful with the fallback annotation, loser
        // survives unpublished
        assert!(decision.soft_delete_fallback);
        let loser = get_record(&conn, lose_id).unwrap().unwrap();
        assert!(!loser.is_published);
    }

    #[test]
    fn test_rejected_pair_is_never_merged() {
        let conn = open_memory_db().unwrap();
        let id_a = insert_record(&conn, &new_movie("Devi", Some(1999))).unwrap();
        let id_b = insert_record(&conn, &new_movie("Devi", Some(1999))).unwrap();

        let mut rejections = RejectionSet::empty();
        rejections.insert(&NaturalKey::new("Devi", Some(1999)), &NaturalKey::new("Devi", Some(1999)));

        let resolver = MergeResolver::new(&conn, true);
        let outcome = resolver.resolve(&candidate(id_a, id_b), &rejections).unwrap();
        assert!(matches!(outcome, MergeOutcome::Rejected));
        assert!(get_record(&conn, id_a).unwrap().is_some());
        assert!(get_record(&conn, id_b).unwrap().is_some());
    }

    #[test]
    fn test_rerun_on_merged_pair_reports_not_found() {
        let conn = open_memory_db().unwrap();
        let mut a = new_movie("Devi", Some(1999));
        a.director = Some("Kodi Ramakrishna".to_string());
        let id_a = insert_record(&conn, &a).unwrap();
        let id_b = insert_record(&conn, &new_movie("Devi", Some(1999))).unwrap();

        let resolver = MergeResolver::new(&conn, true);
        let pair = candidate(id_a, id_b);
        merged(resolver.resolve(&pair, &RejectionSet::empty()).unwrap());

        // Second attempt: the loser is gone, not a crash, not a second merge
        let outcome = resolver.resolve(&pair, &RejectionSet::empty()).unwrap();
        match outcome {
            MergeOutcome::NotFound { missing_id } => assert_eq!(missing_id, id_b),
            other => panic!("expected not-found, got {:?}", other),
        }
    }

    #[test]
    fn test_dry_run_traces_without_mutating() {
        let conn = open_memory_db().unwrap();
        let mut a = new_movie("Devi", Some(1999));
        a.poster_url = Some("https://img.example.com/devi.jpg".to_string());
        let mut b = new_movie("Devi", Some(1999));
        b.director = Some("Kodi Ramakrishna".to_string());
        let id_a = insert_record(&conn, &a).unwrap();
        let id_b = insert_record(&conn, &b).unwrap();
        insert_credit(&conn, id_b, "Prema", "actor").unwrap();

        let dry = MergeResolver::new(&conn, false);
        let decision = merged(dry.resolve(&candidate(id_a, id_b), &RejectionSet::empty()).unwrap());

        assert!(!decision.fields_filled.is_empty());
        let credit_rows: usize = decision
            .reassigned
            .iter()
            .filter(|t| t.table == "credits")
            .map(|t| t.rows)
            .sum();
        assert_eq!(credit_rows, 1);

        // Store untouched: both records intact, loser's field not copied
        let a_after = get_record(&conn, id_a).unwrap().unwrap();
        let b_after = get_record(&conn, id_b).unwrap().unwrap();
        assert!(a_after.director.is_none());
        assert!(b_after.is_published);
        assert_eq!(count_rows_referencing(&conn, "credits", "record_id", id_b).unwrap(), 1);
    }

    #[test]
    fn test_completeness_weights() {
        let conn = open_memory_db().unwrap();
        let mut rec = new_movie("Devi", Some(1999));
        rec.rating = Some(7.0);
        let id = insert_record(&conn, &rec).unwrap();
        let record = get_record(&conn, id).unwrap().unwrap();
        // title 3 + year 2 + rating 1
        assert_eq!(completeness_score(&record), 6);
    }
}
