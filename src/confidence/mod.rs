// Confidence scoring engine
// Computes per-field, per-category and overall provenance-aware confidence
// for a record from its field-source ledger. Deterministic: identical inputs
// and the same `as_of` instant always produce identical output.

pub mod fields;


use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{
    CONFIDENCE_AUTOMATED_FLOOR, CONFIDENCE_AUTOMATED_PENALTY, CONFIDENCE_CORROBORATION_BONUS,
    CONFIDENCE_HUMAN_VERIFIED_BONUS, CONFIDENCE_STALE_AFTER_DAYS, CONFIDENCE_STALE_FLOOR,
    CONFIDENCE_STALE_PENALTY, CONFIDENCE_UNKNOWN_PROVENANCE, NEEDS_REVIEW_MAX_WEAK_FIELDS,
    NEEDS_REVIEW_THRESHOLD, STATUS_EXPERT_VERIFIED_MIN, STATUS_PARTIAL_MIN, STATUS_VERIFIED_MIN,
};
use crate::db::schema::{CatalogRecord, FieldSource};
use crate::error::{CinedupError, Result};
use fields::descriptors_for;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Unverified,
    Partial,
    Verified,
    ExpertVerified,
}

impl VerificationStatus {
    pub fn from_overall(overall: f64) -> Self {
        if overall >= STATUS_EXPERT_VERIFIED_MIN {
            VerificationStatus::ExpertVerified
        } else if overall >= STATUS_VERIFIED_MIN {
            VerificationStatus::Verified
        } else if overall >= STATUS_PARTIAL_MIN {
            VerificationStatus::Partial
        } else {
            VerificationStatus::Unverified
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Unverified => "unverified",
            VerificationStatus::Partial => "partial",
            VerificationStatus::Verified => "verified",
            VerificationStatus::ExpertVerified => "expert_verified",
        }
    }
}

/// Latest computed confidence for a record; persisted as an annotation on the
/// record row, recomputed idempotently from record + ledger state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceScore {
    pub overall: f64,
    /// Every expected field; missing fields score 0.0 here but are excluded
    /// from the overall weighted average.
    pub by_field: BTreeMap<String, f64>,
    /// Unweighted mean per category over present fields. A category with no
    /// present field is absent from the map, not zero.
    pub by_category: BTreeMap<String, f64>,
    pub verification_status: VerificationStatus,
    pub needs_review: bool,
}

/// Score one record against its accumulated ledger entries.
/// Ledger rows naming a field outside the closed descriptor set are an error.
pub fn score_record(
    record: &CatalogRecord,
    sources: &[FieldSource],
    as_of: DateTime<Utc>,
) -> Result<ConfidenceScore> {
    let descriptors = descriptors_for(&record.entity_type);

    for src in sources {
        if !descriptors.iter().any(|d| d.name == src.field_name) {
            return Err(CinedupError::Other(format!(
                "Unrecognized field '{}' in source ledger for record {}",
                src.field_name, record.id
            )));
        }
    }

    let mut by_field = BTreeMap::new();
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    let mut weak_fields = 0usize;
    let mut category_sums: BTreeMap<&'static str, (f64, usize)> = BTreeMap::new();

    for desc in descriptors {
        let present = record.has_field(desc.name);
        let field_sources: Vec<&FieldSource> =
            sources.iter().filter(|s| s.field_name == desc.name).collect();

        let score = score_field(present, &field_sources, as_of);
        by_field.insert(desc.name.to_string(), score);

        if present {
            weighted_sum += score * desc.weight;
            weight_total += desc.weight;
            // Weak means a present field with shaky provenance; an absent
            // field is a completeness problem, not a trust problem
            if score < NEEDS_REVIEW_THRESHOLD {
                weak_fields += 1;
            }
            let entry = category_sums.entry(desc.category.as_str()).or_insert((0.0, 0));
            entry.0 += score;
            entry.1 += 1;
        }
    }

    let overall = if weight_total > 0.0 {
        (weighted_sum / weight_total).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let by_category = category_sums
        .into_iter()
        .map(|(cat, (sum, n))| (cat.to_string(), sum / n as f64))
        .collect();

    let needs_review =
        overall < NEEDS_REVIEW_THRESHOLD || weak_fields > NEEDS_REVIEW_MAX_WEAK_FIELDS;

    Ok(ConfidenceScore {
        overall,
        by_field,
        by_category,
        verification_status: VerificationStatus::from_overall(overall),
        needs_review,
    })
}

/// Per-field score from the field's ledger entries.
fn score_field(present: bool, sources: &[&FieldSource], as_of: DateTime<Utc>) -> f64 {
    if !present {
        return 0.0;
    }
    if sources.is_empty() {
        return CONFIDENCE_UNKNOWN_PROVENANCE;
    }

    // Base score: the most reliable source wins
    let mut score = sources
        .iter()
        .map(|s| s.declared_reliability)
        .fold(0.0_f64, f64::max);

    let human_verified = sources.iter().any(|s| s.verified_by.is_some());
    if human_verified {
        score += CONFIDENCE_HUMAN_VERIFIED_BONUS;
    }

    // Multi-source corroboration, two tiers
    if sources.len() >= 2 {
        score += CONFIDENCE_CORROBORATION_BONUS;
    }
    if sources.len() >= 3 {
        score += CONFIDENCE_CORROBORATION_BONUS;
    }

    // Unreviewed machine output is suspect
    let has_unreviewed_automation =
        sources.iter().any(|s| s.source_kind == "automated") && !human_verified;
    if has_unreviewed_automation {
        score = penalize(score, CONFIDENCE_AUTOMATED_PENALTY, CONFIDENCE_AUTOMATED_FLOOR);
    }

    // Freshness: the newest verification going stale costs a tenth
    if let Some(newest) = newest_verification(sources) {
        if as_of.signed_duration_since(newest) > Duration::days(CONFIDENCE_STALE_AFTER_DAYS) {
            score = penalize(score, CONFIDENCE_STALE_PENALTY, CONFIDENCE_STALE_FLOOR);
        }
    }

    score.clamp(0.0, 1.0)
}

/// Subtract `amount` without crossing `floor`. A score already at or under
/// the floor is left unchanged; a penalty never raises a score.
fn penalize(score: f64, amount: f64, floor: f64) -> f64 {
    if score <= floor {
        score
    } else {
        (score - amount).max(floor)
    }
}

fn newest_verification(sources: &[&FieldSource]) -> Option<DateTime<Utc>> {
    sources
        .iter()
        .filter_map(|s| s.verified_at.as_deref())
        .filter_map(parse_timestamp)
        .max()
}

/// Ledger timestamps are RFC 3339; tolerate SQLite's `datetime('now')`
/// format from older imports.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
