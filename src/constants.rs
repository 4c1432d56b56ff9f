// Cinedup Constants
// Threshold and weight values are calibrated against the production catalog.
// Do not change without re-running the dedupe audit.

pub const ENGINE_VERSION: u32 = 3;

// Paths
pub const CINEDUP_FOLDER: &str = ".cinedup";
pub const DB_FILENAME: &str = "catalog.db";
pub const REPORTS_FOLDER: &str = "reports";
pub const CHECKPOINT_FILENAME: &str = "checkpoint.json";
pub const SUMMARY_JSON_FILENAME: &str = "summary.json";
pub const SUMMARY_CSV_FILENAME: &str = "summary.csv";

// ----- Similarity matching -----

// Similarity is 0-100: round(100 * (max_len - levenshtein) / max_len).
// The adjacent-year pass exists only to catch off-by-one metadata errors
// without exploding the comparison space.
pub const MATCH_THRESHOLD_SAME_YEAR: u32 = 80;
pub const MATCH_THRESHOLD_ADJACENT_YEAR: u32 = 75;
pub const MATCH_YEAR_TOLERANCE: i64 = 1;

// ----- Confidence scoring -----

// Baseline when a field has a value but no ledger entry at all
pub const CONFIDENCE_UNKNOWN_PROVENANCE: f64 = 0.3;

// Bonuses
pub const CONFIDENCE_HUMAN_VERIFIED_BONUS: f64 = 0.15;
pub const CONFIDENCE_CORROBORATION_BONUS: f64 = 0.05; // per tier, two tiers max

// Penalties with floors. A penalty never drags a score below its floor,
// and never raises a score that is already under the floor.
pub const CONFIDENCE_AUTOMATED_PENALTY: f64 = 0.15;
pub const CONFIDENCE_AUTOMATED_FLOOR: f64 = 0.4;
pub const CONFIDENCE_STALE_PENALTY: f64 = 0.1;
pub const CONFIDENCE_STALE_FLOOR: f64 = 0.5;
pub const CONFIDENCE_STALE_AFTER_DAYS: i64 = 365;

// Verification status thresholds on the overall score
pub const STATUS_EXPERT_VERIFIED_MIN: f64 = 0.95;
pub const STATUS_VERIFIED_MIN: f64 = 0.85;
pub const STATUS_PARTIAL_MIN: f64 = 0.60;

// Needs-review: overall below this, or more than
// NEEDS_REVIEW_MAX_WEAK_FIELDS individual fields below it
pub const NEEDS_REVIEW_THRESHOLD: f64 = 0.70;
pub const NEEDS_REVIEW_MAX_WEAK_FIELDS: usize = 3;

// ----- Merge resolution -----

// Completeness points per populated field when picking the survivor
pub const COMPLETE_WEIGHT_TITLE: u32 = 3;
pub const COMPLETE_WEIGHT_YEAR: u32 = 2;
pub const COMPLETE_WEIGHT_DIRECTOR: u32 = 2;
pub const COMPLETE_WEIGHT_CAST: u32 = 2;
pub const COMPLETE_WEIGHT_POSTER: u32 = 2;
pub const COMPLETE_WEIGHT_SYNOPSIS: u32 = 1;
pub const COMPLETE_WEIGHT_GENRES: u32 = 1;
pub const COMPLETE_WEIGHT_RUNTIME: u32 = 1;
pub const COMPLETE_WEIGHT_RATING: u32 = 1;

/// Dependent tables carrying a `record_id` foreign key, reassigned from the
/// loser to the survivor before the loser is deleted. A table missing the
/// column is skipped, not fatal (older catalogs lack some of these).
pub const DEPENDENT_TABLES: [(&str, &str); 5] = [
    ("credits", "record_id"),
    ("reviews", "record_id"),
    ("gallery_images", "record_id"),
    ("watchlist_entries", "record_id"),
    ("field_sources", "record_id"),
];

// ----- Batch runner -----

pub const DEFAULT_BATCH_DELAY_MS: u64 = 0;
pub const SUMMARY_TOP_FAILURES: usize = 5;

// Entity types the catalog partitions on
pub const ENTITY_TYPES: [&str; 2] = ["movie", "person"];
