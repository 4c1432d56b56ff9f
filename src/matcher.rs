// Similarity matcher - proposes duplicate candidate pairs
// Pure producer: never mutates the store. Destructive action is gated behind
// the rejection list and the runner's execute flag.

use serde::Serialize;
use strsim::levenshtein;

use crate::constants::{
    MATCH_THRESHOLD_ADJACENT_YEAR, MATCH_THRESHOLD_SAME_YEAR, MATCH_YEAR_TOLERANCE,
};
use crate::db::schema::CatalogRecord;

/// Which comparison pass produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Same release year, similarity >= 80
    ExactYear,
    /// Release years one apart, similarity >= 75 (off-by-one metadata errors)
    AdjacentYear,
}

/// A proposed duplicate pair. Ephemeral: consumed by the merge resolver and
/// the run report, never persisted to the store.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateCandidate {
    pub record_a_id: i64,
    pub record_b_id: i64,
    pub match_type: MatchType,
    pub similarity: u32,
    pub entity_type: String,
}

/// Lowercase, strip punctuation, collapse whitespace.
pub fn normalize_title(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;
    for c in raw.chars() {
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            for lc in c.to_lowercase() {
                out.push(lc);
            }
        } else {
            // Whitespace and punctuation both collapse to a single separator
            pending_space = true;
        }
    }
    out
}

/// Levenshtein distance converted to a 0-100 similarity score.
/// Identical normalized strings score 100. Inputs must be non-empty.
pub fn similarity_score(a: &str, b: &str) -> u32 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 0;
    }
    let distance = levenshtein(a, b);
    let score = 100.0 * (max_len - distance.min(max_len)) as f64 / max_len as f64;
    score.round() as u32
}

struct Entry {
    id: i64,
    normalized: String,
    year: i64,
}

/// Pairwise matcher over a single entity-type partition. Records with a
/// blank normalized title or no temporal attribute are never compared.
pub struct SimilarityMatcher {
    entity_type: String,
    entries: Vec<Entry>,
}

impl SimilarityMatcher {
    pub fn new(entity_type: &str, records: &[CatalogRecord]) -> Self {
        let entries = records
            .iter()
            .filter(|r| r.entity_type == entity_type)
            .filter_map(|r| {
                let normalized = normalize_title(&r.title);
                if normalized.is_empty() {
                    return None;
                }
                let year = r.release_year?;
                Some(Entry { id: r.id, normalized, year })
            })
            .collect();
        Self { entity_type: entity_type.to_string(), entries }
    }

    /// Number of records that survived normalization and will be compared.
    pub fn comparable_count(&self) -> usize {
        self.entries.len()
    }

    /// Lazy, finite candidate stream. Recomputed fresh each run; a consumed
    /// iterator is not restartable.
    pub fn candidates(self) -> Candidates {
        Candidates { entity_type: self.entity_type, entries: self.entries, i: 0, j: 1 }
    }
}

/// Iterator state over the upper triangle of the pairwise comparison matrix.
pub struct Candidates {
    entity_type: String,
    entries: Vec<Entry>,
    i: usize,
    j: usize,
}

impl Candidates {
    fn evaluate(&self, a: &Entry, b: &Entry) -> Option<(MatchType, u32)> {
        let delta = (a.year - b.year).abs();
        if delta > MATCH_YEAR_TOLERANCE {
            return None;
        }
        let score = similarity_score(&a.normalized, &b.normalized);
        let (match_type, threshold) = if delta == 0 {
            (MatchType::ExactYear, MATCH_THRESHOLD_SAME_YEAR)
        } else {
            (MatchType::AdjacentYear, MATCH_THRESHOLD_ADJACENT_YEAR)
        };
        if score >= threshold {
            Some((match_type, score))
        } else {
            None
        }
    }
}

impl Iterator for Candidates {
    type Item = DuplicateCandidate;

    fn next(&mut self) -> Option<DuplicateCandidate> {
        while self.i < self.entries.len() {
            while self.j < self.entries.len() {
                let (a, b) = (&self.entries[self.i], &self.entries[self.j]);
                let hit = self.evaluate(a, b);
                self.j += 1;
                if let Some((match_type, similarity)) = hit {
                    return Some(DuplicateCandidate {
                        record_a_id: a.id,
                        record_b_id: b.id,
                        match_type,
                        similarity,
                        entity_type: self.entity_type.clone(),
                    });
                }
            }
            self.i += 1;
            self.j = self.i + 1;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::CatalogRecord;

    fn movie(id: i64, title: &str, year: Option<i64>) -> CatalogRecord {
        CatalogRecord {
            id,
            entity_type: "movie".to_string(),
            title: title.to_string(),
            release_year: year,
            director: None,
            cast_names: None,
            synopsis: None,
            poster_url: None,
            genres: None,
            runtime_minutes: None,
            rating: None,
            is_published: true,
            confidence_overall: None,
            confidence_detail: None,
            verification_status: None,
            needs_review: false,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("  Inti  Dongalu! "), "inti dongalu");
        assert_eq!(normalize_title("Devi (1999)"), "devi 1999");
        assert_eq!(normalize_title("...!!!"), "");
    }

    #[test]
    fn test_similarity_identical() {
        assert_eq!(similarity_score("devi", "devi"), 100);
    }

    #[test]
    fn test_similarity_scaled_by_length() {
        // distance 1 of 11 chars -> 91
        assert_eq!(similarity_score("maa annayya", "ma annayya"), 91);
        assert!(similarity_score("devi", "sita") < 50);
    }

    #[test]
    fn test_same_title_same_year_scores_100() {
        let records = vec![movie(1, "Devi", Some(1999)), movie(2, "Devi", Some(1999))];
        let hits: Vec<_> = SimilarityMatcher::new("movie", &records).candidates().collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].similarity, 100);
        assert_eq!(hits[0].match_type, MatchType::ExactYear);
    }

    #[test]
    fn test_year_delta_outside_tolerance_not_flagged() {
        // Identical titles 17 years apart are different films, not duplicates
        let records = vec![
            movie(1, "Inti Dongalu", Some(1972)),
            movie(2, "Inti Dongalu", Some(1989)),
        ];
        let hits: Vec<_> = SimilarityMatcher::new("movie", &records).candidates().collect();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_adjacent_year_pair_flagged() {
        // "prema katha" vs "prema kathalu": distance 2 of 13 -> 85
        let records = vec![
            movie(1, "Prema Katha", Some(2000)),
            movie(2, "Prema Kathalu", Some(2001)),
        ];
        let hits: Vec<_> = SimilarityMatcher::new("movie", &records).candidates().collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].match_type, MatchType::AdjacentYear);
        assert!(hits[0].similarity >= 75);
    }

    #[test]
    fn test_between_threshold_score_passes_adjacent_but_not_exact() {
        // "abhimanam" vs "abhimanyu": distance 2 of 9 -> 78, which clears the
        // 75 adjacent-year bar but not the 80 same-year bar.
        let score = similarity_score("abhimanam", "abhimanyu");
        assert_eq!(score, 78, "fixture drifted");

        let same_year = vec![movie(1, "Abhimanam", Some(1960)), movie(2, "Abhimanyu", Some(1960))];
        let hits: Vec<_> = SimilarityMatcher::new("movie", &same_year).candidates().collect();
        assert!(hits.is_empty());

        let adjacent = vec![movie(1, "Abhimanam", Some(1960)), movie(2, "Abhimanyu", Some(1961))];
        let hits: Vec<_> = SimilarityMatcher::new("movie", &adjacent).candidates().collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].match_type, MatchType::AdjacentYear);
    }

    #[test]
    fn test_blank_and_yearless_records_skipped() {
        let records = vec![
            movie(1, "!!!", Some(1999)),
            movie(2, "Devi", None),
            movie(3, "Devi", Some(1999)),
        ];
        let matcher = SimilarityMatcher::new("movie", &records);
        assert_eq!(matcher.comparable_count(), 1);
        assert!(matcher.candidates().next().is_none());
    }

    #[test]
    fn test_partition_by_entity_type() {
        let mut person = movie(2, "Devi", Some(1999));
        person.entity_type = "person".to_string();
        let records = vec![movie(1, "Devi", Some(1999)), person];
        let hits: Vec<_> = SimilarityMatcher::new("movie", &records).candidates().collect();
        assert!(hits.is_empty());
    }
}
