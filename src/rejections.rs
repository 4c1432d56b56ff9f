// Curated rejection list: pairs a human has marked as NOT duplicates.
// Keyed by natural key (normalized title + year) because database ids are
// only known after a lookup. The engine never overrides an entry here.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::db::schema::CatalogRecord;
use crate::error::{CinedupError, Result};
use crate::matcher::normalize_title;

/// Stable identity of a record independent of its database id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NaturalKey {
    normalized_title: String,
    year: Option<i64>,
}

impl NaturalKey {
    pub fn new(title: &str, year: Option<i64>) -> Self {
        Self { normalized_title: normalize_title(title), year }
    }

    pub fn of(record: &CatalogRecord) -> Self {
        Self::new(&record.title, record.release_year)
    }

    fn tag(&self) -> String {
        match self.year {
            Some(y) => format!("{}|{}", self.normalized_title, y),
            None => format!("{}|", self.normalized_title),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawKey {
    title: String,
    #[serde(default)]
    year: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RejectionEntry {
    a: RawKey,
    b: RawKey,
}

/// Symmetric set of record pairs confirmed as false positives.
#[derive(Debug, Default)]
pub struct RejectionSet {
    pairs: HashSet<(String, String)>,
}

impl RejectionSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load from a human-curated JSON file:
    /// `[{"a": {"title": "Devi", "year": 1999}, "b": {"title": "Devi 2", "year": 1999}}, ...]`
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CinedupError::RejectionList(format!("cannot read {}: {}", path.display(), e))
        })?;
        let entries: Vec<RejectionEntry> = serde_json::from_str(&raw).map_err(|e| {
            CinedupError::RejectionList(format!("malformed {}: {}", path.display(), e))
        })?;

        let mut set = Self::default();
        for entry in entries {
            set.insert(
                &NaturalKey::new(&entry.a.title, entry.a.year),
                &NaturalKey::new(&entry.b.title, entry.b.year),
            );
        }
        Ok(set)
    }

    pub fn insert(&mut self, a: &NaturalKey, b: &NaturalKey) {
        self.pairs.insert(ordered(a, b));
    }

    /// Symmetric lookup: (A,B) and (B,A) are the same pair.
    pub fn contains(&self, a: &NaturalKey, b: &NaturalKey) -> bool {
        self.pairs.contains(&ordered(a, b))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

fn ordered(a: &NaturalKey, b: &NaturalKey) -> (String, String) {
    let (ka, kb) = (a.tag(), b.tag());
    if ka <= kb {
        (ka, kb)
    } else {
        (kb, ka)
    }
}
