// External metadata source seam
// Third-party providers are opaque: they occasionally supply field values
// with a declared reliability. A failing or timing-out provider degrades to
// "no corroborating source" and is never fatal to a batch.

use std::collections::BTreeMap;

use rusqlite::Connection;

use crate::confidence::fields::descriptor;
use crate::db::schema::{insert_field_source, CatalogRecord, NewFieldSource};
use crate::error::Result;
use crate::matcher::normalize_title;
use crate::rejections::NaturalKey;

/// Field values a provider returned for one natural key.
pub type SourceFields = BTreeMap<String, String>;

/// One external metadata provider.
pub trait SourceClient {
    fn source_id(&self) -> &str;

    /// Ledger source kind: 'editorial', 'provider', 'community' or 'automated'.
    fn source_kind(&self) -> &str;

    fn declared_reliability(&self) -> f64;

    /// Fetch field values for a record. An empty map means the provider
    /// knows nothing about this key. Implementations own their timeout
    /// handling; a timeout surfaces as `Err` and the caller degrades it.
    fn fetch(&self, key: &NaturalKey) -> Result<SourceFields>;
}

/// Ask a provider about a record and append a ledger entry for every field
/// where the provider agrees with the stored value. Provider errors are
/// logged and swallowed: the batch keeps going with zero new entries.
pub fn corroborate_record(
    conn: &Connection,
    record: &CatalogRecord,
    client: &dyn SourceClient,
) -> Result<usize> {
    let fetched = match client.fetch(&NaturalKey::of(record)) {
        Ok(fields) => fields,
        Err(e) => {
            log::warn!(
                "Source '{}' failed for record {}: {} (treated as no data)",
                client.source_id(),
                record.id,
                e
            );
            return Ok(0);
        }
    };

    let mut added = 0;
    for (field_name, value) in fetched {
        // Only fields in the closed descriptor set for this entity type
        if descriptor(&record.entity_type, &field_name).is_none() {
            log::warn!(
                "Source '{}' returned unknown field '{}' for record {}; ignored",
                client.source_id(),
                field_name,
                record.id
            );
            continue;
        }
        let Some(stored) = record.field_value(&field_name) else {
            continue;
        };
        if !values_agree(&stored, &value) {
            continue;
        }
        insert_field_source(
            conn,
            &NewFieldSource {
                record_id: record.id,
                field_name,
                source_id: client.source_id().to_string(),
                source_kind: client.source_kind().to_string(),
                declared_reliability: client.declared_reliability(),
                verified_at: None,
                verified_by: None,
            },
        )?;
        added += 1;
    }
    Ok(added)
}

/// Text fields agree up to normalization; everything else must match exactly
/// after trimming.
fn values_agree(stored: &str, fetched: &str) -> bool {
    let (s, f) = (stored.trim(), fetched.trim());
    if s == f {
        return true;
    }
    let (ns, nf) = (normalize_title(s), normalize_title(f));
    !ns.is_empty() && ns == nf
}
