// Database schema types and query helpers

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::Result;

// ----- Records -----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub id: i64,
    pub entity_type: String,
    pub title: String,
    pub release_year: Option<i64>,
    pub director: Option<String>,
    pub cast_names: Option<String>,
    pub synopsis: Option<String>,
    pub poster_url: Option<String>,
    pub genres: Option<String>,
    pub runtime_minutes: Option<i64>,
    pub rating: Option<f64>,
    pub is_published: bool,
    pub confidence_overall: Option<f64>,
    pub confidence_detail: Option<String>,
    pub verification_status: Option<String>,
    pub needs_review: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl CatalogRecord {
    /// Value of a named field as display text, or None when the field is
    /// absent or empty. Empty JSON arrays ("[]") count as absent.
    pub fn field_value(&self, field_name: &str) -> Option<String> {
        fn text(v: &Option<String>) -> Option<String> {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty() && *s != "[]")
                .map(str::to_string)
        }

        match field_name {
            "title" => {
                let t = self.title.trim();
                if t.is_empty() { None } else { Some(t.to_string()) }
            }
            "release_year" => self.release_year.map(|y| y.to_string()),
            "director" => text(&self.director),
            "cast_names" => text(&self.cast_names),
            "synopsis" => text(&self.synopsis),
            "poster_url" => text(&self.poster_url),
            "genres" => text(&self.genres),
            "runtime_minutes" => self.runtime_minutes.map(|m| m.to_string()),
            "rating" => self.rating.map(|r| format!("{:.1}", r)),
            _ => None,
        }
    }

    pub fn has_field(&self, field_name: &str) -> bool {
        self.field_value(field_name).is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewRecord {
    pub entity_type: String,
    pub title: String,
    pub release_year: Option<i64>,
    pub director: Option<String>,
    pub cast_names: Option<String>,
    pub synopsis: Option<String>,
    pub poster_url: Option<String>,
    pub genres: Option<String>,
    pub runtime_minutes: Option<i64>,
    pub rating: Option<f64>,
}

const RECORD_COLUMNS: &str =
    "id, entity_type, title, release_year, director, cast_names, synopsis, poster_url, \
     genres, runtime_minutes, rating, is_published, confidence_overall, confidence_detail, \
     verification_status, needs_review, created_at, updated_at";

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CatalogRecord> {
    Ok(CatalogRecord {
        id: row.get(0)?,
        entity_type: row.get(1)?,
        title: row.get(2)?,
        release_year: row.get(3)?,
        director: row.get(4)?,
        cast_names: row.get(5)?,
        synopsis: row.get(6)?,
        poster_url: row.get(7)?,
        genres: row.get(8)?,
        runtime_minutes: row.get(9)?,
        rating: row.get(10)?,
        is_published: row.get::<_, i64>(11)? != 0,
        confidence_overall: row.get(12)?,
        confidence_detail: row.get(13)?,
        verification_status: row.get(14)?,
        needs_review: row.get::<_, i64>(15)? != 0,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

pub fn insert_record(conn: &Connection, record: &NewRecord) -> Result<i64> {
    conn.execute(
        "INSERT INTO records (entity_type, title, release_year, director, cast_names,
                              synopsis, poster_url, genres, runtime_minutes, rating)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            record.entity_type,
            record.title,
            record.release_year,
            record.director,
            record.cast_names,
            record.synopsis,
            record.poster_url,
            record.genres,
            record.runtime_minutes,
            record.rating,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_record(conn: &Connection, id: i64) -> Result<Option<CatalogRecord>> {
    let result = conn
        .query_row(
            &format!("SELECT {} FROM records WHERE id = ?1", RECORD_COLUMNS),
            params![id],
            record_from_row,
        )
        .optional()?;
    Ok(result)
}

/// Point lookup by natural key. Ids are only known after a lookup, so the
/// curated rejection list keys on (title, year) instead of raw ids.
pub fn get_record_by_natural_key(
    conn: &Connection,
    entity_type: &str,
    title: &str,
    release_year: Option<i64>,
) -> Result<Option<CatalogRecord>> {
    let result = conn
        .query_row(
            &format!(
                "SELECT {} FROM records
                 WHERE entity_type = ?1 AND title = ?2 AND release_year IS ?3
                 ORDER BY id LIMIT 1",
                RECORD_COLUMNS
            ),
            params![entity_type, title, release_year],
            record_from_row,
        )
        .optional()?;
    Ok(result)
}

/// Filter for the batch runner's record selection.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub entity_type: Option<String>,
    /// Minimum dependent-row count; skips low-signal records.
    pub min_related: Option<i64>,
    /// Explicit id allowlist. Empty means no restriction.
    pub ids: Vec<i64>,
    pub include_unpublished: bool,
}

pub fn list_records(conn: &Connection, filter: &RecordFilter) -> Result<Vec<CatalogRecord>> {
    let mut sql = format!("SELECT {} FROM records WHERE 1=1", RECORD_COLUMNS);
    let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(ref et) = filter.entity_type {
        args.push(Box::new(et.clone()));
        sql.push_str(&format!(" AND entity_type = ?{}", args.len()));
    }
    if !filter.include_unpublished {
        sql.push_str(" AND is_published = 1");
    }
    if let Some(min) = filter.min_related {
        args.push(Box::new(min));
        sql.push_str(&format!(
            " AND ((SELECT COUNT(*) FROM credits WHERE credits.record_id = records.id)
                 + (SELECT COUNT(*) FROM reviews WHERE reviews.record_id = records.id)
                 + (SELECT COUNT(*) FROM gallery_images WHERE gallery_images.record_id = records.id)
                 + (SELECT COUNT(*) FROM watchlist_entries WHERE watchlist_entries.record_id = records.id)) >= ?{}",
            args.len()
        ));
    }
    if !filter.ids.is_empty() {
        let placeholders: Vec<String> = filter
            .ids
            .iter()
            .map(|id| {
                args.push(Box::new(*id));
                format!("?{}", args.len())
            })
            .collect();
        sql.push_str(&format!(" AND id IN ({})", placeholders.join(", ")));
    }
    sql.push_str(" ORDER BY id");

    let mut stmt = conn.prepare(&sql)?;
    let params_ref: Vec<&dyn rusqlite::types::ToSql> = args.iter().map(|b| b.as_ref()).collect();
    let rows = stmt
        .query_map(params_ref.as_slice(), record_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Total dependent rows referencing a record (credits, reviews, gallery,
/// watchlists; the provenance ledger is not counted as signal).
pub fn count_related(conn: &Connection, record_id: i64) -> Result<i64> {
    let count = conn.query_row(
        "SELECT (SELECT COUNT(*) FROM credits WHERE record_id = ?1)
              + (SELECT COUNT(*) FROM reviews WHERE record_id = ?1)
              + (SELECT COUNT(*) FROM gallery_images WHERE record_id = ?1)
              + (SELECT COUNT(*) FROM watchlist_entries WHERE record_id = ?1)",
        params![record_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Copy a single column value from one record to another. The column name
/// must come from the closed field-descriptor set; free-form names are a bug.
pub fn copy_record_field(conn: &Connection, column: &str, from_id: i64, to_id: i64) -> Result<usize> {
    let sql = format!(
        "UPDATE records SET {col} = (SELECT {col} FROM records WHERE id = ?1),
                            updated_at = datetime('now')
         WHERE id = ?2",
        col = column
    );
    let rows = conn.execute(&sql, params![from_id, to_id])?;
    Ok(rows)
}

pub fn set_confidence(
    conn: &Connection,
    record_id: i64,
    overall: f64,
    detail_json: &str,
    verification_status: &str,
    needs_review: bool,
) -> Result<usize> {
    let rows = conn.execute(
        "UPDATE records SET confidence_overall = ?1, confidence_detail = ?2,
                            verification_status = ?3, needs_review = ?4,
                            updated_at = datetime('now')
         WHERE id = ?5",
        params![overall, detail_json, verification_status, needs_review as i64, record_id],
    )?;
    Ok(rows)
}

/// Hard delete. Fails with a constraint error when any dependent row still
/// references the record; callers fall back to soft deletion.
pub fn delete_record(conn: &Connection, record_id: i64) -> Result<usize> {
    let rows = conn.execute("DELETE FROM records WHERE id = ?1", params![record_id])?;
    Ok(rows)
}

/// Soft delete: unpublish instead of removing.
pub fn soft_delete_record(conn: &Connection, record_id: i64) -> Result<usize> {
    let rows = conn.execute(
        "UPDATE records SET is_published = 0, updated_at = datetime('now') WHERE id = ?1",
        params![record_id],
    )?;
    Ok(rows)
}

// ----- Dependent-table reassignment -----

/// Check whether a table has a given column (schema heterogeneity tolerance).
pub fn table_has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(names.iter().any(|n| n == column))
}

/// Rewrite every foreign key in `table.column` pointing at `from_id` to point
/// at `to_id`. Returns the number of rows touched.
pub fn reassign_foreign_keys(
    conn: &Connection,
    table: &str,
    column: &str,
    from_id: i64,
    to_id: i64,
) -> Result<usize> {
    let sql = format!("UPDATE {} SET {} = ?1 WHERE {} = ?2", table, column, column);
    let rows = conn.execute(&sql, params![to_id, from_id])?;
    Ok(rows)
}

// ----- Field source ledger -----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSource {
    pub id: i64,
    pub record_id: i64,
    pub field_name: String,
    pub source_id: String,
    pub source_kind: String,
    pub declared_reliability: f64,
    pub verified_at: Option<String>,
    pub verified_by: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewFieldSource {
    pub record_id: i64,
    pub field_name: String,
    pub source_id: String,
    pub source_kind: String,
    pub declared_reliability: f64,
    pub verified_at: Option<String>,
    pub verified_by: Option<String>,
}

pub fn insert_field_source(conn: &Connection, source: &NewFieldSource) -> Result<i64> {
    conn.execute(
        "INSERT INTO field_sources (record_id, field_name, source_id, source_kind,
                                    declared_reliability, verified_at, verified_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            source.record_id,
            source.field_name,
            source.source_id,
            source.source_kind,
            source.declared_reliability,
            source.verified_at,
            source.verified_by,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_field_sources(conn: &Connection, record_id: i64) -> Result<Vec<FieldSource>> {
    let mut stmt = conn.prepare(
        "SELECT id, record_id, field_name, source_id, source_kind, declared_reliability,
                verified_at, verified_by, created_at
         FROM field_sources WHERE record_id = ?1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map(params![record_id], |row| {
            Ok(FieldSource {
                id: row.get(0)?,
                record_id: row.get(1)?,
                field_name: row.get(2)?,
                source_id: row.get(3)?,
                source_kind: row.get(4)?,
                declared_reliability: row.get(5)?,
                verified_at: row.get(6)?,
                verified_by: row.get(7)?,
                created_at: row.get(8)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ----- Dependent rows (used by merge tests and seed tooling) -----

pub fn insert_credit(conn: &Connection, record_id: i64, person_name: &str, role: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO credits (record_id, person_name, role) VALUES (?1, ?2, ?3)",
        params![record_id, person_name, role],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_review(conn: &Connection, record_id: i64, author: Option<&str>, body: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO reviews (record_id, author, body) VALUES (?1, ?2, ?3)",
        params![record_id, author, body],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_gallery_image(conn: &Connection, record_id: i64, url: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO gallery_images (record_id, url) VALUES (?1, ?2)",
        params![record_id, url],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_watchlist_entry(conn: &Connection, record_id: i64, user_id: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO watchlist_entries (record_id, user_id) VALUES (?1, ?2)",
        params![record_id, user_id],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn count_rows_referencing(conn: &Connection, table: &str, column: &str, record_id: i64) -> Result<i64> {
    let count = conn.query_row(
        &format!("SELECT COUNT(*) FROM {} WHERE {} = ?1", table, column),
        params![record_id],
        |row| row.get(0),
    )?;
    Ok(count)
}
