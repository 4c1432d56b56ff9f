// Database migrations
// Migrations are forward-only. Never edit or delete a migration after it ships.

use rusqlite::Connection;
use crate::error::Result;

/// All migrations in order. Each migration is a SQL string.
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    r#"
    -- Catalog records (movies and people share one partitioned table)
    CREATE TABLE records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        entity_type TEXT NOT NULL CHECK (entity_type IN ('movie', 'person')),
        title TEXT NOT NULL,
        release_year INTEGER,
        director TEXT,
        cast_names TEXT,
        synopsis TEXT,
        poster_url TEXT,
        genres TEXT,
        runtime_minutes INTEGER,
        rating REAL,
        is_published INTEGER NOT NULL DEFAULT 1,
        confidence_overall REAL,
        confidence_detail TEXT,
        verification_status TEXT
            CHECK (verification_status IN ('unverified', 'partial', 'verified', 'expert_verified')),
        needs_review INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    -- Field provenance ledger: accumulate-only, never mutated
    CREATE TABLE field_sources (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        record_id INTEGER NOT NULL REFERENCES records(id),
        field_name TEXT NOT NULL,
        source_id TEXT NOT NULL,
        source_kind TEXT NOT NULL DEFAULT 'provider'
            CHECK (source_kind IN ('editorial', 'provider', 'community', 'automated')),
        declared_reliability REAL NOT NULL CHECK (declared_reliability >= 0.0 AND declared_reliability <= 1.0),
        verified_at TEXT,
        verified_by TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    -- Dependent tables holding record foreign keys
    CREATE TABLE credits (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        record_id INTEGER NOT NULL REFERENCES records(id),
        person_name TEXT NOT NULL,
        role TEXT NOT NULL,
        billing_order INTEGER,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE reviews (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        record_id INTEGER NOT NULL REFERENCES records(id),
        author TEXT,
        body TEXT NOT NULL,
        stars INTEGER,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE gallery_images (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        record_id INTEGER NOT NULL REFERENCES records(id),
        url TEXT NOT NULL,
        caption TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE watchlist_entries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        record_id INTEGER NOT NULL REFERENCES records(id),
        user_id TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    -- Indexes for common queries
    CREATE INDEX idx_records_entity_type ON records(entity_type);
    CREATE INDEX idx_records_title_year ON records(title, release_year);
    CREATE INDEX idx_records_published ON records(is_published);
    CREATE INDEX idx_field_sources_record ON field_sources(record_id);
    CREATE INDEX idx_field_sources_field ON field_sources(record_id, field_name);
    CREATE INDEX idx_credits_record ON credits(record_id);
    CREATE INDEX idx_reviews_record ON reviews(record_id);
    CREATE INDEX idx_gallery_record ON gallery_images(record_id);
    CREATE INDEX idx_watchlist_record ON watchlist_entries(record_id);
    "#,
];

/// Get current schema version from database
fn get_schema_version(conn: &Connection) -> Result<u32> {
    let version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version)
}

/// Run all pending migrations (crash-safe)
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    let target_version = MIGRATIONS.len() as u32;

    // Refuse to open a DB created by a newer cinedup build
    if current_version > target_version {
        return Err(crate::error::CinedupError::Config(format!(
            "Database schema version {} is newer than this build supports (max {}). Please upgrade cinedup.",
            current_version, target_version
        )));
    }

    if current_version == target_version {
        return Ok(());
    }

    // Apply pending migrations one-by-one
    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let migration_version = (i + 1) as u32;
        if migration_version <= current_version {
            continue;
        }

        conn.execute_batch(migration)?;
        conn.execute_batch(&format!("PRAGMA user_version = {}", migration_version))?;

        log::info!("Applied migration {}", migration_version);
    }

    Ok(())
}
