// Database module

pub mod migrations;
pub mod schema;

use rusqlite::Connection;
use std::path::Path;

use crate::constants::{CINEDUP_FOLDER, DB_FILENAME, REPORTS_FOLDER};
use crate::error::Result;

/// Open or create a catalog database at the given path
pub fn open_db(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;

    // Enable foreign keys (must be done per connection)
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    // Enable WAL mode for better concurrency
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;

    // Run migrations
    migrations::run_migrations(&conn)?;

    Ok(conn)
}

/// Open an in-memory catalog (tests and dry experiments)
pub fn open_memory_db() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    migrations::run_migrations(&conn)?;
    Ok(conn)
}

/// Get the database path for a catalog root
pub fn get_db_path(catalog_root: &Path) -> std::path::PathBuf {
    catalog_root.join(CINEDUP_FOLDER).join(DB_FILENAME)
}

/// Get the reports folder for a catalog root
pub fn get_reports_path(catalog_root: &Path) -> std::path::PathBuf {
    catalog_root.join(CINEDUP_FOLDER).join(REPORTS_FOLDER)
}

/// Initialize catalog folder structure
pub fn init_catalog_folders(catalog_root: &Path) -> Result<()> {
    let cinedup = catalog_root.join(CINEDUP_FOLDER);
    std::fs::create_dir_all(&cinedup)?;
    std::fs::create_dir_all(cinedup.join(REPORTS_FOLDER))?;
    Ok(())
}
