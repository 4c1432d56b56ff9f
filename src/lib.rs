// Cinedup: catalog data-quality engine.
// Duplicate detection, confidence annotation and checkpointed batch runs
// over a SQLite movie/person catalog.

pub mod constants;
pub mod error;

pub mod db;

pub mod matcher;
pub mod rejections;
pub mod sources;
pub mod confidence;
pub mod merge;
pub mod jobs;

pub use error::{CinedupError, Result};
