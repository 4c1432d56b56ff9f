// Cinedup Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CinedupError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    RecordNotFound(i64),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rejection list error: {0}")]
    RejectionList(String),

    #[error("External source error: {0}")]
    Source(String),

    #[error("Merge error: {0}")]
    Merge(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for CinedupError {
    fn from(err: anyhow::Error) -> Self {
        CinedupError::Other(err.to_string())
    }
}

impl CinedupError {
    /// True for errors that must abort the whole run before any unit is
    /// processed. Everything else is captured per unit and the batch
    /// continues.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CinedupError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, CinedupError>;
