use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MobilityError {
    #[error("Source unavailable at {path}: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Constraint violation on {table}: {detail}")]
    Constraint { table: &'static str, detail: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Prompt failed: {0}")]
    Prompt(String),
}

impl MobilityError {
    pub fn source_unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// True for failures raised by the persistence store while writing or reading.
    pub fn is_persistence_failure(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Constraint { .. })
    }
}

pub type Result<T> = std::result::Result<T, MobilityError>;
