//! Error types for pricewatcher.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Unsupported domain given or inferred.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Submitting a job over the distribution boundary failed.
    #[error("distribution error: {0}")]
    Distribution(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Distribution(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
