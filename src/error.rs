//! Error types for gator.

use thiserror::Error;

use crate::datetime::DateError;
use crate::feed::FetchError;

/// Common error type for gator.
#[derive(Error, Debug)]
pub enum GatorError {
    /// Database error.
    ///
    /// This is a generic database error that wraps errors from any database backend.
    /// Database errors from sqlx are automatically converted.
    #[error("database error: {0}")]
    Database(String),

    /// Database connection error.
    #[error("database connection error: {0}")]
    DatabaseConnection(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// A uniqueness constraint rejected the write.
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Feed retrieval or parsing error.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Publication date could not be normalized.
    #[error(transparent)]
    Date(#[from] DateError),

    /// There is no feed to select for fetching.
    #[error("no feeds to fetch")]
    NoFeeds,
}

// Conversion from sqlx errors
impl From<sqlx::Error> for GatorError {
    fn from(e: sqlx::Error) -> Self {
        GatorError::Database(e.to_string())
    }
}

/// Result type alias for gator operations.
pub type Result<T> = std::result::Result<T, GatorError>;
