//! Error types for the FestConnect persistence layer

use thiserror::Error;

/// Common result type for FestConnect operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the store, repository, migration and session layers
#[derive(Error, Debug)]
pub enum Error {
    /// No persistent storage capability in this environment.
    /// Callers degrade to empty reads and no-op writes.
    #[error("Persistent storage unavailable")]
    StoreUnavailable,

    /// Constraint violation or engine failure on a single write
    #[error("Write failed: {0}")]
    Write(String),

    /// Write-path operation needs an active festival and none exists
    #[error("No active festival")]
    NoActiveFestival,

    /// Legacy import failed; legacy data is left in place for a retry
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Classify a sqlx failure raised by a write statement
    pub fn write(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => match db_err.kind() {
                sqlx::error::ErrorKind::UniqueViolation => {
                    Error::Write(format!("duplicate key: {}", db_err.message()))
                }
                sqlx::error::ErrorKind::ForeignKeyViolation => {
                    Error::Write(format!("dangling reference: {}", db_err.message()))
                }
                _ => Error::Write(db_err.message().to_string()),
            },
            _ => Error::Write(err.to_string()),
        }
    }
}
