//! Error types for blackbook-core

use thiserror::Error;

/// Result type alias using blackbook-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in blackbook-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Archive entry has already been restored
    #[error("Archive entry already restored: {0}")]
    AlreadyRestored(String),

    /// A sync pass is already in progress
    #[error("A sync pass is already running")]
    SyncInProgress,

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
