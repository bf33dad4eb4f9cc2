use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] blackbook_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid ID: {0}")]
    InvalidId(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("--value is required with --choice custom")]
    MissingCustomValue,
}
