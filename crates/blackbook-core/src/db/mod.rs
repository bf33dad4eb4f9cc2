//! Database layer for BlackBook

mod account_repository;
mod archive_repository;
mod connection;
mod migrations;
mod person_repository;
mod review_repository;
mod run_repository;
mod settings_repository;
mod sync_log_repository;

pub use account_repository::{AccountRepository, SqliteAccountRepository};
pub use archive_repository::{ArchiveRepository, SqliteArchiveRepository};
pub use connection::Database;
pub use person_repository::{PersonRepository, SqlitePersonRepository};
pub use review_repository::{ReviewRepository, SqliteReviewRepository};
pub use run_repository::{RunRepository, SqliteRunRepository, SyncRun, SyncRunStatus};
pub use settings_repository::{SettingsRepository, SqliteSettingsRepository};
pub use sync_log_repository::{SqliteSyncLogRepository, SyncLogFilter, SyncLogRepository};

/// Parse a JSON text column, mapping failures into rusqlite's error type
pub(crate) fn parse_json_column<T: serde::de::DeserializeOwned>(
    index: usize,
    raw: &str,
) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Parse a `FromStr` text column, mapping failures into rusqlite's error type
pub(crate) fn parse_text_column<T>(index: usize, raw: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
{
    raw.parse().map_err(|e: T::Err| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, e.into())
    })
}
