//! CLI command implementations

pub mod archive;
pub mod completions;
pub mod review;
pub mod settings_cmd;
pub mod sync;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use blackbook_core::db::Database;
use blackbook_core::sync::{GoogleSourceFactory, SourceFactory, SyncEngine};

use crate::error::CliError;

/// Open the database, creating parent directories as needed
pub fn open_database(db_path: &Path) -> Result<Arc<Database>, CliError> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(Arc::new(Database::open(db_path)?))
}

/// Build a sync engine over the given database and token map
pub fn build_engine(
    db: Arc<Database>,
    tokens_file: Option<&PathBuf>,
) -> Result<Arc<SyncEngine>, CliError> {
    let factory: Arc<dyn SourceFactory> = match tokens_file {
        Some(path) => Arc::new(
            GoogleSourceFactory::from_token_file(path)
                .map_err(|e| CliError::Config(format!("{}: {e}", path.display())))?,
        ),
        None => Arc::new(GoogleSourceFactory::new(HashMap::new())),
    };
    Ok(Arc::new(SyncEngine::new(db, factory)))
}
