use std::path::{Path, PathBuf};

use blackbook_core::db::{ReviewRepository, SqliteReviewRepository};
use blackbook_core::models::ReviewId;
use blackbook_core::sync::ReviewResolution;

use crate::cli::ResolutionChoice;
use crate::error::CliError;

use super::{build_engine, open_database};

pub fn run_list(db_path: &Path, as_json: bool) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let items = db.with_conn(|conn| SqliteReviewRepository::new(conn).list_pending())?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("No pending reviews.");
        return Ok(());
    }
    for item in items {
        println!(
            "{} {} field={} local={} external={}",
            item.id,
            item.review_type.as_str(),
            item.field,
            item.local_value,
            item.external_value
        );
    }
    Ok(())
}

pub fn run_resolve(
    id: &str,
    choice: ResolutionChoice,
    value: Option<&str>,
    db_path: &Path,
    tokens_file: Option<&PathBuf>,
) -> Result<(), CliError> {
    let id: ReviewId = id.parse().map_err(|_| CliError::InvalidId(id.to_string()))?;
    let resolution = match choice {
        ResolutionChoice::KeepLocal => ReviewResolution::KeepLocal,
        ResolutionChoice::UseExternal => ReviewResolution::UseExternal,
        ResolutionChoice::Custom => {
            let raw = value.ok_or(CliError::MissingCustomValue)?;
            ReviewResolution::Custom(serde_json::from_str(raw)?)
        }
    };

    let db = open_database(db_path)?;
    let engine = build_engine(db, tokens_file)?;
    let item = engine.resolve_review(&id, &resolution)?;
    println!("Resolved {} ({})", item.id, item.field);
    Ok(())
}

pub fn run_dismiss(id: &str, db_path: &Path) -> Result<(), CliError> {
    let id: ReviewId = id.parse().map_err(|_| CliError::InvalidId(id.to_string()))?;
    let db = open_database(db_path)?;
    let item = db.with_conn(|conn| SqliteReviewRepository::new(conn).dismiss(&id))?;
    println!("Dismissed {} ({})", item.id, item.field);
    Ok(())
}
