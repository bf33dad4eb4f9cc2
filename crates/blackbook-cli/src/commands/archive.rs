use std::path::Path;

use chrono::{TimeZone, Utc};

use blackbook_core::db::{ArchiveRepository, SqliteArchiveRepository};
use blackbook_core::models::ArchiveId;
use blackbook_core::sync::ArchiveManager;

use crate::error::CliError;

use super::open_database;

pub fn run_list(db_path: &Path, as_json: bool) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let entries = db.with_conn(|conn| SqliteArchiveRepository::new(conn).list_unrestored())?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No archived persons.");
        return Ok(());
    }
    for entry in entries {
        let expires = Utc
            .timestamp_millis_opt(entry.expires_at)
            .single()
            .map_or_else(|| entry.expires_at.to_string(), |dt| dt.to_rfc3339());
        println!(
            "{} {} (deleted from {}, restorable until {expires})",
            entry.id,
            entry.snapshot.display_name,
            entry.deleted_from.as_str()
        );
    }
    Ok(())
}

pub fn run_restore(id: &str, db_path: &Path) -> Result<(), CliError> {
    let id: ArchiveId = id.parse().map_err(|_| CliError::InvalidId(id.to_string()))?;
    let db = open_database(db_path)?;
    let person = db.with_conn(|conn| ArchiveManager::new(conn).restore(&id))?;
    println!("Restored as {} ({})", person.id, person.display_name);
    Ok(())
}

pub fn run_purge(db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let purged = db.with_conn(|conn| ArchiveManager::new(conn).purge_expired())?;
    println!("Purged {purged} expired entries");
    Ok(())
}
