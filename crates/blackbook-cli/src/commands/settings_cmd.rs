use std::path::Path;

use blackbook_core::db::{SettingsRepository, SqliteSettingsRepository};

use crate::error::CliError;

use super::open_database;

pub fn run_show(db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let settings = db.with_conn(|conn| SqliteSettingsRepository::new(conn).load())?;
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

pub fn run_set(
    db_path: &Path,
    auto_sync: Option<bool>,
    morning: Option<String>,
    evening: Option<String>,
    timezone: Option<String>,
    retention_days: Option<u32>,
) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let settings = db.with_conn(|conn| {
        let repo = SqliteSettingsRepository::new(conn);
        let mut settings = repo.load()?;

        if let Some(enabled) = auto_sync {
            settings.auto_sync_enabled = enabled;
        }
        if let Some(time) = morning {
            settings.morning_sync_time = time;
        }
        if let Some(time) = evening {
            settings.evening_sync_time = time;
        }
        if let Some(tz) = timezone {
            settings.timezone = tz;
        }
        if let Some(days) = retention_days {
            settings.retention_days = days;
        }

        repo.save(&settings)?;
        Ok(settings)
    })?;

    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}
