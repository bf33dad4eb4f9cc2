use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};

use blackbook_core::db::{
    ReviewRepository, RunRepository, SettingsRepository, SqliteReviewRepository,
    SqliteRunRepository, SqliteSettingsRepository, SqliteSyncLogRepository, SyncLogFilter,
    SyncLogRepository,
};
use blackbook_core::models::{PersonId, SyncLogStatus};
use blackbook_core::sync::{next_run_times, SyncReport};

use crate::error::CliError;

use super::{build_engine, open_database};

pub async fn run_pass(
    db_path: &Path,
    tokens_file: Option<&PathBuf>,
    as_json: bool,
) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let engine = build_engine(db, tokens_file)?;
    let report = engine.run_full_sync().await?;
    print_report(&report, as_json)
}

pub async fn run_person(
    id: &str,
    db_path: &Path,
    tokens_file: Option<&PathBuf>,
    as_json: bool,
) -> Result<(), CliError> {
    let id: PersonId = id.parse().map_err(|_| CliError::InvalidId(id.to_string()))?;
    let db = open_database(db_path)?;
    let engine = build_engine(db, tokens_file)?;
    let report = engine.sync_single_person(&id).await?;
    print_report(&report, as_json)
}

fn print_report(report: &SyncReport, as_json: bool) -> Result<(), CliError> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    for (key, result) in &report.phases {
        println!(
            "{key}: created {} updated {} deleted {} archived {} conflicts {}",
            result.created, result.updated, result.deleted, result.archived, result.conflicts
        );
        for error in &result.errors {
            println!("  error: {error}");
        }
    }
    if report.partial {
        println!("(pass was canceled before finishing)");
    }
    Ok(())
}

pub fn run_status(db_path: &Path, as_json: bool) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let (last_run, pending, settings) = db.with_conn(|conn| {
        Ok((
            SqliteRunRepository::new(conn).latest()?,
            SqliteReviewRepository::new(conn).count_pending()?,
            SqliteSettingsRepository::new(conn).load()?,
        ))
    })?;
    let next_runs = if settings.auto_sync_enabled {
        next_run_times(&settings, Utc::now())?
    } else {
        Vec::new()
    };

    if as_json {
        let payload = serde_json::json!({
            "last_run": last_run,
            "pending_reviews": pending,
            "auto_sync_enabled": settings.auto_sync_enabled,
            "next_runs": next_runs,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    match last_run {
        Some(run) => {
            let started = format_timestamp(run.started_at);
            println!("Last pass: {} (started {started})", run.status.as_str());
        }
        None => println!("Last pass: never"),
    }
    println!("Pending reviews: {pending}");
    if next_runs.is_empty() {
        println!("Auto-sync: disabled");
    } else {
        for next in next_runs {
            println!("Next scheduled: {next}");
        }
    }
    Ok(())
}

pub fn run_log(
    db_path: &Path,
    limit: usize,
    status: Option<&str>,
    person: Option<&str>,
    as_json: bool,
) -> Result<(), CliError> {
    let status = status
        .map(str::parse::<SyncLogStatus>)
        .transpose()
        .map_err(CliError::Config)?;
    let person_id = person
        .map(str::parse::<PersonId>)
        .transpose()
        .map_err(|_| CliError::InvalidId(person.unwrap_or_default().to_string()))?;
    let filter = SyncLogFilter { status, person_id };

    let db = open_database(db_path)?;
    let entries =
        db.with_conn(|conn| SqliteSyncLogRepository::new(conn).list(&filter, limit, 0))?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No sync log entries.");
        return Ok(());
    }
    for entry in entries {
        let when = format_timestamp(entry.created_at);
        let person = entry
            .person_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        let error = entry
            .error
            .map(|e| format!(" error={e}"))
            .unwrap_or_default();
        println!(
            "{when} {} {} {} person={person}{error}",
            entry.direction.as_str(),
            entry.action.as_str(),
            entry.status.as_str()
        );
    }
    Ok(())
}

fn format_timestamp(millis: i64) -> String {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map_or_else(|| millis.to_string(), |dt| dt.to_rfc3339())
}
