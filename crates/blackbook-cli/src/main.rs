//! BlackBook CLI - operate the contact sync core from the terminal

mod cli;
mod commands;
mod error;

use std::env;
use std::path::PathBuf;

use clap::Parser;

use cli::{ArchiveCommands, Cli, Commands, ReviewCommands, SettingsCommands, SyncCommands};
use error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("blackbook=info".parse().expect("valid directive")),
        )
        .init();

    let args = Cli::parse();
    let db_path = resolve_db_path(args.db_path);
    let tokens_file = resolve_tokens_file(args.tokens_file);
    tracing::debug!("Using database at {}", db_path.display());

    match args.command {
        Commands::Sync { command } => match command {
            SyncCommands::Run { json } => {
                commands::sync::run_pass(&db_path, tokens_file.as_ref(), json).await?;
            }
            SyncCommands::Person { id, json } => {
                commands::sync::run_person(&id, &db_path, tokens_file.as_ref(), json).await?;
            }
            SyncCommands::Status { json } => commands::sync::run_status(&db_path, json)?,
            SyncCommands::Log {
                limit,
                status,
                person,
                json,
            } => commands::sync::run_log(
                &db_path,
                limit,
                status.as_deref(),
                person.as_deref(),
                json,
            )?,
        },
        Commands::Review { command } => match command {
            ReviewCommands::List { json } => commands::review::run_list(&db_path, json)?,
            ReviewCommands::Resolve { id, choice, value } => commands::review::run_resolve(
                &id,
                choice,
                value.as_deref(),
                &db_path,
                tokens_file.as_ref(),
            )?,
            ReviewCommands::Dismiss { id } => commands::review::run_dismiss(&id, &db_path)?,
        },
        Commands::Archive { command } => match command {
            ArchiveCommands::List { json } => commands::archive::run_list(&db_path, json)?,
            ArchiveCommands::Restore { id } => commands::archive::run_restore(&id, &db_path)?,
            ArchiveCommands::Purge => commands::archive::run_purge(&db_path)?,
        },
        Commands::Settings { command } => match command {
            SettingsCommands::Show => commands::settings_cmd::run_show(&db_path)?,
            SettingsCommands::Set {
                auto_sync,
                morning,
                evening,
                timezone,
                retention_days,
            } => commands::settings_cmd::run_set(
                &db_path,
                auto_sync,
                morning,
                evening,
                timezone,
                retention_days,
            )?,
        },
        Commands::Completions { shell, output } => {
            commands::completions::run_completions(shell, output.as_deref())?;
        }
    }

    Ok(())
}

/// Database path: flag, then env, then the platform data directory
fn resolve_db_path(flag: Option<PathBuf>) -> PathBuf {
    if let Some(path) = flag {
        return path;
    }
    if let Ok(path) = env::var("BLACKBOOK_DB_PATH") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::data_dir().map_or_else(
        || PathBuf::from("blackbook.db"),
        |dir| dir.join("blackbook").join("blackbook.db"),
    )
}

/// Token map path: flag, then env, then the config directory (if present)
fn resolve_tokens_file(flag: Option<PathBuf>) -> Option<PathBuf> {
    if flag.is_some() {
        return flag;
    }
    if let Ok(path) = env::var("BLACKBOOK_GOOGLE_TOKENS_FILE") {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    dirs::config_dir()
        .map(|dir| dir.join("blackbook").join("tokens.json"))
        .filter(|path| path.exists())
}
