use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "blackbook")]
#[command(about = "Sync your black book with connected contact accounts")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to the local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the Google token map (JSON, email to token)
    #[arg(long, global = true, value_name = "PATH")]
    pub tokens_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run and inspect sync passes
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Work the manual review queue
    Review {
        #[command(subcommand)]
        command: ReviewCommands,
    },
    /// List and restore archived persons
    Archive {
        #[command(subcommand)]
        command: ArchiveCommands,
    },
    /// Show or change sync settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Run one full bidirectional pass now
    Run {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push a single person to all accounts
    Person {
        /// Person ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the last pass, pending reviews, and next trigger times
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show recent sync log entries
    Log {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Filter by status (success, failed, pending_review)
        #[arg(long)]
        status: Option<String>,
        /// Filter by person ID
        #[arg(long)]
        person: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum ReviewCommands {
    /// List pending review items
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve a pending item
    Resolve {
        /// Review item ID
        id: String,
        /// Which value wins
        #[arg(long, value_enum)]
        choice: ResolutionChoice,
        /// Custom value (required with --choice custom)
        #[arg(long)]
        value: Option<String>,
    },
    /// Dismiss a pending item
    Dismiss {
        /// Review item ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum ArchiveCommands {
    /// List unrestored archive entries
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Restore an archived person as a new record
    Restore {
        /// Archive entry ID
        id: String,
    },
    /// Remove expired, unrestored entries
    Purge,
}

#[derive(Subcommand)]
pub enum SettingsCommands {
    /// Print current settings
    Show,
    /// Update settings
    Set {
        /// Enable or disable scheduled sync
        #[arg(long)]
        auto_sync: Option<bool>,
        /// First daily trigger time, HH:MM
        #[arg(long, value_name = "HH:MM")]
        morning: Option<String>,
        /// Second daily trigger time, HH:MM
        #[arg(long, value_name = "HH:MM")]
        evening: Option<String>,
        /// IANA timezone for the trigger times
        #[arg(long)]
        timezone: Option<String>,
        /// Archive retention window in days
        #[arg(long)]
        retention_days: Option<u32>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ResolutionChoice {
    KeepLocal,
    UseExternal,
    Custom,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
