//! Sync settings repository implementation

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::models::SyncSettings;

/// Trait for settings storage operations
pub trait SettingsRepository {
    /// Load settings, falling back to defaults for missing keys
    fn load(&self) -> Result<SyncSettings>;

    /// Save settings
    fn save(&self, settings: &SyncSettings) -> Result<()>;
}

/// `SQLite` implementation of `SettingsRepository`
pub struct SqliteSettingsRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSettingsRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let result = self.conn.query_row(
            "SELECT value FROM settings WHERE key = ?",
            [key],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)",
            [key, value],
        )?;
        Ok(())
    }
}

impl SettingsRepository for SqliteSettingsRepository<'_> {
    fn load(&self) -> Result<SyncSettings> {
        let mut settings = SyncSettings::default();

        if let Some(value) = self.get_setting("auto_sync_enabled")? {
            settings.auto_sync_enabled = matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }

        if let Some(value) = self.get_setting("morning_sync_time")? {
            settings.morning_sync_time = value;
        }

        if let Some(value) = self.get_setting("evening_sync_time")? {
            settings.evening_sync_time = value;
        }

        if let Some(value) = self.get_setting("timezone")? {
            settings.timezone = value;
        }

        if let Some(value) = self.get_setting("retention_days")? {
            if let Ok(days) = value.parse() {
                settings.retention_days = days;
            }
        }

        Ok(settings)
    }

    fn save(&self, settings: &SyncSettings) -> Result<()> {
        settings.validate()?;
        self.set_setting(
            "auto_sync_enabled",
            if settings.auto_sync_enabled { "true" } else { "false" },
        )?;
        self.set_setting("morning_sync_time", &settings.morning_sync_time)?;
        self.set_setting("evening_sync_time", &settings.evening_sync_time)?;
        self.set_setting("timezone", &settings.timezone)?;
        self.set_setting("retention_days", &settings.retention_days.to_string())?;
        Ok(())
    }
}
