//! Sync settings model

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Global sync configuration, persisted as a singleton
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Whether the scheduler fires passes automatically
    pub auto_sync_enabled: bool,
    /// First daily trigger time, `HH:MM`
    pub morning_sync_time: String,
    /// Second daily trigger time, `HH:MM`
    pub evening_sync_time: String,
    /// IANA timezone name for the trigger times
    pub timezone: String,
    /// How many days archived persons remain restorable
    pub retention_days: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            auto_sync_enabled: true,
            morning_sync_time: "07:30".to_string(),
            evening_sync_time: "19:30".to_string(),
            timezone: "UTC".to_string(),
            retention_days: 90,
        }
    }
}

impl SyncSettings {
    /// Validate trigger times, timezone, and retention window
    pub fn validate(&self) -> Result<()> {
        parse_trigger_time(&self.morning_sync_time)?;
        parse_trigger_time(&self.evening_sync_time)?;
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| Error::InvalidInput(format!("Invalid timezone: {}", self.timezone)))?;
        if self.retention_days == 0 {
            return Err(Error::InvalidInput(
                "retention_days must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Both daily trigger times as `(hour, minute)` pairs
    pub fn trigger_times(&self) -> Result<[(u32, u32); 2]> {
        Ok([
            parse_trigger_time(&self.morning_sync_time)?,
            parse_trigger_time(&self.evening_sync_time)?,
        ])
    }
}

/// Parse a `HH:MM` trigger time into `(hour, minute)`
pub fn parse_trigger_time(value: &str) -> Result<(u32, u32)> {
    let re = Regex::new(r"^([01]?\d|2[0-3]):([0-5]\d)$").expect("Invalid regex");
    let caps = re
        .captures(value.trim())
        .ok_or_else(|| Error::InvalidInput(format!("Invalid trigger time: {value}")))?;
    let hour: u32 = caps[1].parse().map_err(|_| {
        Error::InvalidInput(format!("Invalid trigger time: {value}"))
    })?;
    let minute: u32 = caps[2].parse().map_err(|_| {
        Error::InvalidInput(format!("Invalid trigger time: {value}"))
    })?;
    Ok((hour, minute))
}
