//! Sync scheduler
//!
//! A poll loop that fires a full pass at the two configured daily
//! trigger times, in the configured timezone. Settings are re-read each
//! tick so updates apply without a restart. An in-flight pass makes a
//! trigger a logged skip, never a concurrent run.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::db::{Database, SettingsRepository, SqliteSettingsRepository};
use crate::error::{Error, Result};
use crate::models::SyncSettings;

use super::engine::SyncEngine;

/// Poll interval for the scheduler loop
const POLL_INTERVAL_SECS: u64 = 60;

/// Window within which a due slot still fires (covers sleep/wake gaps)
const FIRE_WINDOW_SECS: i64 = 120;

/// Drives scheduled sync passes
pub struct Scheduler {
    db: Arc<Database>,
    engine: Arc<SyncEngine>,
}

impl Scheduler {
    #[must_use]
    pub const fn new(db: Arc<Database>, engine: Arc<SyncEngine>) -> Self {
        Self { db, engine }
    }

    /// Run the scheduler loop indefinitely
    pub async fn run(&self) {
        let mut last_fired: Option<DateTime<Utc>> = None;

        loop {
            tokio::time::sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await;

            let settings = match self
                .db
                .with_conn(|conn| SqliteSettingsRepository::new(conn).load())
            {
                Ok(settings) => settings,
                Err(e) => {
                    tracing::warn!("Scheduler could not load settings: {e}");
                    continue;
                }
            };

            if !settings.auto_sync_enabled {
                continue;
            }

            let now = Utc::now();
            let Some(slot) = due_slot(&settings, now, last_fired) else {
                continue;
            };

            tracing::info!("Scheduled sync trigger for slot {slot}");
            match self.engine.run_full_sync().await {
                Ok(report) => {
                    tracing::info!(
                        "Scheduled sync finished: {} phases, partial={}",
                        report.phases.len(),
                        report.partial
                    );
                }
                Err(Error::SyncInProgress) => {
                    tracing::info!("Skipping scheduled sync: a pass is already running");
                }
                Err(e) => {
                    tracing::error!("Scheduled sync failed: {e}");
                }
            }
            last_fired = Some(slot);
        }
    }
}

/// The trigger slot due at `now`, if any and not already fired.
///
/// A slot is due for `FIRE_WINDOW_SECS` after its configured time;
/// yesterday's slots are considered too so a just-past-midnight wake
/// still catches a 23:59 trigger.
#[must_use]
pub fn due_slot(
    settings: &SyncSettings,
    now: DateTime<Utc>,
    last_fired: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    let tz: Tz = settings.timezone.parse().ok()?;
    let times = settings.trigger_times().ok()?;
    let today = now.with_timezone(&tz).date_naive();

    for day_offset in [-1i64, 0] {
        let date = today + chrono::Duration::days(day_offset);
        for (hour, minute) in times {
            let Some(naive) = date.and_hms_opt(hour, minute, 0) else {
                continue;
            };
            // A DST gap can make a local time nonexistent; skip that day
            let Some(local) = tz.from_local_datetime(&naive).earliest() else {
                continue;
            };
            let slot = local.with_timezone(&Utc);

            let seconds_past = (now - slot).num_seconds();
            if !(0..FIRE_WINDOW_SECS).contains(&seconds_past) {
                continue;
            }
            if let Some(last) = last_fired {
                if (last - slot).num_seconds().abs() < 60 {
                    continue; // Already fired this slot
                }
            }
            return Some(slot);
        }
    }

    None
}

/// The next occurrence of each daily trigger time, soonest first
pub fn next_run_times(settings: &SyncSettings, now: DateTime<Utc>) -> Result<Vec<DateTime<Utc>>> {
    let tz: Tz = settings
        .timezone
        .parse()
        .map_err(|_| Error::InvalidInput(format!("Invalid timezone: {}", settings.timezone)))?;
    let times = settings.trigger_times()?;
    let now_local = now.with_timezone(&tz);

    let mut upcoming = Vec::new();
    for (hour, minute) in times {
        for day_offset in 0..3 {
            let date = now_local.date_naive() + chrono::Duration::days(day_offset);
            let Some(naive) = date.and_hms_opt(hour, minute, 0) else {
                continue;
            };
            let Some(local) = tz.from_local_datetime(&naive).earliest() else {
                continue;
            };
            if local > now_local {
                upcoming.push(local.with_timezone(&Utc));
                break;
            }
        }
    }

    upcoming.sort_unstable();
    Ok(upcoming)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    fn settings(timezone: &str) -> SyncSettings {
        SyncSettings {
            timezone: timezone.to_string(),
            ..SyncSettings::default()
        }
    }

    #[test]
    fn test_due_slot_fires_within_window() {
        let now = Utc.with_ymd_and_hms(2026, 8, 4, 7, 30, 30).unwrap();
        let slot = due_slot(&settings("UTC"), now, None).unwrap();
        assert_eq!(slot, Utc.with_ymd_and_hms(2026, 8, 4, 7, 30, 0).unwrap());
    }

    #[test]
    fn test_due_slot_respects_window() {
        // 3 minutes past the trigger is outside the 2-minute window
        let now = Utc.with_ymd_and_hms(2026, 8, 4, 7, 33, 0).unwrap();
        assert_eq!(due_slot(&settings("UTC"), now, None), None);

        // And nothing is due in the middle of the afternoon
        let now = Utc.with_ymd_and_hms(2026, 8, 4, 15, 0, 0).unwrap();
        assert_eq!(due_slot(&settings("UTC"), now, None), None);
    }

    #[test]
    fn test_due_slot_deduplicates() {
        let now = Utc.with_ymd_and_hms(2026, 8, 4, 7, 30, 30).unwrap();
        let slot = Utc.with_ymd_and_hms(2026, 8, 4, 7, 30, 0).unwrap();
        assert_eq!(due_slot(&settings("UTC"), now, Some(slot)), None);

        // A different day's slot does not block today's
        let yesterday = Utc.with_ymd_and_hms(2026, 8, 3, 7, 30, 0).unwrap();
        assert_eq!(due_slot(&settings("UTC"), now, Some(yesterday)), Some(slot));
    }

    #[test]
    fn test_due_slot_timezone_aware() {
        // 07:30 America/New_York in January is 12:30 UTC (EST)
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 12, 30, 30).unwrap();
        let slot = due_slot(&settings("America/New_York"), now, None).unwrap();
        assert_eq!(slot, Utc.with_ymd_and_hms(2026, 1, 15, 12, 30, 0).unwrap());

        // 07:30 UTC would not fire at this instant
        assert_eq!(due_slot(&settings("UTC"), now, None), None);
    }

    #[test]
    fn test_next_run_times_sorted_and_future() {
        let now = Utc.with_ymd_and_hms(2026, 8, 4, 12, 0, 0).unwrap();
        let upcoming = next_run_times(&settings("UTC"), now).unwrap();

        assert_eq!(upcoming.len(), 2);
        // Evening slot today comes before tomorrow's morning slot
        assert_eq!(
            upcoming[0],
            Utc.with_ymd_and_hms(2026, 8, 4, 19, 30, 0).unwrap()
        );
        assert_eq!(
            upcoming[1],
            Utc.with_ymd_and_hms(2026, 8, 5, 7, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_next_run_times_bad_timezone() {
        let now = Utc::now();
        let mut bad = settings("UTC");
        bad.timezone = "Mars/Olympus".to_string();
        assert!(next_run_times(&bad, now).is_err());
    }
}
