/// Periodic jobs: the update check and the cleanup sweep

use crate::error::Result;
use crate::post_data::Settings;

pub const CHECK_ALARM: &str = "komica-check-alarm";
pub const CLEANUP_ALARM: &str = "komica-cleanup-alarm";
pub const CLEANUP_PERIOD_MINUTES: u64 = 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    CheckUpdates,
    Cleanup,
}

impl Job {
    pub fn from_alarm(name: &str) -> Option<Job> {
        match name {
            CHECK_ALARM => Some(Job::CheckUpdates),
            CLEANUP_ALARM => Some(Job::Cleanup),
            _ => None,
        }
    }
}

/// Named repeating timers (chrome.alarms)
#[allow(async_fn_in_trait)]
pub trait AlarmScheduler {
    async fn clear(&self, name: &str) -> Result<()>;

    async fn create(&self, name: &str, period_minutes: u64) -> Result<()>;
}

/// Check period in whole minutes: the interval rounded, never under one minute
pub fn check_period_minutes(interval_seconds: u64) -> u64 {
    (interval_seconds.saturating_add(30) / 60).max(1)
}

/// Cancel the check alarm and, when auto-check is on, start it again.
///
/// Returns the new period, or `None` when checking is disabled.
pub async fn configure_check_alarm<A: AlarmScheduler>(alarms: &A, settings: &Settings) -> Result<Option<u64>> {
    alarms.clear(CHECK_ALARM).await?;
    if !settings.auto_check_enabled {
        log::info!("Auto-check disabled");
        return Ok(None);
    }

    let period = check_period_minutes(settings.check_interval_seconds);
    alarms.create(CHECK_ALARM, period).await?;
    log::info!("Checking saved threads every {} min", period);
    Ok(Some(period))
}

/// The cleanup sweep always runs daily and decides for itself whether to act
pub async fn configure_cleanup_alarm<A: AlarmScheduler>(alarms: &A) -> Result<()> {
    alarms.clear(CLEANUP_ALARM).await?;
    alarms.create(CLEANUP_ALARM, CLEANUP_PERIOD_MINUTES).await
}

#[cfg(test)]
pub(crate) use recording::RecordingAlarms;

#[cfg(test)]
mod recording {
    use super::*;
    use std::cell::RefCell;
    use std::collections::BTreeMap;

    /// Tracks live alarms in memory
    #[derive(Debug, Default)]
    pub struct RecordingAlarms {
        active: RefCell<BTreeMap<String, u64>>,
    }

    impl RecordingAlarms {
        pub fn new() -> Self {
            RecordingAlarms::default()
        }

        /// Period of a live alarm
        pub fn period(&self, name: &str) -> Option<u64> {
            self.active.borrow().get(name).copied()
        }

        pub fn len(&self) -> usize {
            self.active.borrow().len()
        }

        pub fn is_empty(&self) -> bool {
            self.active.borrow().is_empty()
        }
    }

    impl AlarmScheduler for RecordingAlarms {
        async fn clear(&self, name: &str) -> Result<()> {
            self.active.borrow_mut().remove(name);
            Ok(())
        }

        async fn create(&self, name: &str, period_minutes: u64) -> Result<()> {
            self.active.borrow_mut().insert(name.to_string(), period_minutes);
            Ok(())
        }
    }
}
