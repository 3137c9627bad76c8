//! Engine configuration.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default polling period (5 minutes).
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5 * 60;

/// Default quiet period after which polling takes over (10 minutes).
pub const DEFAULT_REALTIME_STALE_AFTER_SECS: u64 = 10 * 60;

/// Configuration for a sync session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Period of the polling fallback timer.
    pub poll_interval_secs: u64,
    /// A poll tick only syncs when no realtime event arrived for longer
    /// than this.
    pub realtime_stale_after_secs: u64,
    /// Restart the polling timer when the app returns to the foreground.
    pub resume_polling_on_active: bool,
    /// Capacity of each change-feed channel.
    pub feed_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            realtime_stale_after_secs: DEFAULT_REALTIME_STALE_AFTER_SECS,
            resume_polling_on_active: false,
            feed_buffer: 64,
        }
    }
}

impl SyncConfig {
    /// Polling period as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Realtime staleness window as a `Duration`.
    pub fn realtime_stale_after(&self) -> Duration {
        Duration::from_secs(self.realtime_stale_after_secs)
    }

    /// Rejects values the timers cannot work with.
    pub fn validate(&self) -> SyncResult<()> {
        if self.poll_interval_secs == 0 {
            return Err(SyncError::Config("poll_interval_secs must be positive".into()));
        }
        if self.feed_buffer == 0 {
            return Err(SyncError::Config("feed_buffer must be positive".into()));
        }
        Ok(())
    }
}
