//! Polling fallback.
//!
//! Realtime notifications are the primary freshness mechanism. The poller
//! exists to heal missed or dropped notifications, so a tick only runs a
//! full sync when the realtime channel has been quiet for longer than the
//! staleness window.

use crate::config::SyncConfig;
use crate::engine::{ReconciliationEngine, SyncOutcome};
use crate::error::SyncResult;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// What one poll tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Realtime traffic is recent; no sync.
    Suppressed,
    /// A full sync was requested.
    Synced(SyncOutcome),
}

/// Repeating timer that falls back to full syncs.
pub struct PollingScheduler {
    engine: Arc<ReconciliationEngine>,
    period: Duration,
    stale_after: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PollingScheduler {
    /// Creates a stopped scheduler.
    pub fn new(engine: Arc<ReconciliationEngine>, config: &SyncConfig) -> Self {
        Self {
            engine,
            period: config.poll_interval(),
            stale_after: config.realtime_stale_after(),
            task: Mutex::new(None),
        }
    }

    /// The tick period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Runs one tick immediately.
    pub async fn poll_once(&self) -> SyncResult<PollOutcome> {
        poll(&self.engine, self.stale_after).await
    }

    /// Starts the timer if it is not running. The first tick fires one
    /// period from now.
    pub fn resume(&self) {
        let mut task = self.lock_task();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let engine = Arc::clone(&self.engine);
        let period = self.period;
        let stale_after = self.stale_after;

        *task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                // detached so cancelling the timer leaves an in-flight sync alone
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    match poll(&engine, stale_after).await {
                        Ok(_) => {}
                        Err(e) if e.is_transient() => info!(
                            "Polling sync for tenant {} failed, retrying next tick: {}",
                            engine.tenant(),
                            e
                        ),
                        Err(e) => warn!("Polling sync for tenant {} failed: {}", engine.tenant(), e),
                    }
                });
            }
        }));
        info!("Polling every {:?} for tenant {}", period, self.engine.tenant());
    }

    /// Cancels the timer. A sync already started by a tick runs to
    /// completion.
    pub fn pause(&self) {
        if let Some(task) = self.lock_task().take() {
            task.abort();
            info!("Polling paused for tenant {}", self.engine.tenant());
        }
    }

    /// Whether the timer is armed.
    pub fn is_running(&self) -> bool {
        self.lock_task().as_ref().is_some_and(|t| !t.is_finished())
    }

    fn lock_task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.lock_task().take() {
            task.abort();
        }
    }
}

async fn poll(engine: &ReconciliationEngine, stale_after: Duration) -> SyncResult<PollOutcome> {
    if !engine.state().realtime_quiet_for(stale_after) {
        debug!("Poll tick suppressed: realtime traffic is recent");
        return Ok(PollOutcome::Suppressed);
    }
    debug!("Poll tick: realtime quiet, running full sync");
    Ok(PollOutcome::Synced(engine.full_sync().await?))
}
