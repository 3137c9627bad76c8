//! Foreground/background handling.
//!
//! Going to the background cancels the polling timer and nothing else; the
//! realtime subscriptions are left to the transport. Coming back does not
//! restart the timer unless `resume_polling_on_active` is set, because the
//! owning session is expected to re-establish it when it restarts.

use crate::scheduler::PollingScheduler;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Application visibility as reported by the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppState {
    Active,
    Inactive,
    Background,
}

/// Maps app state transitions onto the polling timer.
pub struct LifecycleController {
    scheduler: Arc<PollingScheduler>,
    resume_on_active: bool,
    current: Mutex<AppState>,
}

impl LifecycleController {
    /// Creates a controller for an app that starts in the foreground.
    pub fn new(scheduler: Arc<PollingScheduler>, resume_on_active: bool) -> Self {
        Self {
            scheduler,
            resume_on_active,
            current: Mutex::new(AppState::Active),
        }
    }

    /// The last reported state.
    pub fn state(&self) -> AppState {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Applies a state transition. Repeated reports of the same state are
    /// ignored.
    pub fn transition(&self, next: AppState) {
        let previous = {
            let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *current, next)
        };
        if previous == next {
            return;
        }

        match next {
            AppState::Inactive | AppState::Background => {
                info!("App moved to {:?}, pausing polling", next);
                self.pause();
            }
            AppState::Active if self.resume_on_active => {
                info!("App active again, resuming polling");
                self.resume();
            }
            AppState::Active => {
                debug!("App active again; polling stays paused until the session restarts");
            }
        }
    }

    /// Cancels the polling timer.
    pub fn pause(&self) {
        self.scheduler.pause();
    }

    /// Re-arms the polling timer.
    pub fn resume(&self) {
        self.scheduler.resume();
    }
}
