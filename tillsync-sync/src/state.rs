//! Process-wide sync flags.
//!
//! `syncing` is the only concurrency control of the engine: it is claimed
//! synchronously before any network I/O and released by [`SyncGuard`] on
//! every exit path, including errors and cancelled futures.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Flags shared by the engine, the feed listeners and the poller.
#[derive(Debug, Default)]
pub struct SyncState {
    initialized: AtomicBool,
    syncing: AtomicBool,
    last_realtime_at: Mutex<Option<Instant>>,
}

impl SyncState {
    /// Creates fresh state: not initialized, idle, no realtime traffic.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the first full sync has completed.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub(crate) fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::Release);
    }

    /// Whether a reconciliation is in flight.
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    /// Claims the in-flight slot. Returns `None` when another
    /// reconciliation holds it; the caller drops its request.
    pub fn try_begin(&self) -> Option<SyncGuard<'_>> {
        self.syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SyncGuard { state: self })
    }

    /// Records that a realtime event just arrived.
    pub fn record_realtime(&self) {
        *self.lock_realtime() = Some(Instant::now());
    }

    /// When the last realtime event arrived, if ever.
    pub fn last_realtime_at(&self) -> Option<Instant> {
        *self.lock_realtime()
    }

    /// True when no realtime event arrived within `window`, or none ever did.
    pub fn realtime_quiet_for(&self, window: Duration) -> bool {
        match self.last_realtime_at() {
            Some(at) => at.elapsed() > window,
            None => true,
        }
    }

    /// Back to the state of a fresh session.
    pub fn reset(&self) {
        self.initialized.store(false, Ordering::Release);
        *self.lock_realtime() = None;
    }

    fn lock_realtime(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        self.last_realtime_at
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

/// Holds the in-flight slot; releases it on drop.
#[derive(Debug)]
pub struct SyncGuard<'a> {
    state: &'a SyncState,
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.state.syncing.store(false, Ordering::Release);
    }
}
