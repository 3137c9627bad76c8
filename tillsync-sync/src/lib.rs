//! Local-first sync engine for tillsync.
//!
//! Keeps an in-memory store of business records and settings consistent
//! with a shared, multi-tenant relational backend.
//!
//! # Architecture
//!
//! The engine pulls, the UI writes, and the two meet in the local store.
//! Remote state is authoritative: every reconciliation replaces whole
//! collections rather than merging fields.
//!
//! ## Components
//!
//! - **Gateway**: stateless backend façade (REST or in-memory)
//! - **Feed**: realtime "table changed" notifications (SSE or in-memory)
//! - **Store**: the reactive local state the UI reads and writes
//! - **Snapshots**: last reconciled id set per collection
//! - **Guard**: refuses to propagate a collection going from N to 0
//! - **Engine**: full sync, table sync, bootstrap and local-change diffing
//! - **Scheduler**: polling fallback, suppressed while realtime is alive
//! - **Lifecycle**: pauses polling in the background
//! - **Session**: ties the above to one tenant's lifetime
//!
//! ## Sync Process
//!
//! 1. **Gate**: no tenant or offline mode means no session
//! 2. **Initial sync**: fetch every table, pull-replace (or bootstrap)
//! 3. **Realtime**: each change event refreshes exactly one table
//! 4. **Polling**: full sync when realtime has been quiet too long
//! 5. **Local changes**: removals diffed against snapshots and deleted
//!    remotely, unless the whole collection vanished at once
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tillsync_sync::gateway::mock::MockGateway;
//! use tillsync_sync::{MemoryStore, ReconciliationEngine};
//! use tillsync_types::TenantId;
//!
//! let engine = ReconciliationEngine::new(
//!     TenantId::parse("acme").unwrap(),
//!     Arc::new(MockGateway::new()),
//!     Arc::new(MemoryStore::new()),
//! );
//! assert!(!engine.state().is_initialized());
//! ```

mod config;
mod engine;
mod error;
pub mod feed;
pub mod gateway;
pub mod guard;
pub mod lifecycle;
pub mod scheduler;
pub mod session;
pub mod settings;
pub mod snapshot;
pub mod state;
pub mod store;

pub use config::{SyncConfig, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_REALTIME_STALE_AFTER_SECS};
pub use engine::{LocalChangeReport, ReconciliationEngine, SyncMode, SyncOutcome, SyncReport};
pub use error::{SyncError, SyncResult};
pub use feed::{ChangeFeed, ChangeStream, SseChangeFeed, SseFeedConfig};
pub use gateway::{HttpGateway, HttpGatewayConfig, RemoteGateway};
pub use guard::{DeletionDecision, DeletionGuard, IdDiff};
pub use lifecycle::{AppState, LifecycleController};
pub use scheduler::{PollOutcome, PollingScheduler};
pub use session::{SessionContext, SessionDeps, SyncSession};
pub use snapshot::{IdSet, SnapshotTracker};
pub use state::{SyncGuard, SyncState};
pub use store::{ChangeOrigin, Collections, LocalStateStore, MemoryStore, StoreChange};
