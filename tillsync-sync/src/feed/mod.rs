//! Realtime change feed abstraction.
//!
//! A feed delivers "table X changed" notifications for one tenant. The
//! engine never trusts a notification's payload: each event only triggers a
//! refetch of the named table.

pub mod mock;
pub mod sse;

use crate::error::SyncResult;
use async_trait::async_trait;
use tillsync_types::{ChangeEvent, Table, TenantId};
use tokio::sync::mpsc;

pub use sse::{SseChangeFeed, SseFeedConfig, SseParser};

/// Receiving end of a subscription. Dropping it unsubscribes.
pub type ChangeStream = mpsc::Receiver<ChangeEvent>;

/// Source of backend change notifications.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Subscribes to changes of `tables`, filtered to `tenant`.
    async fn subscribe(&self, tenant: &TenantId, tables: &[Table]) -> SyncResult<ChangeStream>;
}
