//! An in-process change feed for testing.

use super::{ChangeFeed, ChangeStream};
use crate::error::SyncResult;
use async_trait::async_trait;
use std::sync::Mutex;
use tillsync_types::{ChangeEvent, Table, TenantId};
use tokio::sync::{broadcast, mpsc};

/// Broadcasts published events to every matching subscription.
pub struct MockChangeFeed {
    tx: broadcast::Sender<(TenantId, ChangeEvent)>,
    buffer: usize,
    subscriptions: Mutex<Vec<(TenantId, Vec<Table>)>>,
}

impl Default for MockChangeFeed {
    fn default() -> Self {
        Self::new(64)
    }
}

impl MockChangeFeed {
    /// Creates a feed whose subscriptions buffer up to `buffer` events.
    pub fn new(buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self {
            tx,
            buffer: buffer.max(1),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Publishes an event as the backend would. Returns how many live
    /// subscriptions saw it before filtering.
    pub fn publish(&self, tenant: &TenantId, event: ChangeEvent) -> usize {
        self.tx.send((tenant.clone(), event)).unwrap_or(0)
    }

    /// Every subscription made so far.
    pub fn subscriptions(&self) -> Vec<(TenantId, Vec<Table>)> {
        self.subscriptions.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of subscriptions still listening.
    pub fn live_subscriptions(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl ChangeFeed for MockChangeFeed {
    async fn subscribe(&self, tenant: &TenantId, tables: &[Table]) -> SyncResult<ChangeStream> {
        self.subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((tenant.clone(), tables.to_vec()));

        let (tx, rx) = mpsc::channel(self.buffer);
        let mut source = self.tx.subscribe();
        let tenant = tenant.clone();
        let names: Vec<&'static str> = tables.iter().map(|t| t.name()).collect();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    received = source.recv() => match received {
                        Ok((event_tenant, event)) => {
                            if event_tenant != tenant || !names.contains(&event.table.as_str()) {
                                continue;
                            }
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        Ok(rx)
    }
}
