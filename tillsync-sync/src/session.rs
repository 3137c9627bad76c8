//! Tenant session orchestration.
//!
//! A session exists only while a tenant is known and the app is online. It
//! owns everything with a lifetime: the engine and its snapshots, the two
//! realtime subscriptions, the polling timer and the local-change watcher.
//! Ending the session tears all of them down; network calls already in
//! flight are left to land.

use crate::config::SyncConfig;
use crate::engine::ReconciliationEngine;
use crate::error::SyncResult;
use crate::feed::{ChangeFeed, ChangeStream};
use crate::gateway::RemoteGateway;
use crate::lifecycle::{AppState, LifecycleController};
use crate::scheduler::PollingScheduler;
use crate::store::{ChangeOrigin, LocalStateStore, StoreChange};
use serde_json::Value;
use std::sync::Arc;
use tillsync_types::{
    Record, RecordId, SettingsTable, Table, TenantId, BUSINESS_SETTINGS_ID,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Externally supplied session inputs.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    /// Tenant resolved by authentication, if any.
    pub tenant: Option<TenantId>,
    /// The user asked to work offline.
    pub offline: bool,
}

impl SessionContext {
    /// An online session for `tenant`.
    pub fn online(tenant: TenantId) -> Self {
        Self {
            tenant: Some(tenant),
            offline: false,
        }
    }
}

/// Collaborators a session runs against.
#[derive(Clone)]
pub struct SessionDeps {
    pub gateway: Arc<dyn RemoteGateway>,
    pub feed: Arc<dyn ChangeFeed>,
    pub store: Arc<dyn LocalStateStore>,
}

/// A running sync session for one tenant.
pub struct SyncSession {
    engine: Arc<ReconciliationEngine>,
    scheduler: Arc<PollingScheduler>,
    lifecycle: LifecycleController,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncSession {
    /// Starts a session, or returns `None` when there is no tenant or the
    /// app is offline.
    ///
    /// Subscribes to both table groups, runs the initial full sync, then
    /// starts the feed listeners, the local-change watcher and the polling
    /// timer. A failed initial sync or subscription is logged and the
    /// session starts anyway; polling heals both.
    pub async fn start(
        context: SessionContext,
        deps: SessionDeps,
        config: SyncConfig,
    ) -> SyncResult<Option<Self>> {
        config.validate()?;

        let Some(tenant) = context.tenant else {
            info!("No tenant resolved, sync not started");
            return Ok(None);
        };
        if context.offline {
            info!("Offline mode, sync not started for tenant {}", tenant);
            return Ok(None);
        }

        let engine = Arc::new(ReconciliationEngine::new(
            tenant,
            deps.gateway,
            Arc::clone(&deps.store),
        ));
        let local_changes = deps.store.subscribe();

        let mut streams = Vec::with_capacity(2);
        for group in [Table::data_group(), Table::settings_group()] {
            match deps.feed.subscribe(engine.tenant(), &group).await {
                Ok(stream) => streams.push(stream),
                Err(e) => warn!(
                    "Realtime subscription for tenant {} failed, relying on polling: {}",
                    engine.tenant(),
                    e
                ),
            }
        }

        match engine.full_sync().await {
            Ok(outcome) => debug!("Initial sync: {:?}", outcome),
            Err(e) if e.is_transient() => info!(
                "Initial sync for tenant {} failed, polling will retry: {}",
                engine.tenant(),
                e
            ),
            Err(e) => warn!("Initial sync for tenant {} failed: {}", engine.tenant(), e),
        }

        let mut tasks: Vec<JoinHandle<()>> = streams
            .into_iter()
            .map(|stream| spawn_feed_listener(Arc::clone(&engine), stream))
            .collect();
        tasks.push(spawn_local_watcher(Arc::clone(&engine), local_changes));

        let scheduler = Arc::new(PollingScheduler::new(Arc::clone(&engine), &config));
        scheduler.resume();
        let lifecycle =
            LifecycleController::new(Arc::clone(&scheduler), config.resume_polling_on_active);

        info!("Sync session started for tenant {}", engine.tenant());
        Ok(Some(Self {
            engine,
            scheduler,
            lifecycle,
            tasks,
        }))
    }

    /// The engine, for manual refreshes.
    pub fn engine(&self) -> &Arc<ReconciliationEngine> {
        &self.engine
    }

    /// The polling timer.
    pub fn scheduler(&self) -> &Arc<PollingScheduler> {
        &self.scheduler
    }

    /// The tenant of this session.
    pub fn tenant(&self) -> &TenantId {
        self.engine.tenant()
    }

    /// Forwards an app state transition to the lifecycle controller.
    pub fn lifecycle(&self, state: AppState) {
        self.lifecycle.transition(state);
    }

    /// The last reported app state.
    pub fn app_state(&self) -> AppState {
        self.lifecycle.state()
    }

    /// Writes a record locally, then upserts it remotely.
    ///
    /// The local write stands even if the push fails. Append-only tables
    /// are pushed by the local-change watcher instead.
    pub async fn save(&self, table: Table, record: Record) -> SyncResult<()> {
        self.engine.store().upsert(table, record.clone());
        if table.is_append_only() {
            return Ok(());
        }
        if let Err(e) = self.engine.push(table, std::slice::from_ref(&record)).await {
            warn!("Saved {} {} locally but the push failed: {}", table, record.id, e);
            return Err(e);
        }
        Ok(())
    }

    /// Replaces the singleton business settings row.
    pub async fn save_business_settings(&self, data: Value) -> SyncResult<()> {
        self.save(
            Table::Settings(SettingsTable::BusinessSettings),
            Record::new(BUSINESS_SETTINGS_ID, data),
        )
        .await
    }

    /// Removes a record locally; the watcher propagates the deletion.
    pub fn remove(&self, table: Table, id: &RecordId) -> bool {
        self.engine.store().remove(table, id)
    }

    /// Whether the background tasks are still running.
    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|t| !t.is_finished())
    }

    /// Ends the session: stops listeners and the watcher, clears the
    /// polling timer and discards snapshots. Safe to call twice.
    pub fn shutdown(&mut self) {
        if self.tasks.is_empty() {
            return;
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.scheduler.pause();
        self.engine.reset();
        info!("Sync session ended for tenant {}", self.engine.tenant());
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_feed_listener(engine: Arc<ReconciliationEngine>, mut stream: ChangeStream) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = stream.recv().await {
            if let Err(e) = engine.handle_change(&event).await {
                warn!("Refresh of {} after change event failed: {}", event.table, e);
            }
        }
        debug!("Change stream for tenant {} ended", engine.tenant());
    })
}

fn spawn_local_watcher(
    engine: Arc<ReconciliationEngine>,
    mut changes: broadcast::Receiver<StoreChange>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(StoreChange {
                    table,
                    origin: ChangeOrigin::Local,
                }) => {
                    if let Err(e) = engine.handle_local_change(table).await {
                        warn!("Failed to propagate local changes to {}: {}", table, e);
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Local change watcher missed {} notifications, rescanning", missed);
                    engine.rescan_local().await;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
