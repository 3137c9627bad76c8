//! Reconciliation engine.
//!
//! Pull-replace synchronization between the local store and the backend:
//! a full sync installs every remote collection wholesale, a table sync
//! refreshes one collection, and local removals are diffed against the
//! snapshots and pushed through the deletion guard.
//!
//! The only exception to "remote wins" is the bootstrap rule: when the
//! primary collection is empty remotely but populated locally, the local
//! state is pushed up and kept.

use crate::error::SyncResult;
use crate::gateway::RemoteGateway;
use crate::guard::{DeletionDecision, DeletionGuard, IdDiff};
use crate::settings::{record_key, records_to_rows, rows_to_records};
use crate::snapshot::{IdSet, SnapshotTracker};
use crate::state::SyncState;
use crate::store::{ChangeOrigin, Collections, LocalStateStore};
use futures::future::{try_join, try_join_all};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tillsync_types::{ChangeEvent, DataTable, Record, RecordId, SettingsTable, Table, TenantId};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Which path a completed reconciliation took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Every table pulled and replaced.
    Full,
    /// First-run migration: local collections pushed and kept.
    Bootstrap,
    /// One table refreshed.
    Table,
}

/// Summary of a completed reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub mode: SyncMode,
    /// Records installed locally, per table.
    pub installed: BTreeMap<Table, usize>,
    /// Records pushed to the backend, per table (bootstrap only).
    pub pushed: BTreeMap<Table, usize>,
    pub elapsed: Duration,
}

/// Result of a sync request.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Another reconciliation was in flight; the request was dropped.
    Skipped,
    /// The change event named a table outside the catalogue.
    Ignored,
}

impl SyncOutcome {
    /// The report, if the sync ran.
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }

    /// Whether the sync ran to completion.
    pub fn is_completed(&self) -> bool {
        matches!(self, SyncOutcome::Completed(_))
    }
}

/// What a local change caused remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalChangeReport {
    pub table: Table,
    /// First observation of the table: the snapshot was only seeded.
    pub seeded: bool,
    pub decision: DeletionDecision,
    /// Append-only records pushed because they appeared locally.
    pub pushed: Vec<RecordId>,
}

/// Orchestrates full, table-scoped and local-change reconciliation for one
/// tenant.
pub struct ReconciliationEngine {
    tenant: TenantId,
    gateway: Arc<dyn RemoteGateway>,
    store: Arc<dyn LocalStateStore>,
    state: SyncState,
    snapshots: Mutex<SnapshotTracker>,
}

impl ReconciliationEngine {
    /// Creates an engine for one tenant session.
    pub fn new(
        tenant: TenantId,
        gateway: Arc<dyn RemoteGateway>,
        store: Arc<dyn LocalStateStore>,
    ) -> Self {
        Self {
            tenant,
            gateway,
            store,
            state: SyncState::new(),
            snapshots: Mutex::new(SnapshotTracker::new()),
        }
    }

    /// The tenant this engine syncs.
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Shared sync flags.
    pub fn state(&self) -> &SyncState {
        &self.state
    }

    /// The local store.
    pub fn store(&self) -> &Arc<dyn LocalStateStore> {
        &self.store
    }

    /// Copy of a table's snapshot.
    pub fn snapshot(&self, table: Table) -> Option<IdSet> {
        self.lock_snapshots().get(table).cloned()
    }

    // ── Full sync ────────────────────────────────────────────────

    /// Fetches every table and installs the result.
    ///
    /// Dropped (not queued) when another reconciliation is in flight. On
    /// error the local store and snapshots are untouched.
    pub async fn full_sync(&self) -> SyncResult<SyncOutcome> {
        let Some(_guard) = self.state.try_begin() else {
            debug!("Full sync for tenant {} skipped: sync in flight", self.tenant);
            return Ok(SyncOutcome::Skipped);
        };

        let started = Instant::now();
        let remote = self.fetch_all().await?;

        let primary = Table::Data(DataTable::PRIMARY);
        let remote_primary_empty = remote.get(&primary).is_none_or(Vec::is_empty);
        let local_primary_empty = self.store.get(primary).is_empty();

        let (collections, mode, pushed) = if remote_primary_empty && !local_primary_empty {
            info!(
                "Remote {} empty for tenant {}, bootstrapping from local state",
                primary, self.tenant
            );
            let (collections, pushed) = self.bootstrap(remote).await?;
            (collections, SyncMode::Bootstrap, pushed)
        } else {
            (remote, SyncMode::Full, BTreeMap::new())
        };

        let report = self.install(collections, mode, pushed, started);
        self.state.mark_initialized();

        info!(
            "Full sync for tenant {} finished ({:?}, {} records, {:?})",
            self.tenant,
            report.mode,
            report.installed.values().sum::<usize>(),
            report.elapsed
        );
        Ok(SyncOutcome::Completed(report))
    }

    async fn fetch_all(&self) -> SyncResult<Collections> {
        let data = try_join_all(DataTable::ALL.into_iter().map(|t| async move {
            let table = Table::Data(t);
            self.fetch_table(table).await.map(|records| (table, records))
        }));
        let settings = try_join_all(SettingsTable::ALL.into_iter().map(|t| async move {
            let table = Table::Settings(t);
            self.fetch_table(table).await.map(|records| (table, records))
        }));

        let (data, settings) = try_join(data, settings).await?;
        Ok(data.into_iter().chain(settings).collect())
    }

    /// Pushes every collection that is empty remotely but not locally and
    /// keeps those local copies. Everything else takes the remote copy.
    async fn bootstrap(
        &self,
        mut remote: Collections,
    ) -> SyncResult<(Collections, BTreeMap<Table, usize>)> {
        let mut pushed = BTreeMap::new();

        for table in Table::all() {
            let remote_empty = remote.get(&table).is_none_or(Vec::is_empty);
            if !remote_empty {
                continue;
            }
            let local = self.store.get(table);
            if local.is_empty() {
                continue;
            }
            self.push_table(table, &local).await?;
            debug!("Bootstrap pushed {} records to {}", local.len(), table);
            pushed.insert(table, local.len());
            remote.insert(table, local);
        }

        Ok((remote, pushed))
    }

    /// Installs collections in one store call and moves the snapshots to
    /// exactly what was installed.
    fn install(
        &self,
        collections: Collections,
        mode: SyncMode,
        pushed: BTreeMap<Table, usize>,
        started: Instant,
    ) -> SyncReport {
        let mut installed = BTreeMap::new();
        let mut ids = Vec::with_capacity(collections.len());
        for (table, records) in &collections {
            installed.insert(*table, records.len());
            ids.push((*table, key_set(*table, records)));
        }

        // store and snapshots move together under the snapshot lock
        let mut snapshots = self.lock_snapshots();
        self.store.replace_all(collections, ChangeOrigin::Sync);
        for (table, set) in ids {
            snapshots.set(table, set);
        }
        drop(snapshots);

        SyncReport {
            mode,
            installed,
            pushed,
            elapsed: started.elapsed(),
        }
    }

    // ── Table-scoped sync ────────────────────────────────────────

    /// Refetches one table and replaces only that local slice.
    ///
    /// Shares the in-flight slot with [`full_sync`](Self::full_sync): while a
    /// reconciliation runs, the request is dropped and the next event or
    /// poll tick catches up.
    pub async fn sync_table(&self, table: Table) -> SyncResult<SyncOutcome> {
        let Some(_guard) = self.state.try_begin() else {
            debug!("Refresh of {} skipped: sync in flight", table);
            return Ok(SyncOutcome::Skipped);
        };

        let started = Instant::now();
        let records = self.fetch_table(table).await?;
        debug!("Refreshed {} ({} records)", table, records.len());

        let mut collections = Collections::new();
        collections.insert(table, records);
        Ok(SyncOutcome::Completed(self.install(
            collections,
            SyncMode::Table,
            BTreeMap::new(),
            started,
        )))
    }

    /// Handles one realtime notification: marks the channel alive, then
    /// refreshes the named table.
    pub async fn handle_change(&self, event: &ChangeEvent) -> SyncResult<SyncOutcome> {
        self.state.record_realtime();
        match event.table() {
            Ok(table) => {
                debug!("Change event: {} on {}", event.kind, table);
                self.sync_table(table).await
            }
            Err(_) => {
                debug!("Ignoring change event for untracked table {}", event.table);
                Ok(SyncOutcome::Ignored)
            }
        }
    }

    // ── Local changes ────────────────────────────────────────────

    /// Diffs a collection against its snapshot and propagates the result.
    ///
    /// Removals go through [`DeletionGuard`]; new entries of append-only
    /// tables are pushed. The snapshot moves to the current ids only when
    /// every remote call succeeded, so a failed push is retried on the next
    /// observation. A sync that installs state while the remote calls run
    /// keeps its snapshot.
    ///
    /// The collection is read under the snapshot lock, so a concurrent
    /// install can never slip between the two reads of the diff.
    pub async fn handle_local_change(&self, table: Table) -> SyncResult<LocalChangeReport> {
        let (records, current, previous) = {
            let mut snapshots = self.lock_snapshots();
            let records = self.store.get(table);
            let current = key_set(table, &records);
            match snapshots.get(table) {
                Some(previous) => {
                    let previous = previous.clone();
                    (records, current, previous)
                }
                None => {
                    snapshots.set(table, current);
                    return Ok(LocalChangeReport {
                        table,
                        seeded: true,
                        decision: DeletionDecision::Unchanged,
                        pushed: Vec::new(),
                    });
                }
            }
        };

        let diff = IdDiff::between(&previous, &current);
        let mut report = LocalChangeReport {
            table,
            seeded: false,
            decision: DeletionDecision::Unchanged,
            pushed: Vec::new(),
        };

        if table.tracks_deletions() {
            report.decision = DeletionGuard::evaluate(&current, &diff);
        }

        match &report.decision {
            DeletionDecision::Unchanged => {}
            DeletionDecision::SuspectedReset { removed } => {
                warn!(
                    "{} went from {} records to none; treating as a local reset, no remote deletes issued",
                    table, removed
                );
            }
            DeletionDecision::Delete(ids) => {
                info!("Deleting {} records from {}", ids.len(), table);
                self.delete_remote(table, ids).await?;
            }
        }

        if table.is_append_only() && !diff.added.is_empty() {
            let added: Vec<Record> = records
                .into_iter()
                .filter(|r| diff.added.binary_search(&record_key(table, r)).is_ok())
                .collect();
            debug!("Pushing {} new records to {}", added.len(), table);
            self.push_table(table, &added).await?;
            report.pushed = diff.added.clone();
        }

        let mut snapshots = self.lock_snapshots();
        if snapshots.get(table) == Some(&previous) {
            snapshots.set(table, current);
        } else {
            debug!("Snapshot of {} replaced by a sync, keeping it", table);
        }
        drop(snapshots);
        Ok(report)
    }

    /// Runs [`handle_local_change`](Self::handle_local_change) for every
    /// table, logging failures.
    pub async fn rescan_local(&self) {
        for table in Table::all() {
            if let Err(e) = self.handle_local_change(table).await {
                warn!("Failed to propagate local changes to {}: {}", table, e);
            }
        }
    }

    // ── Write-through ────────────────────────────────────────────

    /// Pushes records to the backend without touching local state.
    pub async fn push(&self, table: Table, records: &[Record]) -> SyncResult<()> {
        self.push_table(table, records).await
    }

    /// Forgets snapshots and flags, as at the start of a session.
    pub fn reset(&self) {
        self.lock_snapshots().clear();
        self.state.reset();
    }

    // ── Gateway adapters ─────────────────────────────────────────

    async fn fetch_table(&self, table: Table) -> SyncResult<Vec<Record>> {
        match table {
            Table::Data(t) => self.gateway.fetch_records(&self.tenant, t).await,
            Table::Settings(t) => {
                let rows = self.gateway.fetch_settings(&self.tenant, t).await?;
                Ok(rows_to_records(t, rows))
            }
        }
    }

    async fn push_table(&self, table: Table, records: &[Record]) -> SyncResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        match table {
            Table::Data(t) => self.gateway.upsert_records(&self.tenant, t, records).await,
            Table::Settings(t) => {
                let rows = records_to_rows(t, records);
                self.gateway.upsert_settings(&self.tenant, t, &rows).await
            }
        }
    }

    async fn delete_remote(&self, table: Table, ids: &[RecordId]) -> SyncResult<()> {
        match table {
            Table::Data(t) => self.gateway.delete_records(&self.tenant, t, ids).await,
            Table::Settings(t) => self.gateway.delete_settings(&self.tenant, t, ids).await,
        }
    }

    fn lock_snapshots(&self) -> MutexGuard<'_, SnapshotTracker> {
        self.snapshots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn key_set(table: Table, records: &[Record]) -> IdSet {
    records.iter().map(|r| record_key(table, r)).collect()
}
