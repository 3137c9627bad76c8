//! An in-memory gateway for testing.
//!
//! Rows are partitioned by tenant and table exactly like the real backend,
//! every call is logged, and failures or latency can be injected per table.

use super::RemoteGateway;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tillsync_types::{slugify, DataTable, RawRow, Record, RecordId, SettingsTable, TenantId};

/// A gateway call as observed by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Fetch { table: String },
    Upsert { table: String, ids: Vec<RecordId> },
    Delete { table: String, ids: Vec<RecordId> },
}

impl GatewayCall {
    /// The table the call targeted.
    pub fn table(&self) -> &str {
        match self {
            GatewayCall::Fetch { table }
            | GatewayCall::Upsert { table, .. }
            | GatewayCall::Delete { table, .. } => table,
        }
    }
}

type Rows = BTreeMap<RecordId, Value>;

#[derive(Default)]
struct Inner {
    rows: HashMap<(TenantId, &'static str), Rows>,
    calls: Vec<GatewayCall>,
    failing: HashSet<&'static str>,
    failing_writes: bool,
    offline: bool,
    fetch_delay: Option<Duration>,
    write_delay: Option<Duration>,
}

/// In-memory backend.
#[derive(Default)]
pub struct MockGateway {
    inner: Mutex<Inner>,
}

impl MockGateway {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a data table directly, bypassing the call log.
    pub fn seed_records(&self, tenant: &TenantId, table: DataTable, records: &[Record]) {
        let mut inner = self.lock();
        let rows = inner.rows.entry((tenant.clone(), table.name())).or_default();
        for record in records {
            rows.insert(record.id.clone(), record.data.clone());
        }
    }

    /// Seeds a settings table directly, bypassing the call log.
    pub fn seed_settings(&self, tenant: &TenantId, table: SettingsTable, rows: &[RawRow]) {
        let mut inner = self.lock();
        let stored = inner.rows.entry((tenant.clone(), table.name())).or_default();
        for row in rows {
            stored.insert(settings_key(row), Value::Object(row.clone()));
        }
    }

    /// Current records of a data table, sorted by id.
    pub fn records(&self, tenant: &TenantId, table: DataTable) -> Vec<Record> {
        let inner = self.lock();
        inner
            .rows
            .get(&(tenant.clone(), table.name()))
            .map(|rows| {
                rows.iter()
                    .map(|(id, data)| Record::new(id.clone(), data.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Current keys of any table, sorted.
    pub fn ids(&self, tenant: &TenantId, table: &str) -> Vec<RecordId> {
        let inner = self.lock();
        inner
            .rows
            .iter()
            .find(|((t, name), _)| t == tenant && *name == table)
            .map(|(_, rows)| rows.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every call made so far.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.lock().calls.clone()
    }

    /// Calls that targeted one table.
    pub fn calls_for(&self, table: &str) -> Vec<GatewayCall> {
        self.calls().into_iter().filter(|c| c.table() == table).collect()
    }

    /// Delete calls only.
    pub fn delete_calls(&self) -> Vec<GatewayCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, GatewayCall::Delete { .. }))
            .collect()
    }

    /// Number of fetches made so far.
    pub fn fetch_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, GatewayCall::Fetch { .. }))
            .count()
    }

    /// Forgets the call log.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Makes every call against `table` fail with a backend error.
    pub fn fail_table(&self, table: &'static str) {
        self.lock().failing.insert(table);
    }

    /// Undoes [`fail_table`](Self::fail_table).
    pub fn heal_table(&self, table: &'static str) {
        self.lock().failing.remove(table);
    }

    /// Makes every upsert and delete fail while fetches keep working.
    pub fn fail_writes(&self, fail: bool) {
        self.lock().failing_writes = fail;
    }

    /// Makes every call fail with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Delays every fetch by `delay`.
    pub fn set_fetch_delay(&self, delay: Option<Duration>) {
        self.lock().fetch_delay = delay;
    }

    /// Delays every upsert and delete by `delay` before it lands.
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        self.lock().write_delay = delay;
    }

    async fn pause_write(&self) {
        let delay = self.lock().write_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_write(&self, table: &'static str) -> SyncResult<()> {
        self.check(table)?;
        if self.lock().failing_writes {
            return Err(SyncError::Backend {
                status: 500,
                body: format!("write to {table} rejected"),
            });
        }
        Ok(())
    }

    fn check(&self, table: &'static str) -> SyncResult<()> {
        let inner = self.lock();
        if inner.offline {
            return Err(SyncError::Network("mock backend offline".into()));
        }
        if inner.failing.contains(table) {
            return Err(SyncError::Backend {
                status: 503,
                body: format!("{table} unavailable"),
            });
        }
        Ok(())
    }

    async fn fetch_rows(&self, tenant: &TenantId, table: &'static str) -> SyncResult<Rows> {
        let delay = {
            let mut inner = self.lock();
            inner.calls.push(GatewayCall::Fetch {
                table: table.to_string(),
            });
            inner.fetch_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check(table)?;
        let inner = self.lock();
        Ok(inner
            .rows
            .get(&(tenant.clone(), table))
            .cloned()
            .unwrap_or_default())
    }

    fn upsert_rows(
        &self,
        tenant: &TenantId,
        table: &'static str,
        rows: Vec<(RecordId, Value)>,
    ) -> SyncResult<()> {
        {
            let mut inner = self.lock();
            inner.calls.push(GatewayCall::Upsert {
                table: table.to_string(),
                ids: rows.iter().map(|(id, _)| id.clone()).collect(),
            });
        }
        self.check_write(table)?;
        let mut inner = self.lock();
        let stored = inner.rows.entry((tenant.clone(), table)).or_default();
        stored.extend(rows);
        Ok(())
    }

    fn delete_rows(&self, tenant: &TenantId, table: &'static str, ids: &[RecordId]) -> SyncResult<()> {
        {
            let mut inner = self.lock();
            inner.calls.push(GatewayCall::Delete {
                table: table.to_string(),
                ids: ids.to_vec(),
            });
        }
        self.check_write(table)?;
        let mut inner = self.lock();
        if let Some(stored) = inner.rows.get_mut(&(tenant.clone(), table)) {
            for id in ids {
                stored.remove(id);
            }
        }
        Ok(())
    }
}

fn settings_key(row: &RawRow) -> RecordId {
    match row.get("id").and_then(Value::as_str) {
        Some(id) => RecordId::new(id),
        None => RecordId::new(slugify(
            row.get("name").and_then(Value::as_str).unwrap_or_default(),
        )),
    }
}

#[async_trait]
impl RemoteGateway for MockGateway {
    async fn fetch_records(
        &self,
        tenant: &TenantId,
        table: DataTable,
    ) -> SyncResult<Vec<Record>> {
        let rows = self.fetch_rows(tenant, table.name()).await?;
        Ok(rows.into_iter().map(|(id, data)| Record::new(id, data)).collect())
    }

    async fn upsert_records(
        &self,
        tenant: &TenantId,
        table: DataTable,
        records: &[Record],
    ) -> SyncResult<()> {
        let rows = records
            .iter()
            .map(|r| (r.id.clone(), r.data.clone()))
            .collect();
        self.pause_write().await;
        self.upsert_rows(tenant, table.name(), rows)
    }

    async fn delete_records(
        &self,
        tenant: &TenantId,
        table: DataTable,
        ids: &[RecordId],
    ) -> SyncResult<()> {
        self.pause_write().await;
        self.delete_rows(tenant, table.name(), ids)
    }

    async fn fetch_settings(
        &self,
        tenant: &TenantId,
        table: SettingsTable,
    ) -> SyncResult<Vec<RawRow>> {
        let rows = self.fetch_rows(tenant, table.name()).await?;
        Ok(rows
            .into_values()
            .filter_map(|v| match v {
                Value::Object(row) => Some(row),
                _ => None,
            })
            .collect())
    }

    async fn upsert_settings(
        &self,
        tenant: &TenantId,
        table: SettingsTable,
        rows: &[RawRow],
    ) -> SyncResult<()> {
        let rows = rows
            .iter()
            .map(|row| (settings_key(row), Value::Object(row.clone())))
            .collect();
        self.pause_write().await;
        self.upsert_rows(tenant, table.name(), rows)
    }

    async fn delete_settings(
        &self,
        tenant: &TenantId,
        table: SettingsTable,
        ids: &[RecordId],
    ) -> SyncResult<()> {
        self.pause_write().await;
        self.delete_rows(tenant, table.name(), ids)
    }
}
