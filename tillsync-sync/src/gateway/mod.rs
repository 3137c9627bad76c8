//! Remote gateway abstraction.
//!
//! The engine talks to the multi-tenant backend only through
//! [`RemoteGateway`]. Implementations are stateless façades: no caching, no
//! retries, and a failed call means the backend state is unknown but the
//! local state is untouched.

pub mod http;
pub mod mock;

use crate::error::SyncResult;
use async_trait::async_trait;
use tillsync_types::{DataTable, RawRow, Record, RecordId, SettingsTable, TenantId};

pub use http::{HttpGateway, HttpGatewayConfig};

/// Backend access for both table groups, always scoped to one tenant.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Fetches every record of a data table.
    async fn fetch_records(&self, tenant: &TenantId, table: DataTable)
        -> SyncResult<Vec<Record>>;

    /// Inserts or overwrites records, idempotent by id.
    async fn upsert_records(
        &self,
        tenant: &TenantId,
        table: DataTable,
        records: &[Record],
    ) -> SyncResult<()>;

    /// Deletes records by id.
    async fn delete_records(
        &self,
        tenant: &TenantId,
        table: DataTable,
        ids: &[RecordId],
    ) -> SyncResult<()>;

    /// Fetches the raw rows of a settings table.
    async fn fetch_settings(
        &self,
        tenant: &TenantId,
        table: SettingsTable,
    ) -> SyncResult<Vec<RawRow>>;

    /// Inserts or overwrites settings rows, idempotent by `id`.
    async fn upsert_settings(
        &self,
        tenant: &TenantId,
        table: SettingsTable,
        rows: &[RawRow],
    ) -> SyncResult<()>;

    /// Deletes settings rows by `id`.
    async fn delete_settings(
        &self,
        tenant: &TenantId,
        table: SettingsTable,
        ids: &[RecordId],
    ) -> SyncResult<()>;
}
