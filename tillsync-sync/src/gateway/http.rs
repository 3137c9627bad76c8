//! PostgREST-style HTTP gateway.
//!
//! Every table is exposed at `{base_url}/rest/v1/{table}` and every row
//! carries the tenant column, which is used as a filter on reads and
//! deletes and stamped onto rows on upsert.

use super::RemoteGateway;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tillsync_types::{DataTable, RawRow, Record, RecordId, SettingsTable, TenantId};
use tracing::debug;

/// HTTP gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpGatewayConfig {
    /// Base URL of the backend (e.g. `https://project.example.com`).
    pub base_url: String,
    /// API key sent as `apikey` and as the bearer token.
    pub api_key: String,
    /// Column holding the tenant id on every table.
    pub tenant_column: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for HttpGatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:54321".to_string(),
            api_key: String::new(),
            tenant_column: "business_id".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Data-table row as stored by the backend.
#[derive(Debug, Serialize, Deserialize)]
struct DataRow {
    id: Value,
    #[serde(default)]
    data: Value,
}

/// Gateway over the backend's REST interface.
pub struct HttpGateway {
    config: HttpGatewayConfig,
    client: Client,
}

impl HttpGateway {
    /// Creates a gateway with its own HTTP client.
    pub fn new(config: HttpGatewayConfig) -> SyncResult<Self> {
        if config.base_url.is_empty() {
            return Err(SyncError::Config("base_url is empty".into()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &HttpGatewayConfig {
        &self.config
    }

    fn table_url(&self, table: &str) -> String {
        format!(
            "{}/rest/v1/{}",
            self.config.base_url.trim_end_matches('/'),
            table
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
    }

    fn tenant_filter(&self, tenant: &TenantId) -> (String, String) {
        (self.config.tenant_column.clone(), format!("eq.{tenant}"))
    }

    async fn check(response: Response) -> SyncResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(SyncError::Backend {
            status: status.as_u16(),
            body,
        })
    }

    async fn get_rows(&self, tenant: &TenantId, table: &str) -> SyncResult<Vec<RawRow>> {
        debug!("Fetching {} for tenant {}", table, tenant);
        let response = self
            .authorized(self.client.get(self.table_url(table)))
            .query(&[("select".to_string(), "*".to_string()), self.tenant_filter(tenant)])
            .send()
            .await?;
        let rows: Vec<RawRow> = Self::check(response).await?.json().await?;
        Ok(rows)
    }

    async fn post_rows(&self, table: &str, rows: Vec<Value>) -> SyncResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        debug!("Upserting {} rows into {}", rows.len(), table);
        // rows are keyed per tenant: singleton and slug ids repeat across tenants
        let conflict_target = format!("{},id", self.config.tenant_column);
        let response = self
            .authorized(self.client.post(self.table_url(table)))
            .query(&[("on_conflict", conflict_target.as_str())])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&rows)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete_rows(&self, tenant: &TenantId, table: &str, ids: &[RecordId]) -> SyncResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        debug!("Deleting {} rows from {}", ids.len(), table);
        let response = self
            .authorized(self.client.delete(self.table_url(table)))
            .query(&[
                self.tenant_filter(tenant),
                ("id".to_string(), in_filter(ids)),
            ])
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

/// Builds a PostgREST `in.(...)` filter with every id double-quoted.
fn in_filter(ids: &[RecordId]) -> String {
    let quoted: Vec<String> = ids
        .iter()
        .map(|id| format!("\"{}\"", id.as_str().replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

fn row_id(table: &str, id: &Value) -> SyncResult<RecordId> {
    match id {
        Value::String(s) if !s.is_empty() => Ok(RecordId::new(s.as_str())),
        Value::Number(n) => Ok(RecordId::new(n.to_string())),
        other => Err(SyncError::InvalidRow {
            table: table.to_string(),
            reason: format!("unusable id {other}"),
        }),
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn fetch_records(
        &self,
        tenant: &TenantId,
        table: DataTable,
    ) -> SyncResult<Vec<Record>> {
        let rows = self.get_rows(tenant, table.name()).await?;
        rows.into_iter()
            .map(|row| -> SyncResult<Record> {
                let row: DataRow = serde_json::from_value(Value::Object(row))?;
                Ok(Record::new(row_id(table.name(), &row.id)?, row.data))
            })
            .collect()
    }

    async fn upsert_records(
        &self,
        tenant: &TenantId,
        table: DataTable,
        records: &[Record],
    ) -> SyncResult<()> {
        let rows = records
            .iter()
            .map(|r| {
                let mut row = RawRow::new();
                row.insert("id".into(), Value::String(r.id.to_string()));
                row.insert(
                    self.config.tenant_column.clone(),
                    Value::String(tenant.to_string()),
                );
                row.insert("data".into(), r.data.clone());
                Value::Object(row)
            })
            .collect();
        self.post_rows(table.name(), rows).await
    }

    async fn delete_records(
        &self,
        tenant: &TenantId,
        table: DataTable,
        ids: &[RecordId],
    ) -> SyncResult<()> {
        self.delete_rows(tenant, table.name(), ids).await
    }

    async fn fetch_settings(
        &self,
        tenant: &TenantId,
        table: SettingsTable,
    ) -> SyncResult<Vec<RawRow>> {
        let mut rows = self.get_rows(tenant, table.name()).await?;
        for row in &mut rows {
            row.remove(&self.config.tenant_column);
        }
        Ok(rows)
    }

    async fn upsert_settings(
        &self,
        tenant: &TenantId,
        table: SettingsTable,
        rows: &[RawRow],
    ) -> SyncResult<()> {
        let rows = rows
            .iter()
            .map(|row| {
                let mut row = row.clone();
                row.insert(
                    self.config.tenant_column.clone(),
                    Value::String(tenant.to_string()),
                );
                Value::Object(row)
            })
            .collect();
        self.post_rows(table.name(), rows).await
    }

    async fn delete_settings(
        &self,
        tenant: &TenantId,
        table: SettingsTable,
        ids: &[RecordId],
    ) -> SyncResult<()> {
        self.delete_rows(tenant, table.name(), ids).await
    }
}
