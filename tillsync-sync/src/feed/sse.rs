//! Server-sent events change feed.
//!
//! Opens one long-lived `text/event-stream` request per subscription and
//! forwards every `data:` line that decodes to a [`ChangeEvent`]. The stream
//! is not reconnected when the server closes it; the polling fallback
//! covers the gap until the next session starts.

use super::{ChangeFeed, ChangeStream};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tillsync_types::{ChangeEvent, Table, TenantId};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// SSE feed configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SseFeedConfig {
    /// Base URL of the backend.
    pub base_url: String,
    /// API key sent as `apikey` and as the bearer token.
    pub api_key: String,
    /// Path of the change stream endpoint.
    pub path: String,
    /// Capacity of each subscription channel.
    pub buffer: usize,
}

impl Default for SseFeedConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:54321".to_string(),
            api_key: String::new(),
            path: "/realtime/v1/changes".to_string(),
            buffer: 64,
        }
    }
}

/// Incremental decoder for an event stream body.
///
/// Chunks may split lines anywhere, including inside a UTF-8 sequence, so
/// bytes are buffered until a newline arrives.
#[derive(Debug, Default)]
pub struct SseParser {
    pending: Vec<u8>,
}

impl SseParser {
    /// Creates an empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every complete event it finished.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ChangeEvent> {
        self.pending.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            let Some(payload) = line.strip_prefix("data:") else {
                // blank separators, comments, `event:` and `id:` fields
                continue;
            };
            match serde_json::from_str::<ChangeEvent>(payload.trim_start()) {
                Ok(event) => events.push(event),
                Err(e) => debug!("Skipping undecodable change event: {}", e),
            }
        }

        events
    }
}

/// Change feed over server-sent events.
pub struct SseChangeFeed {
    config: SseFeedConfig,
    client: Client,
}

impl SseChangeFeed {
    /// Creates a feed. The client has no overall timeout since streams are
    /// long-lived.
    pub fn new(config: SseFeedConfig) -> SyncResult<Self> {
        if config.base_url.is_empty() {
            return Err(SyncError::Config("base_url is empty".into()));
        }
        let client = Client::builder()
            .build()
            .map_err(|e| SyncError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn stream_url(&self) -> String {
        format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.path
        )
    }
}

#[async_trait]
impl ChangeFeed for SseChangeFeed {
    async fn subscribe(&self, tenant: &TenantId, tables: &[Table]) -> SyncResult<ChangeStream> {
        let names: Vec<&'static str> = tables.iter().map(|t| t.name()).collect();
        let response = self
            .client
            .get(self.stream_url())
            .header("apikey", &self.config.api_key)
            .header("Accept", "text/event-stream")
            .bearer_auth(&self.config.api_key)
            .query(&[("tenant", tenant.to_string()), ("tables", names.join(","))])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Backend {
                status: status.as_u16(),
                body,
            });
        }

        info!("Subscribed to {} tables for tenant {}", names.len(), tenant);

        let (tx, rx) = mpsc::channel(self.config.buffer.max(1));
        let mut body = response.bytes_stream();
        let tenant = tenant.clone();

        tokio::spawn(async move {
            let mut parser = SseParser::new();
            loop {
                tokio::select! {
                    _ = tx.closed() => {
                        debug!("Change stream for tenant {} unsubscribed", tenant);
                        break;
                    }
                    chunk = body.next() => match chunk {
                        Some(Ok(bytes)) => {
                            for event in parser.push(&bytes) {
                                // drop tables outside this subscription
                                if !names.contains(&event.table.as_str()) {
                                    continue;
                                }
                                if tx.send(event).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            warn!("Change stream for tenant {} failed: {}", tenant, e);
                            break;
                        }
                        None => {
                            info!("Change stream for tenant {} closed by server", tenant);
                            break;
                        }
                    },
                }
            }
        });

        Ok(rx)
    }
}
