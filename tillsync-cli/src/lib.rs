//! Configuration and wiring for the tillsync command-line client.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tillsync_sync::{
    HttpGateway, HttpGatewayConfig, LocalStateStore, MemoryStore, SessionContext, SessionDeps,
    SseChangeFeed, SseFeedConfig, SyncConfig,
};
use tillsync_types::{Table, TenantId};

/// Everything the client needs, as stored in its JSON config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Tenant to sync. No tenant means no session.
    pub tenant: Option<String>,
    /// Start without a session.
    pub offline: bool,
    pub sync: SyncConfig,
    pub gateway: HttpGatewayConfig,
    pub feed: SseFeedConfig,
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub tenant: Option<String>,
    pub offline: bool,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

impl CliConfig {
    /// Reads a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Reads `path` if given, otherwise starts from defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Applies command-line overrides. A base URL or API key applies to
    /// both the gateway and the feed.
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(tenant) = overrides.tenant {
            self.tenant = Some(tenant);
        }
        if overrides.offline {
            self.offline = true;
        }
        if let Some(base_url) = overrides.base_url {
            self.gateway.base_url = base_url.clone();
            self.feed.base_url = base_url;
        }
        if let Some(api_key) = overrides.api_key {
            self.gateway.api_key = api_key.clone();
            self.feed.api_key = api_key;
        }
    }

    /// Session inputs. A blank tenant is rejected rather than treated as
    /// absent.
    pub fn session_context(&self) -> Result<SessionContext> {
        let tenant = self
            .tenant
            .as_deref()
            .map(TenantId::parse)
            .transpose()
            .context("Invalid tenant in configuration")?;
        Ok(SessionContext {
            tenant,
            offline: self.offline,
        })
    }

    /// Builds the HTTP gateway, SSE feed and an empty in-memory store.
    pub fn build_deps(&self) -> Result<(SessionDeps, Arc<MemoryStore>)> {
        let gateway =
            HttpGateway::new(self.gateway.clone()).context("Failed to create backend gateway")?;
        let feed = SseChangeFeed::new(SseFeedConfig {
            buffer: self.sync.feed_buffer,
            ..self.feed.clone()
        })
        .context("Failed to create change feed")?;
        let store = Arc::new(MemoryStore::new());

        let deps = SessionDeps {
            gateway: Arc::new(gateway),
            feed: Arc::new(feed),
            store: store.clone(),
        };
        Ok((deps, store))
    }
}

/// Record count of every table, in catalogue order.
pub fn collection_counts(store: &dyn LocalStateStore) -> Vec<(Table, usize)> {
    Table::all().map(|t| (t, store.get(t).len())).collect()
}
