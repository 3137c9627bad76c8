//! Local state store.
//!
//! The store is the single shared mutable resource of a session. The UI
//! writes to it directly; the engine writes to it when applying fetched
//! state. Every write is broadcast as a [`StoreChange`] so the deletion
//! guard can diff what the UI did.

use std::collections::HashMap;
use std::sync::RwLock;
use tillsync_types::{Record, RecordId, Table};
use tokio::sync::broadcast;

/// Every collection of a session, keyed by table.
pub type Collections = HashMap<Table, Vec<Record>>;

/// Who wrote to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// A UI/domain mutation.
    Local,
    /// The engine installing fetched state.
    Sync,
}

/// Notification that one collection was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreChange {
    pub table: Table,
    pub origin: ChangeOrigin,
}

/// Reactive local store consumed by the UI and written by the engine.
pub trait LocalStateStore: Send + Sync {
    /// Current records of one collection.
    fn get(&self, table: Table) -> Vec<Record>;

    /// Replaces one collection.
    fn set(&self, table: Table, records: Vec<Record>, origin: ChangeOrigin);

    /// Replaces several collections in one step; readers never observe a
    /// mix of old and new collections.
    fn replace_all(&self, collections: Collections, origin: ChangeOrigin);

    /// Drops every collection.
    fn clear(&self);

    /// Subscribes to write notifications.
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;

    /// Inserts or overwrites one record by id.
    fn upsert(&self, table: Table, record: Record) {
        let mut records = self.get(table);
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        self.set(table, records, ChangeOrigin::Local);
    }

    /// Removes one record by id. Returns whether it existed.
    fn remove(&self, table: Table, id: &RecordId) -> bool {
        let mut records = self.get(table);
        let before = records.len();
        records.retain(|r| &r.id != id);
        let removed = records.len() != before;
        if removed {
            self.set(table, records, ChangeOrigin::Local);
        }
        removed
    }
}

/// In-process store.
pub struct MemoryStore {
    collections: RwLock<Collections>,
    changes: broadcast::Sender<StoreChange>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            collections: RwLock::new(HashMap::new()),
            changes,
        }
    }

    /// Creates a store pre-populated without emitting notifications, as
    /// state restored from disk would be.
    pub fn with_collections(collections: Collections) -> Self {
        let store = Self::new();
        *store
            .collections
            .write()
            .unwrap_or_else(|e| e.into_inner()) = collections;
        store
    }

    /// Copy of every collection.
    pub fn snapshot(&self) -> Collections {
        self.collections
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn notify(&self, table: Table, origin: ChangeOrigin) {
        // no subscribers is fine
        let _ = self.changes.send(StoreChange { table, origin });
    }
}

impl LocalStateStore for MemoryStore {
    fn get(&self, table: Table) -> Vec<Record> {
        self.collections
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&table)
            .cloned()
            .unwrap_or_default()
    }

    fn set(&self, table: Table, records: Vec<Record>, origin: ChangeOrigin) {
        self.collections
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(table, records);
        self.notify(table, origin);
    }

    fn replace_all(&self, collections: Collections, origin: ChangeOrigin) {
        let tables: Vec<Table> = collections.keys().copied().collect();
        {
            let mut guard = self.collections.write().unwrap_or_else(|e| e.into_inner());
            for (table, records) in collections {
                guard.insert(table, records);
            }
        }
        for table in tables {
            self.notify(table, origin);
        }
    }

    fn clear(&self) {
        let tables: Vec<Table> = {
            let mut guard = self.collections.write().unwrap_or_else(|e| e.into_inner());
            let tables = guard.keys().copied().collect();
            guard.clear();
            tables
        };
        for table in tables {
            self.notify(table, ChangeOrigin::Local);
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
