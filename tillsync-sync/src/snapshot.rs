//! Per-collection memory of the last reconciled identifier sets.
//!
//! A snapshot is the only authority for what counts as "removed": an id
//! that is in the snapshot but no longer in the local store was deleted
//! locally.

use std::collections::{HashMap, HashSet};
use tillsync_types::{RecordId, Table};

/// Identifier set of one collection.
pub type IdSet = HashSet<RecordId>;

/// Snapshots keyed by table.
#[derive(Debug, Clone, Default)]
pub struct SnapshotTracker {
    snapshots: HashMap<Table, IdSet>,
}

impl SnapshotTracker {
    /// Creates a tracker with no snapshots.
    pub fn new() -> Self {
        Self::default()
    }

    /// The snapshot of a table, if one was ever taken.
    pub fn get(&self, table: Table) -> Option<&IdSet> {
        self.snapshots.get(&table)
    }

    /// Whether a table has a snapshot.
    pub fn contains(&self, table: Table) -> bool {
        self.snapshots.contains_key(&table)
    }

    /// Replaces a table's snapshot.
    pub fn set(&mut self, table: Table, ids: IdSet) {
        self.snapshots.insert(table, ids);
    }

    /// Number of tracked tables.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether no table is tracked.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Discards every snapshot.
    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}
