//! Bulk-wipe protection for outbound deletions.
//!
//! From a diff's point of view, "the user deleted every product" and "the
//! local store was reset" look the same: a collection goes from N ids to
//! none. The guard treats that transition as a reset and never propagates
//! it. Removing some but not all ids is propagated as-is.

use crate::snapshot::IdSet;
use tillsync_types::RecordId;

/// What a local change means for the remote copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionDecision {
    /// Nothing was removed.
    Unchanged,
    /// Delete exactly these ids remotely.
    Delete(Vec<RecordId>),
    /// The collection went from non-empty to empty; delete nothing.
    SuspectedReset { removed: usize },
}

impl DeletionDecision {
    /// Ids that should be deleted remotely.
    pub fn ids(&self) -> &[RecordId] {
        match self {
            DeletionDecision::Delete(ids) => ids,
            _ => &[],
        }
    }
}

/// Ids that appeared and disappeared between two observations, sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdDiff {
    pub added: Vec<RecordId>,
    pub removed: Vec<RecordId>,
}

impl IdDiff {
    /// Computes `current − previous` and `previous − current`.
    pub fn between(previous: &IdSet, current: &IdSet) -> Self {
        let mut added: Vec<RecordId> = current.difference(previous).cloned().collect();
        let mut removed: Vec<RecordId> = previous.difference(current).cloned().collect();
        added.sort();
        removed.sort();
        Self { added, removed }
    }

    /// Whether both sides are empty.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Decides which local removals may reach the backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeletionGuard;

impl DeletionGuard {
    /// Classifies the removals of one observation.
    pub fn evaluate(current: &IdSet, diff: &IdDiff) -> DeletionDecision {
        if diff.removed.is_empty() {
            DeletionDecision::Unchanged
        } else if current.is_empty() {
            DeletionDecision::SuspectedReset {
                removed: diff.removed.len(),
            }
        } else {
            DeletionDecision::Delete(diff.removed.clone())
        }
    }
}
