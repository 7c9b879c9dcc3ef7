//! Undo history for decomposition states.
//!
//! A snapshot records the per-table column assignment at the moment a
//! decomposition was accepted. History is a plain LIFO stack: one push per
//! accepted decomposition, one pop per undo. FD and RIC annotations are
//! never part of a snapshot; they are server-derived and must be recomputed
//! after a restore.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Column assignment of every decomposed table in a group, in table order.
///
/// Serializes as the bare array form (`[[0,1],[2,3]]`) used by persisted
/// session history.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    pub tables: Vec<Vec<usize>>,
}

impl Snapshot {
    /// Snapshot of the given per-table column lists.
    pub fn new(tables: Vec<Vec<usize>>) -> Self {
        Snapshot { tables }
    }

    /// Parse a persisted snapshot, recovering to an empty snapshot when the
    /// JSON is unusable. Session restore must never fail outright over one
    /// corrupt history entry.
    pub fn from_json_lossy(text: &str) -> Snapshot {
        match serde_json::from_str(text) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "unparsable snapshot JSON, substituting empty");
                Snapshot::default()
            }
        }
    }
}

/// LIFO stack of accepted decomposition snapshots.
#[derive(Debug, Clone, Default)]
pub struct SnapshotHistory {
    stack: Vec<Snapshot>,
}

impl SnapshotHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted decomposition.
    pub fn push(&mut self, snapshot: Snapshot) {
        self.stack.push(snapshot);
    }

    /// Remove and return the most recent snapshot, or `None` when there is
    /// nothing to restore.
    pub fn pop(&mut self) -> Option<Snapshot> {
        self.stack.pop()
    }

    /// Most recent snapshot without removing it.
    pub fn peek(&self) -> Option<&Snapshot> {
        self.stack.last()
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_lifo() {
        let mut history = SnapshotHistory::new();
        let s1 = Snapshot::new(vec![vec![0, 1], vec![2]]);
        let s2 = Snapshot::new(vec![vec![0], vec![1, 2]]);

        history.push(s1.clone());
        history.push(s2.clone());

        assert_eq!(history.pop(), Some(s2));
        assert_eq!(history.pop(), Some(s1));
    }

    #[test]
    fn test_pop_empty_is_none() {
        let mut history = SnapshotHistory::new();
        assert_eq!(history.pop(), None);

        history.push(Snapshot::default());
        history.pop();
        assert_eq!(history.pop(), None);
    }

    #[test]
    fn test_json_roundtrip_bare_array() {
        let snapshot = Snapshot::new(vec![vec![0, 2], vec![1]]);
        let json = serde_json::to_string(&snapshot).unwrap();
        assert_eq!(json, "[[0,2],[1]]");
        assert_eq!(Snapshot::from_json_lossy(&json), snapshot);
    }

    #[test]
    fn test_lossy_parse_recovers_empty() {
        assert_eq!(Snapshot::from_json_lossy("not json"), Snapshot::default());
        assert_eq!(Snapshot::from_json_lossy("{\"a\":1}"), Snapshot::default());
    }
}
