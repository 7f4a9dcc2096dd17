//! Node directory: the current list of edge-capable nodes.
//!
//! The node list and the round-robin cursor are one shared resource behind
//! a single mutex. A refresh builds the new list with the lock released and
//! swaps it in whole, so readers see either the old list or the new one.
//! The cursor survives refreshes.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dispatch_registry::{NodeRegistry, RegistryResult};
use tracing::debug;

use crate::selector::RoundRobinCursor;

struct DirectoryState {
    nodes: Arc<[String]>,
    cursor: RoundRobinCursor,
}

/// Shared, atomically replaced list of edge node names.
pub struct NodeDirectory {
    edge_label: String,
    state: Mutex<DirectoryState>,
}

impl NodeDirectory {
    /// Create an empty directory that admits nodes labeled `edge_label`.
    pub fn new(edge_label: impl Into<String>) -> Self {
        Self {
            edge_label: edge_label.into(),
            state: Mutex::new(DirectoryState {
                nodes: Arc::from(Vec::new()),
                cursor: RoundRobinCursor::new(),
            }),
        }
    }

    pub fn edge_label(&self) -> &str {
        &self.edge_label
    }

    /// Rebuild the directory from the registry's current node list.
    ///
    /// On error the previous list is kept untouched. Returns the number of
    /// edge nodes now in the directory.
    pub async fn refresh<R: NodeRegistry>(&self, registry: &R) -> RegistryResult<usize> {
        let listed = registry.list_nodes().await?;
        let total = listed.len();
        let nodes: Arc<[String]> = listed
            .into_iter()
            .filter(|n| n.has_label(&self.edge_label))
            .map(|n| n.name)
            .collect();
        let count = nodes.len();

        self.lock().nodes = nodes;
        debug!(total, edge = count, "node directory rebuilt");
        Ok(count)
    }

    /// Immutable view of the current node list.
    pub fn snapshot(&self) -> Arc<[String]> {
        Arc::clone(&self.lock().nodes)
    }

    pub fn len(&self) -> usize {
        self.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current cursor position.
    pub fn cursor(&self) -> usize {
        self.lock().cursor.position()
    }

    /// Claim the next index for a pass over a snapshot of `count` nodes.
    pub(crate) fn advance(&self, count: usize) -> Option<usize> {
        self.lock().cursor.next(count)
    }

    #[cfg(test)]
    pub(crate) fn set_cursor(&self, position: usize) {
        self.lock().cursor = RoundRobinCursor::at(position);
    }

    fn lock(&self) -> MutexGuard<'_, DirectoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
