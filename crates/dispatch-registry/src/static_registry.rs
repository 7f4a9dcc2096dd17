//! In-memory registry.
//!
//! Holds a fixed (but runtime-mutable) node list. Used for tests and for
//! deployments where the edge node set is declared in a TOML nodes file:
//!
//! ```toml
//! [[node]]
//! name = "edge-1"
//! labels = { "node-role.kubernetes.io/edge" = "" }
//! conditions = [{ type = "Ready", status = "True" }]
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Deserialize;
use tracing::debug;

use crate::error::{RegistryError, RegistryResult};
use crate::registry::NodeRegistry;
use crate::types::{NodeCondition, NodeSnapshot};

#[derive(Deserialize)]
struct NodesFile {
    #[serde(default, rename = "node")]
    nodes: Vec<NodeSnapshot>,
}

/// Registry backed by an in-process node list.
///
/// Cloning shares the underlying list.
#[derive(Clone, Default)]
pub struct StaticRegistry {
    nodes: Arc<RwLock<Vec<NodeSnapshot>>>,
    unavailable: Arc<AtomicBool>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nodes(nodes: Vec<NodeSnapshot>) -> Self {
        Self {
            nodes: Arc::new(RwLock::new(nodes)),
            unavailable: Arc::default(),
        }
    }

    /// Load nodes from a TOML file with `[[node]]` entries.
    pub fn from_file(path: &Path) -> RegistryResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RegistryError::Config(format!("read {}: {e}", path.display())))?;
        let file: NodesFile = toml::from_str(&content)
            .map_err(|e| RegistryError::Config(format!("parse {}: {e}", path.display())))?;
        debug!(?path, count = file.nodes.len(), "static registry loaded");
        Ok(Self::with_nodes(file.nodes))
    }

    /// Insert a node, or replace the node with the same name in place.
    pub fn upsert(&self, node: NodeSnapshot) {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        match nodes.iter_mut().find(|n| n.name == node.name) {
            Some(existing) => *existing = node,
            None => nodes.push(node),
        }
    }

    /// Remove a node by name. Returns true if it existed.
    pub fn remove(&self, name: &str) -> bool {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        let before = nodes.len();
        nodes.retain(|n| n.name != name);
        nodes.len() != before
    }

    /// Replace a node's condition list. Returns false for unknown nodes.
    pub fn set_conditions(&self, name: &str, conditions: Vec<NodeCondition>) -> bool {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        match nodes.iter_mut().find(|n| n.name == name) {
            Some(node) => {
                node.conditions = conditions;
                true
            }
            None => false,
        }
    }

    /// Make every query fail with [`RegistryError::Unavailable`] (for testing).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    fn check_available(&self) -> RegistryResult<()> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(RegistryError::Unavailable);
        }
        Ok(())
    }
}

impl NodeRegistry for StaticRegistry {
    async fn list_nodes(&self) -> RegistryResult<Vec<NodeSnapshot>> {
        self.check_available()?;
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        Ok(nodes.clone())
    }

    async fn node_conditions(&self, name: &str) -> RegistryResult<Vec<NodeCondition>> {
        self.check_available()?;
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        nodes
            .iter()
            .find(|n| n.name == name)
            .map(|n| n.conditions.clone())
            .ok_or_else(|| RegistryError::NodeNotFound(name.to_string()))
    }
}
