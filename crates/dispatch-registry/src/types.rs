//! Node snapshots and readiness as reported by the registry.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Label key that marks a node as edge-capable. Only the key matters.
pub const DEFAULT_EDGE_LABEL: &str = "node-role.kubernetes.io/edge";

/// Condition type that signals a node can take work.
pub const READY_CONDITION: &str = "Ready";

/// One entry of a node's status condition list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCondition {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
}

impl NodeCondition {
    pub fn new(kind: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            status: status.into(),
        }
    }

    /// `Ready=True`.
    pub fn ready() -> Self {
        Self::new(READY_CONDITION, "True")
    }

    /// `Ready=False`.
    pub fn not_ready() -> Self {
        Self::new(READY_CONDITION, "False")
    }
}

/// Readiness of a node at query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    NotReady,
    /// The node reported no conditions at all.
    Unknown,
}

impl Readiness {
    /// Derive readiness from the most recent (last) status condition.
    ///
    /// Only a trailing `Ready=True` condition counts as ready.
    pub fn from_conditions(conditions: &[NodeCondition]) -> Self {
        match conditions.last() {
            None => Readiness::Unknown,
            Some(c) if c.kind == READY_CONDITION && c.status.eq_ignore_ascii_case("true") => {
                Readiness::Ready
            }
            Some(_) => Readiness::NotReady,
        }
    }

    pub fn is_ready(self) -> bool {
        self == Readiness::Ready
    }
}

/// A node as listed by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub name: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub conditions: Vec<NodeCondition>,
}

impl NodeSnapshot {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: HashMap::new(),
            conditions: Vec::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_condition(mut self, condition: NodeCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Whether the node carries `key` among its labels (any value).
    pub fn has_label(&self, key: &str) -> bool {
        self.labels.contains_key(key)
    }

    pub fn readiness(&self) -> Readiness {
        Readiness::from_conditions(&self.conditions)
    }
}
