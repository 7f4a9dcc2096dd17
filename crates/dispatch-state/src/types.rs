//! Domain types for the binding store.

use serde::{Deserialize, Serialize};

use crate::error::{StateError, StateResult};

/// Externally supplied device identifier.
pub type DeviceId = String;

/// Name of a cluster node.
pub type NodeName = String;

/// The latest node assignment recorded for a device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Binding {
    pub device_id: DeviceId,
    pub node: NodeName,
}

impl Binding {
    pub fn new(device_id: impl Into<DeviceId>, node: impl Into<NodeName>) -> Self {
        Self {
            device_id: device_id.into(),
            node: node.into(),
        }
    }

    /// Reject bindings that would store an empty key or an empty node name.
    pub fn validate(&self) -> StateResult<()> {
        validate_pair(&self.device_id, &self.node)
    }
}

pub(crate) fn validate_pair(device_id: &str, node: &str) -> StateResult<()> {
    if device_id.is_empty() {
        return Err(StateError::InvalidBinding("device id is empty".to_string()));
    }
    if node.is_empty() {
        return Err(StateError::InvalidBinding(format!(
            "node name is empty for device {device_id}"
        )));
    }
    Ok(())
}
