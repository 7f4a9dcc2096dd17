//! Dispatcher: the engine object request handlers share.
//!
//! Owns the node directory (and with it the round-robin cursor), the
//! registry handle, and the binding store. Handlers hold it behind an `Arc`.

use std::sync::Arc;
use std::time::Duration;

use dispatch_registry::NodeRegistry;
use dispatch_state::BindingStore;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::directory::NodeDirectory;
use crate::error::{DispatchError, DispatchResult};
use crate::refresh::RefreshPolicy;
use crate::selector::{Selection, select_ready};

/// Result of a successful dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub device_id: String,
    pub node: String,
    /// True when no node was ready and the last visited node was used.
    pub degraded: bool,
}

/// Assigns devices to edge nodes and records the bindings.
pub struct Dispatcher<R> {
    registry: R,
    store: Arc<dyn BindingStore>,
    directory: NodeDirectory,
    policy: RefreshPolicy,
}

impl<R: NodeRegistry> Dispatcher<R> {
    /// Create a dispatcher with an empty directory.
    pub fn new(
        registry: R,
        store: Arc<dyn BindingStore>,
        edge_label: impl Into<String>,
        policy: RefreshPolicy,
    ) -> Self {
        Self {
            registry,
            store,
            directory: NodeDirectory::new(edge_label),
            policy,
        }
    }

    pub fn directory(&self) -> &NodeDirectory {
        &self.directory
    }

    /// Current directory contents.
    pub fn directory_snapshot(&self) -> Vec<String> {
        self.directory.snapshot().to_vec()
    }

    /// Rebuild the directory. Registry failures are logged and the previous
    /// directory is kept; returns the new size on success.
    pub async fn refresh(&self) -> Option<usize> {
        match self.directory.refresh(&self.registry).await {
            Ok(count) => {
                debug!(count, "node directory refreshed");
                Some(count)
            }
            Err(e) => {
                warn!(
                    error = %e,
                    retained = self.directory.len(),
                    "node directory refresh failed, keeping previous list"
                );
                None
            }
        }
    }

    /// Pick a node for `device_id` and durably bind the device to it.
    ///
    /// The returned node name has been committed to the binding store.
    pub async fn dispatch(&self, device_id: &str) -> DispatchResult<Assignment> {
        if device_id.is_empty() {
            return Err(DispatchError::InvalidDeviceId);
        }

        if self.policy.refreshes_per_request() {
            self.refresh().await;
        }

        let (node, degraded) = match select_ready(&self.directory, &self.registry).await {
            Selection::Ready(node) => (node, false),
            Selection::Degraded(node) => {
                warn!(%device_id, %node, "no ready edge node, using fallback");
                (node, true)
            }
            Selection::NoCandidate => {
                warn!(%device_id, "no edge nodes in directory");
                return Err(DispatchError::NoCandidate);
            }
        };

        let store = Arc::clone(&self.store);
        let (id, name) = (device_id.to_string(), node.clone());
        tokio::task::spawn_blocking(move || store.put(&id, &name))
            .await
            .map_err(|e| DispatchError::Task(e.to_string()))??;

        info!(%device_id, %node, degraded, "device dispatched");
        Ok(Assignment {
            device_id: device_id.to_string(),
            node,
            degraded,
        })
    }

    /// The node a device is currently bound to, if any.
    pub async fn lookup(&self, device_id: &str) -> DispatchResult<Option<String>> {
        if device_id.is_empty() {
            return Err(DispatchError::InvalidDeviceId);
        }
        let store = Arc::clone(&self.store);
        let id = device_id.to_string();
        let node = tokio::task::spawn_blocking(move || store.get(&id))
            .await
            .map_err(|e| DispatchError::Task(e.to_string()))??;
        Ok(node)
    }

    /// Periodically refresh the directory until `shutdown` flips.
    pub async fn run_refresh_loop(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = interval.as_millis() as u64, "directory refresh loop started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.refresh().await;
                }
                _ = shutdown.changed() => {
                    info!("directory refresh loop shutting down");
                    break;
                }
            }
        }
    }
}
