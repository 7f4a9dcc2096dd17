//! The registry seam used by the dispatch engine.

use std::future::Future;

use crate::error::RegistryResult;
use crate::kube::KubeApiRegistry;
use crate::static_registry::StaticRegistry;
use crate::types::{NodeCondition, NodeSnapshot, Readiness};

/// A queryable source of cluster nodes and their readiness.
///
/// Both operations are remote calls that may fail; callers decide how to
/// absorb failures. Nothing is cached between calls.
pub trait NodeRegistry: Send + Sync + 'static {
    /// Every node currently known to the registry, in registry order.
    fn list_nodes(&self) -> impl Future<Output = RegistryResult<Vec<NodeSnapshot>>> + Send;

    /// The latest status conditions of a single node.
    fn node_conditions(
        &self,
        name: &str,
    ) -> impl Future<Output = RegistryResult<Vec<NodeCondition>>> + Send;

    /// Readiness of a single node, evaluated now.
    fn readiness(&self, name: &str) -> impl Future<Output = RegistryResult<Readiness>> + Send {
        async move {
            let conditions = self.node_conditions(name).await?;
            Ok(Readiness::from_conditions(&conditions))
        }
    }
}

/// Registry backend selected at startup.
pub enum RegistryClient {
    Static(StaticRegistry),
    Kube(KubeApiRegistry),
}

impl RegistryClient {
    pub fn kind(&self) -> &'static str {
        match self {
            RegistryClient::Static(_) => "static",
            RegistryClient::Kube(_) => "kube",
        }
    }
}

impl NodeRegistry for RegistryClient {
    async fn list_nodes(&self) -> RegistryResult<Vec<NodeSnapshot>> {
        match self {
            RegistryClient::Static(r) => r.list_nodes().await,
            RegistryClient::Kube(r) => r.list_nodes().await,
        }
    }

    async fn node_conditions(&self, name: &str) -> RegistryResult<Vec<NodeCondition>> {
        match self {
            RegistryClient::Static(r) => r.node_conditions(name).await,
            RegistryClient::Kube(r) => r.node_conditions(name).await,
        }
    }
}
