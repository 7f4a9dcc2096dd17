//! dispatch-registry: the cluster node registry as seen by the dispatcher.
//!
//! The dispatcher never owns node state. It asks a registry for the current
//! node list (with labels) and, per candidate, for that node's latest status
//! conditions. Both calls are remote and fallible.
//!
//! # Components
//!
//! - **`registry`**: the [`NodeRegistry`] trait and the [`RegistryClient`]
//!   enum the daemon builds from configuration
//! - **`kube`**: [`KubeApiRegistry`], an HTTP(S) client for a
//!   Kubernetes-compatible node API, in-cluster or through an API proxy
//! - **`static_registry`**: [`StaticRegistry`], an in-memory registry
//!   loadable from a TOML nodes file
//! - **`types`**: node snapshots, conditions, and [`Readiness`]

pub mod error;
pub mod kube;
pub mod registry;
pub mod static_registry;
pub mod types;

pub use error::{RegistryError, RegistryResult};
pub use kube::KubeApiRegistry;
pub use registry::{NodeRegistry, RegistryClient};
pub use static_registry::StaticRegistry;
pub use types::*;
