//! dispatch-engine: assigns devices to ready edge nodes.
//!
//! For every dispatch the engine:
//!
//! - optionally refreshes the node directory from the registry
//! - walks the directory round-robin from the shared cursor, querying each
//!   candidate's readiness, for at most one full rotation
//! - durably records the device → node binding
//! - returns the node name (flagged as degraded if no node was ready)
//!
//! # Architecture
//!
//! ```text
//! Dispatcher
//!   ├── NodeRegistry (list nodes, query readiness)
//!   ├── NodeDirectory
//!   │   └── Mutex { node snapshot, RoundRobinCursor }
//!   ├── BindingStore (durable device → node map)
//!   └── RefreshPolicy (per request | interval | startup)
//! ```

pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod refresh;
pub mod selector;

pub use directory::NodeDirectory;
pub use dispatcher::{Assignment, Dispatcher};
pub use error::{DispatchError, DispatchResult};
pub use refresh::RefreshPolicy;
pub use selector::{RoundRobinCursor, Selection, select_ready};
