//! dispatch-state: durable device→node binding store.
//!
//! Backed by [redb](https://docs.rs/redb). Every binding lives in a single
//! named table (`DeviceNode`) mapping device identifiers to the name of the
//! edge node that served them. Only the latest binding per device is kept.
//!
//! # Architecture
//!
//! Keys are the raw device id (`&str`), values are the raw UTF-8 node name
//! (`&[u8]`). There is no envelope and no schema version.
//!
//! The [`BindingStore`] trait is the seam the dispatch engine writes through.
//! [`RedbBindingStore`] is the local-file implementation; it is `Clone` +
//! `Send` + `Sync` (backed by `Arc<Database>`) and can be shared across
//! async tasks. redb serializes write transactions internally, so callers
//! need no extra locking around `put`.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::{BindingStore, RedbBindingStore};
pub use types::*;
