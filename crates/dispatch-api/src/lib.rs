//! dispatch-api: HTTP surface of the edge dispatcher.
//!
//! A thin layer over [`Dispatcher`]: it extracts the device id, applies the
//! request timeout, and maps outcomes to plain-text responses.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/query?id=<device>` | Dispatch a device, returns the node name |
//! | GET | `/bindings/{id}` | Node a device is currently bound to |
//! | GET | `/nodes` | Current edge node directory (JSON) |
//! | GET | `/healthz` | Liveness |

pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use dispatch_engine::Dispatcher;
use dispatch_registry::NodeRegistry;

/// Header set to `true` when the returned node was a fallback.
pub const DEGRADED_HEADER: &str = "x-dispatch-degraded";

/// Shared state for API handlers.
pub struct ApiState<R> {
    pub dispatcher: Arc<Dispatcher<R>>,
    /// Upper bound for one dispatch, registry calls and commit included.
    pub request_timeout: Duration,
}

impl<R> Clone for ApiState<R> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
            request_timeout: self.request_timeout,
        }
    }
}

/// Build the complete API router.
pub fn build_router<R: NodeRegistry>(
    dispatcher: Arc<Dispatcher<R>>,
    request_timeout: Duration,
) -> Router {
    let state = ApiState {
        dispatcher,
        request_timeout,
    };

    Router::new()
        .route("/query", get(handlers::query::<R>))
        .route("/bindings/{id}", get(handlers::get_binding::<R>))
        .route("/nodes", get(handlers::list_nodes::<R>))
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
}
