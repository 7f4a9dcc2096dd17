//! HTTP handlers.
//!
//! Responses are plain text except `/nodes`, which returns JSON. A missing
//! or empty device id answers `200` with [`EMPTY_ID_MESSAGE`] as the body;
//! callers match on that text.

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dispatch_engine::DispatchError;
use dispatch_registry::NodeRegistry;
use tracing::{error, warn};

use crate::{ApiState, DEGRADED_HEADER};

/// Body returned when the `id` parameter is missing or empty.
pub const EMPTY_ID_MESSAGE: &str = "Device ID can not be empty";

/// Query string of `/query` as ordered pairs, so repeated keys do not fail
/// extraction.
type QueryPairs = Result<Query<Vec<(String, String)>>, QueryRejection>;

/// First `id` value in the query string, empty when absent or unparsable.
fn device_id(query: QueryPairs) -> String {
    query
        .ok()
        .and_then(|Query(pairs)| pairs.into_iter().find(|(key, _)| key == "id"))
        .map(|(_, value)| value)
        .unwrap_or_default()
}

fn error_response(e: &DispatchError) -> Response {
    let status = match e {
        DispatchError::InvalidDeviceId => {
            return (StatusCode::OK, EMPTY_ID_MESSAGE).into_response();
        }
        DispatchError::NoCandidate => StatusCode::SERVICE_UNAVAILABLE,
        DispatchError::Storage(_) | DispatchError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(error = %e, %status, "request failed");
    }
    (status, e.to_string()).into_response()
}

/// GET /query?id=<device>
pub async fn query<R: NodeRegistry>(
    State(state): State<ApiState<R>>,
    query: QueryPairs,
) -> Response {
    let id = device_id(query);
    if id.is_empty() {
        return (StatusCode::OK, EMPTY_ID_MESSAGE).into_response();
    }

    let dispatch = state.dispatcher.dispatch(&id);
    match tokio::time::timeout(state.request_timeout, dispatch).await {
        Ok(Ok(assignment)) if assignment.degraded => {
            ([(DEGRADED_HEADER, "true")], assignment.node).into_response()
        }
        Ok(Ok(assignment)) => assignment.node.into_response(),
        Ok(Err(e)) => error_response(&e),
        Err(_) => {
            warn!(device_id = %id, timeout = ?state.request_timeout, "dispatch timed out");
            (StatusCode::GATEWAY_TIMEOUT, "dispatch timed out").into_response()
        }
    }
}

/// GET /bindings/{id}
pub async fn get_binding<R: NodeRegistry>(
    State(state): State<ApiState<R>>,
    Path(id): Path<String>,
) -> Response {
    match state.dispatcher.lookup(&id).await {
        Ok(Some(node)) => node.into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "no binding for device").into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /nodes
pub async fn list_nodes<R: NodeRegistry>(State(state): State<ApiState<R>>) -> Response {
    Json(state.dispatcher.directory_snapshot()).into_response()
}

/// GET /healthz
pub async fn healthz() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use dispatch_engine::{Dispatcher, RefreshPolicy};
    use dispatch_registry::{DEFAULT_EDGE_LABEL, NodeCondition, NodeSnapshot, StaticRegistry};
    use dispatch_state::{BindingStore, RedbBindingStore};
    use tower::ServiceExt;

    use super::*;
    use crate::build_router;

    fn edge(name: &str, ready: bool) -> NodeSnapshot {
        let condition = if ready {
            NodeCondition::ready()
        } else {
            NodeCondition::not_ready()
        };
        NodeSnapshot::new(name)
            .with_label(DEFAULT_EDGE_LABEL, "")
            .with_condition(condition)
    }

    fn setup(nodes: Vec<NodeSnapshot>) -> (axum::Router, Arc<RedbBindingStore>) {
        let store = Arc::new(RedbBindingStore::open_in_memory().unwrap());
        let dispatcher = Dispatcher::new(
            StaticRegistry::with_nodes(nodes),
            store.clone(),
            DEFAULT_EDGE_LABEL,
            RefreshPolicy::PerRequest,
        );
        let router = build_router(Arc::new(dispatcher), Duration::from_secs(5));
        (router, store)
    }

    async fn get(router: axum::Router, uri: &str) -> (StatusCode, String, Option<String>) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = router.oneshot(req).await.unwrap();
        let status = resp.status();
        let degraded = resp
            .headers()
            .get(DEGRADED_HEADER)
            .map(|v| v.to_str().unwrap().to_string());
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap(), degraded)
    }

    #[tokio::test]
    async fn query_returns_node_name_as_plain_text() {
        let (router, store) = setup(vec![edge("edge-1", true)]);

        let (status, body, degraded) = get(router, "/query?id=dev-1").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "edge-1");
        assert_eq!(degraded, None);
        assert_eq!(store.get("dev-1").unwrap().as_deref(), Some("edge-1"));
    }

    #[tokio::test]
    async fn missing_or_empty_id_answers_ok_with_message() {
        let (router, store) = setup(vec![edge("edge-1", true)]);

        for uri in ["/query", "/query?id=", "/query?other=x", "/query?id=&id=dev-1"] {
            let (status, body, degraded) = get(router.clone(), uri).await;
            assert_eq!(status, StatusCode::OK, "{uri}");
            assert_eq!(body, EMPTY_ID_MESSAGE, "{uri}");
            assert_eq!(degraded, None);
        }
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn repeated_id_uses_first_value() {
        let (router, store) = setup(vec![edge("edge-1", true)]);

        let (status, body, _) = get(router, "/query?id=dev-a&id=dev-b").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "edge-1");
        assert_eq!(store.get("dev-a").unwrap().as_deref(), Some("edge-1"));
        assert!(store.get("dev-b").unwrap().is_none());
    }

    #[tokio::test]
    async fn percent_encoded_id_is_decoded() {
        let (router, store) = setup(vec![edge("edge-1", true)]);

        get(router, "/query?id=dev%2F1").await;

        assert_eq!(store.get("dev/1").unwrap().as_deref(), Some("edge-1"));
    }

    #[tokio::test]
    async fn degraded_dispatch_sets_header() {
        let (router, _) = setup(vec![edge("edge-1", false)]);

        let (status, body, degraded) = get(router, "/query?id=dev-1").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "edge-1");
        assert_eq!(degraded.as_deref(), Some("true"));
    }

    #[tokio::test]
    async fn no_edge_nodes_is_service_unavailable() {
        let (router, store) = setup(vec![]);

        let (status, _, _) = get(router, "/query?id=dev-1").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(store.get("dev-1").unwrap().is_none());
    }

    #[tokio::test]
    async fn binding_lookup_after_dispatch() {
        let (router, _) = setup(vec![edge("edge-1", true)]);

        let (status, _, _) = get(router.clone(), "/bindings/dev-1").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        get(router.clone(), "/query?id=dev-1").await;
        let (status, body, _) = get(router, "/bindings/dev-1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "edge-1");
    }

    #[tokio::test]
    async fn nodes_lists_directory_as_json() {
        let (router, _) = setup(vec![edge("edge-1", true), edge("edge-2", false)]);
        get(router.clone(), "/query?id=dev-1").await;

        let (status, body, _) = get(router, "/nodes").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"["edge-1","edge-2"]"#);
    }

    #[tokio::test]
    async fn healthz_ok() {
        let (router, _) = setup(vec![]);
        let (status, body, _) = get(router, "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }
}
