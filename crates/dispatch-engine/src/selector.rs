//! Readiness-aware round-robin selection.
//!
//! The cursor is a plain index guarded by the directory lock. Each step of a
//! selection pass claims one index under the lock, then queries the
//! candidate's readiness with the lock released, so registry round-trips
//! never serialize concurrent dispatches.

use dispatch_registry::NodeRegistry;
use tracing::{debug, warn};

use crate::directory::NodeDirectory;

/// Round-robin position over a directory of changing size.
///
/// A position left over from a larger directory is wrapped into range
/// before use.
#[derive(Debug, Default)]
pub struct RoundRobinCursor {
    position: usize,
}

impl RoundRobinCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start at an arbitrary position.
    pub fn at(position: usize) -> Self {
        Self { position }
    }

    /// Claim the next index in `0..count` and advance past it.
    ///
    /// Returns `None` without moving if `count` is zero.
    pub fn next(&mut self, count: usize) -> Option<usize> {
        if count == 0 {
            return None;
        }
        let idx = self.position % count;
        self.position = (idx + 1) % count;
        Some(idx)
    }

    /// Current position (for diagnostics).
    pub fn position(&self) -> usize {
        self.position
    }
}

/// Outcome of one selection pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// A candidate reported ready.
    Ready(String),
    /// Nobody was ready; this is the last candidate visited.
    Degraded(String),
    /// The directory was empty.
    NoCandidate,
}

impl Selection {
    pub fn node(&self) -> Option<&str> {
        match self {
            Selection::Ready(n) | Selection::Degraded(n) => Some(n),
            Selection::NoCandidate => None,
        }
    }
}

/// Walk the directory from the shared cursor until a ready node is found,
/// visiting each candidate at most once.
///
/// A failed readiness query counts as not ready.
pub async fn select_ready<R: NodeRegistry>(directory: &NodeDirectory, registry: &R) -> Selection {
    let snapshot = directory.snapshot();
    let mut last_visited = None;

    for _ in 0..snapshot.len() {
        let Some(idx) = directory.advance(snapshot.len()) else {
            break;
        };
        let node = &snapshot[idx];

        match registry.readiness(node).await {
            Ok(readiness) if readiness.is_ready() => {
                debug!(%node, idx, "selected ready node");
                return Selection::Ready(node.clone());
            }
            Ok(readiness) => {
                debug!(%node, ?readiness, "skipping node");
            }
            Err(e) => {
                warn!(%node, error = %e, "readiness query failed, skipping node");
            }
        }
        last_visited = Some(node.clone());
    }

    match last_visited {
        Some(node) => Selection::Degraded(node),
        None => Selection::NoCandidate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_registry::{
        DEFAULT_EDGE_LABEL, NodeCondition, NodeSnapshot, StaticRegistry,
    };

    fn node(name: &str, ready: bool) -> NodeSnapshot {
        let condition = if ready {
            NodeCondition::ready()
        } else {
            NodeCondition::not_ready()
        };
        NodeSnapshot::new(name)
            .with_label(DEFAULT_EDGE_LABEL, "")
            .with_condition(condition)
    }

    async fn directory_for(registry: &StaticRegistry) -> NodeDirectory {
        let directory = NodeDirectory::new(DEFAULT_EDGE_LABEL);
        directory.refresh(registry).await.unwrap();
        directory
    }

    // ── Cursor ─────────────────────────────────────────────────────

    #[test]
    fn cursor_cycles_through_indices() {
        let mut cursor = RoundRobinCursor::new();

        assert_eq!(cursor.next(3), Some(0));
        assert_eq!(cursor.next(3), Some(1));
        assert_eq!(cursor.next(3), Some(2));
        assert_eq!(cursor.next(3), Some(0)); // wraps
        assert_eq!(cursor.position(), 1);
    }

    #[test]
    fn cursor_zero_count_returns_none_and_stays() {
        let mut cursor = RoundRobinCursor::at(2);
        assert_eq!(cursor.next(0), None);
        assert_eq!(cursor.position(), 2);
    }

    #[test]
    fn cursor_single_entry() {
        let mut cursor = RoundRobinCursor::new();
        for _ in 0..10 {
            assert_eq!(cursor.next(1), Some(0));
        }
    }

    #[test]
    fn cursor_wraps_after_shrink() {
        let mut cursor = RoundRobinCursor::new();
        assert_eq!(cursor.next(5), Some(0));
        assert_eq!(cursor.next(5), Some(1));
        assert_eq!(cursor.next(5), Some(2));
        assert_eq!(cursor.next(5), Some(3));

        // Directory shrinks to 2: position 4 is out of range.
        let idx = cursor.next(2).unwrap();
        assert!(idx < 2);
        assert!(cursor.position() < 2);
    }

    // ── Selection ──────────────────────────────────────────────────

    #[tokio::test]
    async fn skips_unready_and_leaves_cursor_past_selection() {
        let registry = StaticRegistry::with_nodes(vec![
            node("a", false),
            node("b", true),
            node("c", false),
        ]);
        let directory = directory_for(&registry).await;

        let selection = select_ready(&directory, &registry).await;

        assert_eq!(selection, Selection::Ready("b".to_string()));
        assert_eq!(directory.cursor(), 2);
    }

    #[tokio::test]
    async fn all_ready_visits_each_node_once_per_rotation() {
        let registry = StaticRegistry::with_nodes(vec![
            node("a", true),
            node("b", true),
            node("c", true),
        ]);
        let directory = directory_for(&registry).await;

        let mut picked = Vec::new();
        for _ in 0..6 {
            picked.push(select_ready(&directory, &registry).await.node().unwrap().to_string());
        }

        assert_eq!(picked, vec!["a", "b", "c", "a", "b", "c"]);
    }

    #[tokio::test]
    async fn empty_directory_is_no_candidate_and_cursor_unmoved() {
        let registry = StaticRegistry::new();
        let directory = directory_for(&registry).await;
        directory.set_cursor(3);

        assert_eq!(
            select_ready(&directory, &registry).await,
            Selection::NoCandidate
        );
        assert_eq!(directory.cursor(), 3);
    }

    #[tokio::test]
    async fn none_ready_returns_last_visited_as_degraded() {
        let registry = StaticRegistry::with_nodes(vec![
            node("a", false),
            node("b", false),
            node("c", false),
        ]);
        let directory = directory_for(&registry).await;

        let selection = select_ready(&directory, &registry).await;

        assert_eq!(selection, Selection::Degraded("c".to_string()));
        // A full rotation brings the cursor back to where it started.
        assert_eq!(directory.cursor(), 0);
    }

    #[tokio::test]
    async fn failed_readiness_query_is_skipped() {
        let registry = StaticRegistry::with_nodes(vec![node("a", true), node("b", true)]);
        let directory = directory_for(&registry).await;

        // "a" disappears from the registry after the directory was built.
        registry.remove("a");

        assert_eq!(
            select_ready(&directory, &registry).await,
            Selection::Ready("b".to_string())
        );
    }

    #[tokio::test]
    async fn registry_outage_degrades_instead_of_failing() {
        let registry = StaticRegistry::with_nodes(vec![node("a", true), node("b", true)]);
        let directory = directory_for(&registry).await;
        registry.set_unavailable(true);

        assert_eq!(
            select_ready(&directory, &registry).await,
            Selection::Degraded("b".to_string())
        );
    }

    #[tokio::test]
    async fn out_of_bounds_cursor_wraps_after_shrink() {
        let registry = StaticRegistry::with_nodes(vec![
            node("a", true),
            node("b", true),
            node("c", true),
            node("d", true),
        ]);
        let directory = directory_for(&registry).await;
        directory.set_cursor(3);

        registry.remove("c");
        registry.remove("d");
        directory.refresh(&registry).await.unwrap();

        let selection = select_ready(&directory, &registry).await;
        assert!(matches!(selection, Selection::Ready(ref n) if n == "a" || n == "b"));
        assert!(directory.cursor() < 2);
    }

    #[tokio::test]
    async fn readiness_changes_are_seen_on_next_pass() {
        let registry = StaticRegistry::with_nodes(vec![node("a", false), node("b", true)]);
        let directory = directory_for(&registry).await;

        assert_eq!(
            select_ready(&directory, &registry).await,
            Selection::Ready("b".to_string())
        );

        registry.set_conditions("a", vec![NodeCondition::ready()]);
        assert_eq!(
            select_ready(&directory, &registry).await,
            Selection::Ready("a".to_string())
        );
    }
}
