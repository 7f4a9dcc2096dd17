//! When the node directory is rebuilt.

use std::time::Duration;

/// Directory refresh strategy.
///
/// Refreshing on every request keeps the directory exact at the cost of one
/// registry list call per dispatch; an interval bounds registry load under
/// high request rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshPolicy {
    /// Rebuild the directory before every selection.
    #[default]
    PerRequest,
    /// Rebuild from a background task at a fixed interval.
    Interval(Duration),
    /// Build once at startup only.
    Startup,
}

impl RefreshPolicy {
    pub fn refreshes_per_request(&self) -> bool {
        matches!(self, RefreshPolicy::PerRequest)
    }

    /// Background refresh interval, if this policy uses one.
    pub fn interval(&self) -> Option<Duration> {
        match self {
            RefreshPolicy::Interval(d) => Some(*d),
            _ => None,
        }
    }
}
