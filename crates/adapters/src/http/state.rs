use std::sync::Arc;
use std::time::Instant;

use infrastructure::metrics::AgentMetrics;
use ports::primary::alert_feed_port::AlertFeedPort;

/// Shared application state for the read API.
///
/// Passed to Axum handlers via `State(Arc<AppState>)`.
pub struct AppState {
    pub feed: Arc<dyn AlertFeedPort>,
    pub metrics: Arc<AgentMetrics>,
    pub start_time: Instant,
    pub version: &'static str,
    /// Marker count returned by the map endpoint when no limit is given.
    pub map_markers: usize,
}

impl AppState {
    pub fn new(feed: Arc<dyn AlertFeedPort>, metrics: Arc<AgentMetrics>) -> Self {
        Self {
            feed,
            metrics,
            start_time: Instant::now(),
            version: env!("CARGO_PKG_VERSION"),
            map_markers: domain::alert::query::DEFAULT_MAP_MARKERS,
        }
    }

    #[must_use]
    pub fn with_map_markers(mut self, map_markers: usize) -> Self {
        self.map_markers = map_markers.max(1);
        self
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
