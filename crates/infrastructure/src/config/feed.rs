use std::time::Duration;

use serde::{Deserialize, Serialize};

use domain::alert::feed::DEFAULT_CAPACITY;
use domain::alert::query::{DEFAULT_MAP_MARKERS, MAX_LIMIT};

use super::common::{ConfigError, check_positive, check_range};
use crate::constants::{DEFAULT_REFRESH_INTERVAL_SECS, MAX_FEED_CAPACITY};

/// Retention and refresh cadence of the aggregated collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedConfig {
    /// Newest alerts retained.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Period of the snapshot refresh that replaces the collection.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Markers served by the map endpoint when the request sets no limit.
    #[serde(default = "default_map_markers")]
    pub map_markers: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            map_markers: DEFAULT_MAP_MARKERS,
        }
    }
}

impl FeedConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        check_range("feed.capacity", self.capacity, 1, MAX_FEED_CAPACITY)?;
        check_positive("feed.refresh_interval_secs", self.refresh_interval_secs)?;
        check_range("feed.map_markers", self.map_markers, 1, MAX_LIMIT)
    }
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}
fn default_refresh_interval_secs() -> u64 {
    DEFAULT_REFRESH_INTERVAL_SECS
}
fn default_map_markers() -> usize {
    DEFAULT_MAP_MARKERS
}
