//! Read-only snapshot of the aggregator handed to observers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::entity::{Alert, AlertId};
use super::error::AlertError;

/// Aggregator lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedState {
    #[default]
    Uninitialized,
    /// First snapshot in flight.
    Loading,
    Ready,
    /// Periodic or manual refresh in flight; prior alerts stay visible.
    Refreshing,
}

impl FeedState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Refreshing => "refreshing",
        }
    }

    /// True while a snapshot fetch is outstanding, or before the first one.
    pub fn is_loading(self) -> bool {
        !matches!(self, Self::Ready)
    }

    /// True once a first snapshot attempt has completed.
    pub fn has_loaded(self) -> bool {
        matches!(self, Self::Ready | Self::Refreshing)
    }
}

impl std::fmt::Display for FeedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything an observer sees: the whole alert collection plus status.
///
/// `alerts` is shared, so cloning a view is cheap.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedView {
    pub state: FeedState,
    pub alerts: Arc<[Alert]>,
    /// Most recent fetch failure; cleared by the next successful fetch.
    #[serde(serialize_with = "serialize_error")]
    pub last_error: Option<AlertError>,
    /// Incremented on every published change.
    pub version: u64,
    pub refreshed_at: Option<DateTime<Utc>>,
    /// Name of the source that served the last snapshot.
    pub source: Option<String>,
}

impl FeedView {
    pub fn is_loading(&self) -> bool {
        self.state.is_loading()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn get(&self, id: &AlertId) -> Option<&Alert> {
        self.alerts.iter().find(|a| &a.id == id)
    }
}

fn serialize_error<S: serde::Serializer>(
    error: &Option<AlertError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

impl Default for FeedView {
    fn default() -> Self {
        Self {
            state: FeedState::Uninitialized,
            alerts: Arc::from(Vec::new()),
            last_error: None,
            version: 0,
            refreshed_at: None,
            source: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::entity::AlertRecord;

    #[test]
    fn default_view_is_loading_and_empty() {
        let view = FeedView::default();
        assert!(view.is_loading());
        assert!(view.is_empty());
        assert_eq!(view.version, 0);
    }

    #[test]
    fn loading_flag_follows_state() {
        assert!(FeedState::Loading.is_loading());
        assert!(!FeedState::Ready.is_loading());
        assert!(FeedState::Refreshing.is_loading());
        assert!(FeedState::Refreshing.has_loaded());
        assert!(!FeedState::Uninitialized.has_loaded());
    }

    #[test]
    fn get_finds_alert() {
        let alert = Alert::enrich(AlertRecord {
            id: AlertId::from("7"),
            event: "ssh".to_string(),
            source_ip: "1.2.3.4".to_string(),
            timestamp: Utc::now(),
        });
        let view = FeedView {
            alerts: Arc::from(vec![alert]),
            state: FeedState::Ready,
            ..FeedView::default()
        };
        assert_eq!(view.len(), 1);
        assert!(view.get(&AlertId::from("7")).is_some());
        assert!(view.get(&AlertId::from("8")).is_none());
    }

    #[test]
    fn state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&FeedState::Refreshing).unwrap(),
            "\"refreshing\""
        );
    }
}
