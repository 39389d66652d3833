use std::future::Future;
use std::pin::Pin;

use domain::alert::entity::Alert;
use domain::alert::error::AlertError;
use domain::alert::view::FeedView;
use tokio::sync::{broadcast, watch};

/// Primary port exposing the aggregated alert feed to its consumers
/// (HTTP API, CLI, dashboards).
pub trait AlertFeedPort: Send + Sync {
    /// Current snapshot.
    fn view(&self) -> FeedView;

    /// Observe every published change. Each notification carries the whole
    /// collection.
    fn subscribe(&self) -> watch::Receiver<FeedView>;

    /// Receive each alert as it is inserted by the live channel.
    fn subscribe_new_alerts(&self) -> broadcast::Receiver<Alert>;

    /// Force a snapshot refresh. Resolves with the number of retained
    /// alerts once the refresh completes.
    fn refresh(&self) -> Pin<Box<dyn Future<Output = Result<usize, AlertError>> + Send + '_>>;
}
