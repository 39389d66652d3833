use std::future::Future;
use std::pin::Pin;

use domain::alert::entity::RawAlert;
use domain::alert::error::AlertError;

/// Secondary port for pulling a point-in-time list of alert records.
///
/// Uses `Pin<Box<dyn Future>>` return type (instead of RPITIT) so the trait
/// is dyn-compatible and can be used as `Arc<dyn SnapshotSource>`.
pub trait SnapshotSource: Send + Sync {
    /// Short label used in logs, metrics and the feed view.
    fn name(&self) -> &str;

    /// Fetch the current records, newest first when the backend can order
    /// them. Transport and decode failures map to
    /// [`AlertError::SourceUnavailable`]; individual bad records are the
    /// caller's concern.
    fn fetch_snapshot<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RawAlert>, AlertError>> + Send + 'a>>;
}
