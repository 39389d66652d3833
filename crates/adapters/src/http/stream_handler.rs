use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::{Stream, StreamExt};

use super::alert_handler::AlertResponse;
use super::state::AppState;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Server-Sent Events stream with one `alert` event per newly inserted live
/// alert. Slow clients skip what they missed rather than stalling the feed.
#[utoipa::path(
    get, path = "/api/v1/alerts/stream",
    tag = "Alerts",
    responses(
        (status = 200, description = "Event stream of new alerts", content_type = "text/event-stream"),
    )
)]
pub async fn stream_alerts(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.feed.subscribe_new_alerts();
    let stream = BroadcastStream::new(rx).filter_map(|item| match item {
        Ok(alert) => match Event::default()
            .event("alert")
            .id(alert.id.to_string())
            .json_data(AlertResponse::from(&alert))
        {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                tracing::warn!(alert_id = %alert.id, error = %e, "failed to encode alert event");
                None
            }
        },
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::debug!(skipped, "alert stream client lagged");
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}
