use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use utoipa::ToSchema;

use super::state::AppState;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// Always `"ok"`.
    #[schema(value_type = String)]
    pub status: &'static str,
}

#[derive(Serialize, ToSchema)]
pub struct ReadyResponse {
    /// `"ready"` or `"not_ready"`.
    #[schema(value_type = String)]
    pub status: &'static str,
    /// Aggregator state (`uninitialized`, `loading`, `ready`, `refreshing`).
    #[schema(value_type = String)]
    pub feed_state: &'static str,
    pub alert_count: usize,
    pub uptime_secs: u64,
}

/// Liveness probe. Always 200 while the process is running.
#[utoipa::path(
    get, path = "/healthz",
    tag = "Health",
    responses(
        (status = 200, description = "Agent is alive", body = HealthResponse),
    )
)]
pub async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Readiness probe: 200 once the first snapshot has settled, 503 before.
#[utoipa::path(
    get, path = "/readyz",
    tag = "Health",
    responses(
        (status = 200, description = "Feed has loaded", body = ReadyResponse),
        (status = 503, description = "First snapshot still outstanding", body = ReadyResponse),
    )
)]
pub async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let view = state.feed.view();
    let loaded = view.state.has_loaded();
    let code = if loaded {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        code,
        Json(ReadyResponse {
            status: if loaded { "ready" } else { "not_ready" },
            feed_state: view.state.as_str(),
            alert_count: view.len(),
            uptime_secs: state.uptime_secs(),
        }),
    )
}
