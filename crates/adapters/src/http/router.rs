use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};

/// Maximum request body size for API endpoints (16 KiB). Every route is a
/// read or a body-less POST.
const MAX_BODY_SIZE: usize = 16 * 1024;

use super::alert_handler::{alert_map, alert_stats, get_alert, list_alerts, refresh_alerts};
use super::health_handler::{healthz, readyz};
use super::metrics_handler::metrics;
use super::openapi::openapi_json;
use super::state::AppState;
use super::stream_handler::stream_alerts;

/// Build the read API router.
///
/// Routes are split into two groups:
/// 1. **Probes and metrics**: `/healthz`, `/readyz`, `/metrics`
/// 2. **API**: `/api/v1/*`, including the `OpenAPI` document
pub fn build_router(state: Arc<AppState>) -> Router {
    let public_routes = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics));

    // Static segments take precedence over `{id}` so `stats`, `map` and
    // `stream` are never treated as alert ids.
    let api_routes = Router::new()
        .route("/api/v1/alerts", get(list_alerts))
        .route("/api/v1/alerts/stats", get(alert_stats))
        .route("/api/v1/alerts/map", get(alert_map))
        .route("/api/v1/alerts/stream", get(stream_alerts))
        .route("/api/v1/alerts/refresh", post(refresh_alerts))
        .route("/api/v1/alerts/{id}", get(get_alert))
        .route("/api/v1/openapi.json", get(openapi_json))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE));

    public_routes.merge(api_routes).with_state(state)
}
