use axum::Json;
use utoipa::OpenApi;

use super::alert_handler::{
    AlertListResponse, AlertResponse, AlertStatsResponse, MapResponse, RefreshResponse,
    ThreatMarkerResponse,
};
use super::error::{ErrorBody, ErrorDetail};
use super::health_handler::{HealthResponse, ReadyResponse};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "alertscope API",
        description = "Read API over the aggregated security alert feed."
    ),
    paths(
        super::health_handler::healthz,
        super::health_handler::readyz,
        super::metrics_handler::metrics,
        super::alert_handler::list_alerts,
        super::alert_handler::get_alert,
        super::alert_handler::alert_stats,
        super::alert_handler::alert_map,
        super::alert_handler::refresh_alerts,
        super::stream_handler::stream_alerts,
    ),
    components(schemas(
        HealthResponse,
        ReadyResponse,
        AlertListResponse,
        AlertResponse,
        AlertStatsResponse,
        MapResponse,
        ThreatMarkerResponse,
        RefreshResponse,
        ErrorBody,
        ErrorDetail,
    )),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Observability", description = "Prometheus metrics"),
        (name = "Alerts", description = "Aggregated alert feed"),
    )
)]
pub struct ApiDoc;

/// Serves the generated `OpenAPI` document.
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();
        for expected in [
            "/healthz",
            "/readyz",
            "/metrics",
            "/api/v1/alerts",
            "/api/v1/alerts/{id}",
            "/api/v1/alerts/stats",
            "/api/v1/alerts/map",
            "/api/v1/alerts/refresh",
            "/api/v1/alerts/stream",
        ] {
            assert!(paths.contains(&expected), "missing path {expected}");
        }
    }

    #[test]
    fn document_serializes() {
        let json = serde_json::to_value(ApiDoc::openapi()).unwrap();
        assert_eq!(json["info"]["title"], "alertscope API");
        assert!(json["components"]["schemas"]["AlertResponse"].is_object());
    }
}
