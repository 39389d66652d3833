use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use domain::alert::entity::{Alert, AlertId};
use domain::alert::query::{
    self, AlertFilter, DEFAULT_LIMIT, MAX_LIMIT, SeveritySummary, SortOrder, ThreatMarker,
};
use domain::common::entity::Severity;

use super::error::{ApiError, ErrorBody};
use super::state::AppState;

// ── Query parameters DTO ────────────────────────────────────────────

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct AlertQueryParams {
    /// Exact severity tier ("low", "medium", "high", "ddos", "critical").
    pub severity: Option<String>,
    /// Minimum severity tier, inclusive.
    pub min_severity: Option<String>,
    /// Case-insensitive substring over event and source address.
    pub search: Option<String>,
    /// "newest" (default) or "oldest".
    pub order: Option<String>,
    /// Maximum entries to return (default 100, max 1000).
    pub limit: Option<usize>,
    /// Number of entries to skip (default 0).
    pub offset: Option<usize>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct MapQueryParams {
    /// Number of markers (newest alerts first).
    pub limit: Option<usize>,
}

// ── Response DTOs ───────────────────────────────────────────────────

#[derive(Serialize, ToSchema)]
pub struct AlertListResponse {
    pub alerts: Vec<AlertResponse>,
    /// Matching alerts before paging.
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    /// A snapshot fetch is outstanding.
    pub loading: bool,
    /// Most recent fetch failure, if the last fetch failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct AlertResponse {
    pub id: String,
    pub event: String,
    pub source_ip: String,
    /// RFC 3339 UTC timestamp.
    pub timestamp: String,
    pub severity: String,
    /// Display latitude. Not a geolocation.
    pub lat: f64,
    /// Display longitude. Not a geolocation.
    pub lng: f64,
}

impl From<&Alert> for AlertResponse {
    fn from(alert: &Alert) -> Self {
        Self {
            id: alert.id.to_string(),
            event: alert.event.clone(),
            source_ip: alert.source_ip.clone(),
            timestamp: alert.timestamp.to_rfc3339(),
            severity: alert.severity.as_str().to_string(),
            lat: alert.position.lat,
            lng: alert.position.lng,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct AlertStatsResponse {
    pub total: usize,
    pub critical: usize,
    pub ddos: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    /// Distinct source addresses in the collection.
    pub unique_sources: usize,
    /// Timestamp of the newest alert.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<String>,
    /// Aggregator state (`uninitialized`, `loading`, `ready`, `refreshing`).
    pub state: String,
    pub version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refreshed_at: Option<String>,
    /// Source that served the last successful snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ThreatMarkerResponse {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    pub severity: String,
    pub source_ip: String,
    pub event: String,
    pub timestamp: String,
}

impl From<ThreatMarker> for ThreatMarkerResponse {
    fn from(marker: ThreatMarker) -> Self {
        Self {
            id: marker.id.0,
            lat: marker.position.lat,
            lng: marker.position.lng,
            severity: marker.severity.as_str().to_string(),
            source_ip: marker.source_ip,
            event: marker.event,
            timestamp: marker.timestamp.to_rfc3339(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct MapResponse {
    pub markers: Vec<ThreatMarkerResponse>,
}

#[derive(Serialize, ToSchema)]
pub struct RefreshResponse {
    /// Alerts retained after the refresh.
    pub count: usize,
}

// ── Helpers ─────────────────────────────────────────────────────────

fn parse_severity(field: &str, value: Option<&str>) -> Result<Option<Severity>, ApiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => Severity::parse(v)
            .map(Some)
            .ok_or_else(|| ApiError::BadRequest {
                code: "VALIDATION_ERROR",
                message: format!(
                    "invalid {field} '{v}': expected one of low, medium, high, ddos, critical"
                ),
            }),
    }
}

fn parse_order(value: Option<&str>) -> Result<SortOrder, ApiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(SortOrder::default()),
        Some(v) => SortOrder::parse(v).ok_or_else(|| ApiError::BadRequest {
            code: "VALIDATION_ERROR",
            message: format!("invalid order '{v}': expected newest or oldest"),
        }),
    }
}

fn build_filter(params: &AlertQueryParams) -> Result<AlertFilter, ApiError> {
    Ok(AlertFilter {
        severity: parse_severity("severity", params.severity.as_deref())?,
        min_severity: parse_severity("min_severity", params.min_severity.as_deref())?,
        search: params.search.clone(),
        order: parse_order(params.order.as_deref())?,
    })
}

// ── Handlers ────────────────────────────────────────────────────────

/// List retained alerts with optional filters.
#[utoipa::path(
    get, path = "/api/v1/alerts",
    tag = "Alerts",
    params(AlertQueryParams),
    responses(
        (status = 200, description = "Filtered alert page", body = AlertListResponse),
        (status = 400, description = "Invalid query parameters", body = ErrorBody),
    )
)]
pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AlertQueryParams>,
) -> Result<Json<AlertListResponse>, ApiError> {
    let filter = build_filter(&params)?;
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let offset = params.offset.unwrap_or(0);

    let view = state.feed.view();
    let page = query::paginate(&view.alerts, &filter, offset, limit);

    Ok(Json(AlertListResponse {
        alerts: page.alerts.iter().map(AlertResponse::from).collect(),
        total: page.total,
        limit: page.limit,
        offset: page.offset,
        loading: view.is_loading(),
        error: view.last_error.as_ref().map(ToString::to_string),
    }))
}

/// Fetch a single retained alert.
#[utoipa::path(
    get, path = "/api/v1/alerts/{id}",
    tag = "Alerts",
    params(("id" = String, Path, description = "Alert ID")),
    responses(
        (status = 200, description = "Alert", body = AlertResponse),
        (status = 404, description = "Alert not retained", body = ErrorBody),
    )
)]
pub async fn get_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AlertResponse>, ApiError> {
    let view = state.feed.view();
    view.get(&AlertId(id.clone()))
        .map(|alert| Json(AlertResponse::from(alert)))
        .ok_or_else(|| ApiError::NotFound {
            code: "ALERT_NOT_FOUND",
            message: format!("alert '{id}' not found"),
        })
}

/// Per-severity counts and aggregator status.
#[utoipa::path(
    get, path = "/api/v1/alerts/stats",
    tag = "Alerts",
    responses(
        (status = 200, description = "Severity summary", body = AlertStatsResponse),
    )
)]
pub async fn alert_stats(State(state): State<Arc<AppState>>) -> Json<AlertStatsResponse> {
    let view = state.feed.view();
    let summary = SeveritySummary::from_alerts(&view.alerts);

    Json(AlertStatsResponse {
        total: summary.total,
        critical: summary.critical,
        ddos: summary.ddos,
        high: summary.high,
        medium: summary.medium,
        low: summary.low,
        unique_sources: summary.unique_sources,
        latest: summary.latest.map(|ts| ts.to_rfc3339()),
        state: view.state.as_str().to_string(),
        version: view.version,
        refreshed_at: view.refreshed_at.map(|ts| ts.to_rfc3339()),
        source: view.source.clone(),
        error: view.last_error.as_ref().map(ToString::to_string),
    })
}

/// Threat map markers for the newest alerts.
#[utoipa::path(
    get, path = "/api/v1/alerts/map",
    tag = "Alerts",
    params(MapQueryParams),
    responses(
        (status = 200, description = "Map markers", body = MapResponse),
    )
)]
pub async fn alert_map(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MapQueryParams>,
) -> Json<MapResponse> {
    let limit = params.limit.unwrap_or(state.map_markers).min(MAX_LIMIT);
    let view = state.feed.view();
    let markers = query::map_markers(&view.alerts, limit)
        .into_iter()
        .map(ThreatMarkerResponse::from)
        .collect();
    Json(MapResponse { markers })
}

/// Force a snapshot refresh and wait for it to settle.
#[utoipa::path(
    post, path = "/api/v1/alerts/refresh",
    tag = "Alerts",
    responses(
        (status = 200, description = "Refresh completed", body = RefreshResponse),
        (status = 503, description = "Every snapshot source failed", body = ErrorBody),
    )
)]
pub async fn refresh_alerts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RefreshResponse>, ApiError> {
    match state.feed.refresh().await {
        Ok(count) => {
            tracing::info!(alert_count = count, "manual refresh completed");
            Ok(Json(RefreshResponse { count }))
        }
        Err(e) => {
            tracing::warn!(error = %e, "manual refresh failed");
            Err(e.into())
        }
    }
}
