use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

/// Request timeout. Generous because `refresh` waits for a full snapshot
/// fetch on the agent side.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the alertscope read API.
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

// ── Response DTOs ──────────────────────────────────────────────────────

#[derive(Deserialize, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Deserialize, Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub feed_state: String,
    pub alert_count: usize,
    pub uptime_secs: u64,
}

#[derive(Deserialize, Serialize)]
pub struct AlertListResponse {
    pub alerts: Vec<AlertResponse>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub loading: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Deserialize, Serialize)]
pub struct AlertResponse {
    pub id: String,
    pub event: String,
    pub source_ip: String,
    pub timestamp: String,
    pub severity: String,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Deserialize, Serialize)]
pub struct AlertStatsResponse {
    pub total: usize,
    pub critical: usize,
    pub ddos: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub unique_sources: usize,
    #[serde(default)]
    pub latest: Option<String>,
    pub state: String,
    pub version: u64,
    #[serde(default)]
    pub refreshed_at: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Deserialize, Serialize)]
pub struct ThreatMarkerResponse {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    pub severity: String,
    pub source_ip: String,
    pub event: String,
    pub timestamp: String,
}

#[derive(Deserialize, Serialize)]
pub struct MapResponse {
    pub markers: Vec<ThreatMarkerResponse>,
}

#[derive(Deserialize, Serialize)]
pub struct RefreshResponse {
    pub count: usize,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    code: String,
    message: String,
}

/// Filters for [`ApiClient::list_alerts`].
#[derive(Debug, Default)]
pub struct AlertListQuery<'a> {
    pub severity: Option<&'a str>,
    pub min_severity: Option<&'a str>,
    pub search: Option<&'a str>,
    pub order: Option<&'a str>,
    pub limit: usize,
    pub offset: usize,
}

impl ApiClient {
    pub fn new(host: &str, port: u16) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: format!("http://{host}:{port}"),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> anyhow::Result<reqwest::Response> {
        req.send()
            .await
            .map_err(|e| connection_error(&self.base_url, &e))
    }

    // ── Health ──────────────────────────────────────────────────────

    pub async fn healthz(&self) -> anyhow::Result<HealthResponse> {
        let resp = self
            .send(self.request(reqwest::Method::GET, "/healthz"))
            .await?;
        handle_response(resp).await
    }

    /// Readiness is reported even when the agent answers 503.
    pub async fn readyz(&self) -> anyhow::Result<ReadyResponse> {
        let resp = self
            .send(self.request(reqwest::Method::GET, "/readyz"))
            .await?;
        if resp.status() == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return resp
                .json::<ReadyResponse>()
                .await
                .context("failed to parse response body");
        }
        handle_response(resp).await
    }

    // ── Metrics ─────────────────────────────────────────────────────

    pub async fn metrics(&self) -> anyhow::Result<String> {
        let resp = self
            .send(self.request(reqwest::Method::GET, "/metrics"))
            .await?;
        if resp.status().is_success() {
            return resp.text().await.context("failed to read metrics body");
        }
        bail!("request failed with status {}", resp.status());
    }

    // ── Alerts ──────────────────────────────────────────────────────

    pub async fn list_alerts(&self, query: &AlertListQuery<'_>) -> anyhow::Result<AlertListResponse> {
        let mut req = self.request(reqwest::Method::GET, "/api/v1/alerts");
        req = req.query(&[
            ("limit", query.limit.to_string()),
            ("offset", query.offset.to_string()),
        ]);
        for (key, value) in [
            ("severity", query.severity),
            ("min_severity", query.min_severity),
            ("search", query.search),
            ("order", query.order),
        ] {
            if let Some(v) = value {
                req = req.query(&[(key, v)]);
            }
        }
        let resp = self.send(req).await?;
        handle_response(resp).await
    }

    pub async fn get_alert(&self, id: &str) -> anyhow::Result<AlertResponse> {
        let resp = self
            .send(self.request(reqwest::Method::GET, &format!("/api/v1/alerts/{id}")))
            .await?;
        handle_response(resp).await
    }

    pub async fn alert_stats(&self) -> anyhow::Result<AlertStatsResponse> {
        let resp = self
            .send(self.request(reqwest::Method::GET, "/api/v1/alerts/stats"))
            .await?;
        handle_response(resp).await
    }

    pub async fn alert_map(&self, limit: Option<usize>) -> anyhow::Result<MapResponse> {
        let mut req = self.request(reqwest::Method::GET, "/api/v1/alerts/map");
        if let Some(limit) = limit {
            req = req.query(&[("limit", limit)]);
        }
        let resp = self.send(req).await?;
        handle_response(resp).await
    }

    pub async fn refresh(&self) -> anyhow::Result<RefreshResponse> {
        let resp = self
            .send(self.request(reqwest::Method::POST, "/api/v1/alerts/refresh"))
            .await?;
        handle_response(resp).await
    }
}

fn connection_error(base_url: &str, err: &reqwest::Error) -> anyhow::Error {
    if err.is_connect() {
        anyhow::anyhow!("cannot connect to agent at {base_url}, is the agent running?")
    } else if err.is_timeout() {
        anyhow::anyhow!("connection to agent at {base_url} timed out")
    } else {
        anyhow::anyhow!("request to agent failed: {err}")
    }
}

async fn handle_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> anyhow::Result<T> {
    if resp.status().is_success() {
        return resp
            .json::<T>()
            .await
            .context("failed to parse response body");
    }
    let status = resp.status();
    if let Ok(body) = resp.json::<ApiErrorBody>().await {
        bail!("{} ({}): {}", body.error.message, body.error.code, status);
    }
    bail!("request failed with status {status}");
}
