//! Concrete snapshot sources.

pub mod http_snapshot;
pub mod rest_store;

use std::time::Duration;

use domain::alert::entity::RawAlert;
use domain::alert::error::AlertError;

/// Maximum snapshot response size: 16 MiB. The retained feed is small;
/// anything near this bound is a misconfigured endpoint.
pub const MAX_SNAPSHOT_RESPONSE_SIZE: usize = 16 * 1024 * 1024;

/// Transport timeout for clients built here. The fetcher applies its own
/// per-path timeout on top.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) const USER_AGENT: &str = concat!("alertscope/", env!("CARGO_PKG_VERSION"));

pub(crate) fn build_client() -> Result<reqwest::Client, AlertError> {
    reqwest::Client::builder()
        .timeout(CLIENT_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| AlertError::SourceUnavailable(format!("HTTP client init failed: {e}")))
}

/// Send a request and read the body in chunks with a size cap.
pub(crate) async fn fetch_body(
    request: reqwest::RequestBuilder,
    label: &str,
) -> Result<Vec<u8>, AlertError> {
    let mut response = request
        .send()
        .await
        .map_err(|e| AlertError::SourceUnavailable(format!("{label} request failed: {e}")))?;

    if !response.status().is_success() {
        return Err(AlertError::SourceUnavailable(format!(
            "{label} returned HTTP {}",
            response.status()
        )));
    }

    // On 32-bit targets a huge length saturates and is rejected below.
    let content_length: usize = response
        .content_length()
        .unwrap_or(0)
        .try_into()
        .unwrap_or(usize::MAX);

    if content_length > MAX_SNAPSHOT_RESPONSE_SIZE {
        return Err(AlertError::SourceUnavailable(format!(
            "{label} response too large: {content_length} bytes (max {MAX_SNAPSHOT_RESPONSE_SIZE} bytes)"
        )));
    }

    let mut body = Vec::with_capacity(content_length);
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| AlertError::SourceUnavailable(format!("{label} body read failed: {e}")))?
    {
        if body.len() + chunk.len() > MAX_SNAPSHOT_RESPONSE_SIZE {
            return Err(AlertError::SourceUnavailable(format!(
                "{label} response exceeded {MAX_SNAPSHOT_RESPONSE_SIZE} byte limit"
            )));
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}

/// Decode a JSON array of alert rows.
///
/// A body that is not a JSON array fails the whole fetch. Fields of the
/// wrong type decode as absent and are defaulted later. An element that is
/// not an object is passed on as an empty row, which validation rejects
/// and counts as malformed.
pub fn decode_records(body: &[u8], label: &str) -> Result<Vec<RawAlert>, AlertError> {
    let parsed: serde_json::Value = serde_json::from_slice(body).map_err(|e| {
        AlertError::SourceUnavailable(format!("{label} returned malformed JSON: {e}"))
    })?;

    let serde_json::Value::Array(items) = parsed else {
        return Err(AlertError::SourceUnavailable(format!(
            "{label} response is not a JSON array"
        )));
    };

    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        if !item.is_object() {
            tracing::warn!(source = label, index, "alert row is not a JSON object");
            records.push(RawAlert::default());
            continue;
        }
        match serde_json::from_value::<RawAlert>(item) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(source = label, index, error = %e, "undecodable alert row");
                records.push(RawAlert::default());
            }
        }
    }
    Ok(records)
}
