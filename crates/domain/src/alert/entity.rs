use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::classifier::classify;
use super::error::AlertError;
use super::geo::{GeoPosition, project};
use crate::common::entity::Severity;

/// Placeholder for records delivered without an event label.
pub const UNKNOWN_EVENT: &str = "Unknown Event";

/// Placeholder for records delivered without a source address.
pub const UNKNOWN_IP: &str = "Unknown IP";

/// Naive layouts accepted for store timestamps without an offset.
const NAIVE_TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Stable alert identifier shared by snapshot and live delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(pub String);

impl AlertId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AlertId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AlertId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ── Raw records ─────────────────────────────────────────────────────

/// Record identifier as stored upstream: table rows use integers,
/// CrowdSec-originated rows use UUID strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawAlertId {
    Number(i64),
    Text(String),
}

impl RawAlertId {
    fn normalize(&self) -> Option<AlertId> {
        match self {
            Self::Number(n) => Some(AlertId(n.to_string())),
            Self::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| AlertId(trimmed.to_string()))
            }
        }
    }
}

/// Loosely-typed alert row as delivered by a snapshot source or the live
/// change feed. Every field may be absent.
///
/// A field of the wrong JSON type (a numeric epoch `timestamp`, an array
/// `event`) decodes as absent, so the row still reaches validation and is
/// defaulted there instead of being dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAlert {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<RawAlertId>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub event: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub source_ip: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub timestamp: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient<T> {
    Expected(T),
    Other(serde::de::IgnoredAny),
}

impl<T> Lenient<T> {
    fn into_option(self) -> Option<T> {
        match self {
            Self::Expected(value) => Some(value),
            Self::Other(_) => None,
        }
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<Lenient<String>> = Option::deserialize(deserializer)?;
    Ok(value.and_then(Lenient::into_option))
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<RawAlertId>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<Lenient<RawAlertId>> = Option::deserialize(deserializer)?;
    Ok(value.and_then(Lenient::into_option))
}

impl RawAlert {
    /// Names of the fields that will be replaced by placeholders during
    /// validation (blank values count as missing).
    pub fn defaulted_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if non_blank(self.event.as_deref()).is_none() {
            fields.push("event");
        }
        if non_blank(self.source_ip.as_deref()).is_none() {
            fields.push("source_ip");
        }
        if non_blank(self.timestamp.as_deref())
            .and_then(parse_timestamp)
            .is_none()
        {
            fields.push("timestamp");
        }
        fields
    }
}

// ── Validated records ───────────────────────────────────────────────

/// Strictly-typed alert row, validated but not yet enriched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertRecord {
    pub id: AlertId,
    pub event: String,
    pub source_ip: String,
    pub timestamp: DateTime<Utc>,
}

impl AlertRecord {
    /// Validate a raw row.
    ///
    /// Missing `event`/`source_ip` become [`UNKNOWN_EVENT`]/[`UNKNOWN_IP`];
    /// a missing or unparseable `timestamp` becomes `received_at`. A record
    /// without an id cannot be merged idempotently and is rejected with
    /// [`AlertError::MalformedRecord`].
    pub fn from_raw(raw: RawAlert, received_at: DateTime<Utc>) -> Result<Self, AlertError> {
        let id = raw
            .id
            .as_ref()
            .and_then(RawAlertId::normalize)
            .ok_or_else(|| AlertError::MalformedRecord("missing id".to_string()))?;

        let event = non_blank(raw.event.as_deref()).unwrap_or(UNKNOWN_EVENT);
        let source_ip = non_blank(raw.source_ip.as_deref()).unwrap_or(UNKNOWN_IP);
        let timestamp = non_blank(raw.timestamp.as_deref())
            .and_then(parse_timestamp)
            .unwrap_or(received_at);

        Ok(Self {
            id,
            event: event.to_string(),
            source_ip: source_ip.to_string(),
            timestamp,
        })
    }
}

// ── Enriched alerts ─────────────────────────────────────────────────

/// Alert as published to consumers. Immutable once built.
///
/// Only [`Alert::enrich`] produces values from pipeline input, which is
/// what guarantees every published alert was classified and projected
/// exactly once. The type is deliberately not `Deserialize`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub id: AlertId,
    pub event: String,
    pub source_ip: String,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub position: GeoPosition,
}

impl Alert {
    /// Classify and project a validated record.
    pub fn enrich(record: AlertRecord) -> Self {
        let severity = classify(&record.event);
        let position = project(&record.source_ip);
        Self {
            id: record.id,
            event: record.event,
            source_ip: record.source_ip,
            timestamp: record.timestamp,
            severity,
            position,
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Parse RFC 3339, Postgres `timestamptz` text, or a naive ISO-8601
/// timestamp (interpreted as UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}
