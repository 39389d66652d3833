//! Read-side helpers over an alert snapshot: filtering, paging, summaries
//! and map markers.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::{Alert, AlertId};
use super::geo::GeoPosition;
use crate::common::entity::Severity;

/// Default page size for alert listings.
pub const DEFAULT_LIMIT: usize = 100;

/// Hard cap on a single page.
pub const MAX_LIMIT: usize = 1000;

/// Default number of markers returned for the threat map.
pub const DEFAULT_MAP_MARKERS: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

impl SortOrder {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newest_first" | "newest" | "desc" => Some(Self::NewestFirst),
            "oldest_first" | "oldest" | "asc" => Some(Self::OldestFirst),
            _ => None,
        }
    }
}

/// Alert selection criteria. Empty criteria match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertFilter {
    /// Exact severity tier.
    pub severity: Option<Severity>,
    /// Tier floor, inclusive.
    pub min_severity: Option<Severity>,
    /// Case-insensitive substring over event and source address.
    pub search: Option<String>,
    pub order: SortOrder,
}

impl AlertFilter {
    pub fn matches(&self, alert: &Alert) -> bool {
        if let Some(severity) = self.severity
            && alert.severity != severity
        {
            return false;
        }
        if let Some(floor) = self.min_severity
            && alert.severity < floor
        {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => {
                let term = term.to_lowercase();
                alert.event.to_lowercase().contains(&term)
                    || alert.source_ip.to_lowercase().contains(&term)
            }
            _ => true,
        }
    }

    /// Select matching alerts in the requested order.
    ///
    /// Input is assumed newest first, which is how the feed stores it.
    pub fn apply<'a>(&self, alerts: &'a [Alert]) -> Vec<&'a Alert> {
        let mut selected: Vec<&Alert> = alerts.iter().filter(|a| self.matches(a)).collect();
        if self.order == SortOrder::OldestFirst {
            selected.reverse();
        }
        selected
    }
}

/// One page of a filtered listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertPage {
    pub alerts: Vec<Alert>,
    /// Matches before paging.
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

/// Filter then page. `limit` is clamped to `1..=MAX_LIMIT`.
pub fn paginate(alerts: &[Alert], filter: &AlertFilter, offset: usize, limit: usize) -> AlertPage {
    let limit = limit.clamp(1, MAX_LIMIT);
    let selected = filter.apply(alerts);
    let total = selected.len();
    let alerts = selected
        .into_iter()
        .skip(offset)
        .take(limit)
        .cloned()
        .collect();
    AlertPage {
        alerts,
        total,
        offset,
        limit,
    }
}

/// Look up a retained alert by id.
pub fn find<'a>(alerts: &'a [Alert], id: &AlertId) -> Option<&'a Alert> {
    alerts.iter().find(|a| &a.id == id)
}

/// Per-tier counts over a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeveritySummary {
    pub total: usize,
    pub critical: usize,
    pub ddos: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub unique_sources: usize,
    pub latest: Option<DateTime<Utc>>,
}

impl SeveritySummary {
    pub fn from_alerts(alerts: &[Alert]) -> Self {
        let mut summary = Self {
            total: alerts.len(),
            ..Self::default()
        };
        let mut sources = HashSet::new();
        for alert in alerts {
            *summary.count_mut(alert.severity) += 1;
            sources.insert(alert.source_ip.as_str());
            summary.latest = summary.latest.max(Some(alert.timestamp));
        }
        summary.unique_sources = sources.len();
        summary
    }

    pub fn count(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::Ddos => self.ddos,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }

    fn count_mut(&mut self, severity: Severity) -> &mut usize {
        match severity {
            Severity::Critical => &mut self.critical,
            Severity::Ddos => &mut self.ddos,
            Severity::High => &mut self.high,
            Severity::Medium => &mut self.medium,
            Severity::Low => &mut self.low,
        }
    }
}

/// A point on the threat map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreatMarker {
    pub id: AlertId,
    pub event: String,
    pub source_ip: String,
    pub severity: Severity,
    /// Serialized as top-level `lat`/`lng`.
    #[serde(flatten)]
    pub position: GeoPosition,
    pub timestamp: DateTime<Utc>,
}

impl From<&Alert> for ThreatMarker {
    fn from(alert: &Alert) -> Self {
        Self {
            id: alert.id.clone(),
            event: alert.event.clone(),
            source_ip: alert.source_ip.clone(),
            severity: alert.severity,
            position: alert.position,
            timestamp: alert.timestamp,
        }
    }
}

/// Markers for the newest `limit` alerts.
pub fn map_markers(alerts: &[Alert], limit: usize) -> Vec<ThreatMarker> {
    alerts.iter().take(limit).map(ThreatMarker::from).collect()
}
