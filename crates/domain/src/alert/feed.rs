//! Bounded, id-unique, timestamp-ordered alert collection.

use std::collections::HashSet;

use super::entity::{Alert, AlertId};
use super::error::AlertError;

/// Default number of alerts retained.
pub const DEFAULT_CAPACITY: usize = 100;

/// Result of merging a single alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Alert was new and is now part of the collection.
    Inserted,
    /// An alert with the same id was already retained; nothing changed.
    Duplicate,
    /// The collection is full and the alert is older than everything
    /// retained, so it was evicted immediately; nothing changed.
    Expired,
}

impl MergeOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Duplicate => "duplicate",
            Self::Expired => "expired",
        }
    }

    pub fn changed(self) -> bool {
        self == Self::Inserted
    }
}

/// The N most recent alerts, newest first.
///
/// Invariants, re-checked after every mutation:
/// - ids are unique;
/// - `len() <= capacity()`;
/// - alerts are sorted by timestamp, descending.
#[derive(Debug, Clone)]
pub struct AlertFeed {
    capacity: usize,
    alerts: Vec<Alert>,
    ids: HashSet<AlertId>,
}

impl AlertFeed {
    /// Create an empty feed. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            alerts: Vec::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    pub fn contains(&self, id: &AlertId) -> bool {
        self.ids.contains(id)
    }

    /// Replace the whole collection.
    ///
    /// Duplicate ids keep their first occurrence; the result is sorted newest
    /// first (stable for equal timestamps) and cut to capacity.
    pub fn replace(&mut self, alerts: Vec<Alert>) -> Result<(), AlertError> {
        let mut seen = HashSet::with_capacity(alerts.len());
        let mut unique: Vec<Alert> = alerts
            .into_iter()
            .filter(|alert| seen.insert(alert.id.clone()))
            .collect();
        unique.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        unique.truncate(self.capacity);

        self.ids = unique.iter().map(|a| a.id.clone()).collect();
        self.alerts = unique;
        self.enforce_invariants()
    }

    /// Merge one alert.
    ///
    /// Idempotent per id. A new alert is inserted at its chronological
    /// position (a prepend for in-order delivery), then the oldest entries
    /// beyond capacity are dropped.
    ///
    /// An `Err` means an invariant had been broken; the feed has already
    /// been healed when it is returned.
    pub fn merge(&mut self, alert: Alert) -> Result<MergeOutcome, AlertError> {
        if self.ids.contains(&alert.id) {
            return Ok(MergeOutcome::Duplicate);
        }

        let position = self
            .alerts
            .partition_point(|existing| existing.timestamp > alert.timestamp);
        if position >= self.capacity {
            return Ok(MergeOutcome::Expired);
        }

        self.ids.insert(alert.id.clone());
        self.alerts.insert(position, alert);
        while self.alerts.len() > self.capacity {
            if let Some(evicted) = self.alerts.pop() {
                self.ids.remove(&evicted.id);
            }
        }

        self.enforce_invariants()?;
        Ok(MergeOutcome::Inserted)
    }

    /// Drop every retained alert.
    pub fn clear(&mut self) {
        self.alerts.clear();
        self.ids.clear();
    }

    fn enforce_invariants(&mut self) -> Result<(), AlertError> {
        let Some(violation) = self.find_violation() else {
            return Ok(());
        };
        debug_assert!(false, "alert feed invariant violated: {violation}");
        self.heal();
        Err(AlertError::InvariantViolation(violation))
    }

    fn find_violation(&self) -> Option<String> {
        if self.alerts.len() > self.capacity {
            return Some(format!(
                "{} alerts retained, capacity {}",
                self.alerts.len(),
                self.capacity
            ));
        }
        if self.ids.len() != self.alerts.len() {
            return Some(format!(
                "{} ids indexed for {} alerts",
                self.ids.len(),
                self.alerts.len()
            ));
        }
        let mut seen = HashSet::with_capacity(self.alerts.len());
        for alert in &self.alerts {
            if !seen.insert(&alert.id) {
                return Some(format!("duplicate id {}", alert.id));
            }
        }
        if self
            .alerts
            .windows(2)
            .any(|pair| pair[0].timestamp < pair[1].timestamp)
        {
            return Some("alerts out of timestamp order".to_string());
        }
        None
    }

    fn heal(&mut self) {
        let alerts = std::mem::take(&mut self.alerts);
        let mut seen = HashSet::with_capacity(alerts.len());
        let mut kept: Vec<Alert> = alerts
            .into_iter()
            .filter(|alert| seen.insert(alert.id.clone()))
            .collect();
        kept.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        kept.truncate(self.capacity);
        self.ids = kept.iter().map(|a| a.id.clone()).collect();
        self.alerts = kept;
    }
}

impl Default for AlertFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
