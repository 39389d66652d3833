//! Keyword-based severity classification of alert event labels.

use crate::common::entity::Severity;

/// A set of case-insensitive substrings that map an event to one tier.
#[derive(Debug, Clone, Copy)]
pub struct KeywordGroup {
    pub severity: Severity,
    pub keywords: &'static [&'static str],
}

/// Keyword groups in priority order. The first group with a matching
/// keyword decides the tier, so an event containing both `scan` and `ddos`
/// classifies as `Ddos`. Reordering this table changes classification of
/// ambiguous events.
pub const KEYWORD_GROUPS: [KeywordGroup; 4] = [
    KeywordGroup {
        severity: Severity::Critical,
        keywords: &["ssh", "bruteforce"],
    },
    KeywordGroup {
        severity: Severity::Ddos,
        keywords: &["ddos", "dos"],
    },
    KeywordGroup {
        severity: Severity::High,
        keywords: &["scan", "exploit"],
    },
    KeywordGroup {
        severity: Severity::Medium,
        keywords: &["suspicious"],
    },
];

/// Tier for events that match no keyword group.
pub const DEFAULT_SEVERITY: Severity = Severity::Low;

/// Map an event label to a severity tier. Total and deterministic.
pub fn classify(event: &str) -> Severity {
    let lowered = event.to_lowercase();
    KEYWORD_GROUPS
        .iter()
        .find(|group| group.keywords.iter().any(|kw| lowered.contains(kw)))
        .map_or(DEFAULT_SEVERITY, |group| group.severity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_attacks_are_critical() {
        assert_eq!(classify("ssh-bruteforce"), Severity::Critical);
        assert_eq!(classify("crowdsecurity/ssh-slow-bf"), Severity::Critical);
        assert_eq!(classify("HTTP BruteForce"), Severity::Critical);
    }

    #[test]
    fn volumetric_events_are_ddos() {
        assert_eq!(classify("udp-ddos"), Severity::Ddos);
        assert_eq!(classify("DoS attempt"), Severity::Ddos);
    }

    #[test]
    fn reconnaissance_is_high() {
        assert_eq!(classify("port-scan"), Severity::High);
        assert_eq!(classify("crowdsecurity/http-cve-exploit"), Severity::High);
    }

    #[test]
    fn suspicious_is_medium() {
        assert_eq!(classify("Suspicious user agent"), Severity::Medium);
    }

    #[test]
    fn unmatched_defaults_to_low() {
        assert_eq!(classify("http-crawl-non_statics"), Severity::Low);
        assert_eq!(classify(""), Severity::Low);
    }

    #[test]
    fn first_group_in_priority_order_wins() {
        // matches Critical and High
        assert_eq!(classify("ssh port scan"), Severity::Critical);
        // matches Ddos and High
        assert_eq!(classify("scan followed by ddos"), Severity::Ddos);
        // matches High and Medium
        assert_eq!(classify("suspicious exploit"), Severity::High);
    }

    #[test]
    fn groups_are_listed_by_descending_urgency() {
        let tiers: Vec<Severity> = KEYWORD_GROUPS.iter().map(|g| g.severity).collect();
        let mut sorted = tiers.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(tiers, sorted);
        assert!(tiers.iter().all(|t| *t > DEFAULT_SEVERITY));
    }
}
