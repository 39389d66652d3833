use serde::{Deserialize, Serialize};

/// Severity tier assigned to an alert by the classifier.
///
/// Variants are declared in ascending urgency so the derived `Ord` can be
/// used for "at least" filters: `Low < Medium < High < Ddos < Critical`.
/// The order matches the classifier's keyword-group priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Ddos,
    Critical,
}

impl Severity {
    /// Every tier, least urgent first.
    pub const ALL: [Self; 5] = [
        Self::Low,
        Self::Medium,
        Self::High,
        Self::Ddos,
        Self::Critical,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Ddos => "ddos",
            Self::Critical => "critical",
        }
    }

    /// Case-insensitive parse of a tier label. Unknown labels yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "ddos" => Some(Self::Ddos),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            format!("invalid severity '{s}': expected low|medium|high|ddos|critical")
        })
    }
}
