use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::common::{ConfigError, MASK, check_identifier, check_positive, check_range, check_url};
use crate::constants::{DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_STORE_TABLE, MAX_FEED_CAPACITY};

// ── Snapshot sources ───────────────────────────────────────────────

/// Where snapshots come from: a primary JSON endpoint and an optional
/// direct-store fallback consulted only when the primary fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourcesConfig {
    pub primary: PrimarySourceConfig,

    #[serde(default)]
    pub fallback: Option<StoreSourceConfig>,

    /// Per-path fetch timeout. Expiry counts as that path failing.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl SourcesConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        check_positive("sources.fetch_timeout_secs", self.fetch_timeout_secs)?;
        self.primary.validate()?;
        if let Some(ref fallback) = self.fallback {
            fallback.validate("sources.fallback")?;
            if fallback.name == self.primary.name {
                return Err(ConfigError::Validation {
                    field: "sources.fallback.name".to_string(),
                    message: format!(
                        "'{}' is already used by sources.primary",
                        fallback.name
                    ),
                });
            }
        }
        Ok(())
    }
}

/// HTTP endpoint returning a JSON array of alert records.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrimarySourceConfig {
    #[serde(default = "default_primary_name")]
    pub name: String,
    pub url: String,
}

impl PrimarySourceConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        check_identifier("sources.primary.name", &self.name)?;
        check_url("sources.primary.url", &self.url)
    }
}

/// PostgREST-style store queried directly:
/// `GET {base_url}/rest/v1/{table}?select=*&order=timestamp.desc&limit={limit}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSourceConfig {
    #[serde(default = "default_store_name")]
    pub name: String,

    pub base_url: String,

    #[serde(default = "default_store_table")]
    pub table: String,

    /// Row limit per query. Defaults to the feed capacity.
    #[serde(default)]
    pub limit: Option<usize>,

    /// Sent as `apikey` and bearer token. Overridden by `ALERTSCOPE_STORE_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl StoreSourceConfig {
    pub(super) fn validate(&self, prefix: &str) -> Result<(), ConfigError> {
        check_identifier(&format!("{prefix}.name"), &self.name)?;
        check_url(&format!("{prefix}.base_url"), &self.base_url)?;
        check_identifier(&format!("{prefix}.table"), &self.table)?;
        if let Some(limit) = self.limit {
            check_range(&format!("{prefix}.limit"), limit, 1, MAX_FEED_CAPACITY)?;
        }
        Ok(())
    }

    pub(super) fn mask_secrets(&mut self) {
        if self.api_key.is_some() {
            self.api_key = Some(MASK.to_string());
        }
    }
}

fn default_fetch_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}
fn default_primary_name() -> String {
    "primary".to_string()
}
fn default_store_name() -> String {
    "store".to_string()
}
fn default_store_table() -> String {
    DEFAULT_STORE_TABLE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> SourcesConfig {
        serde_yaml_ng::from_str(yaml).unwrap()
    }

    #[test]
    fn defaults_applied() {
        let cfg = parse("primary:\n  url: https://alerts.example.com/api/alerts\n");
        assert_eq!(cfg.primary.name, "primary");
        assert!(cfg.fallback.is_none());
        assert_eq!(cfg.fetch_timeout(), Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn fallback_defaults() {
        let cfg = parse(
            "primary:\n  url: https://a.example.com/alerts\nfallback:\n  base_url: https://db.example.com\n",
        );
        let fallback = cfg.fallback.as_ref().unwrap();
        assert_eq!(fallback.name, "store");
        assert_eq!(fallback.table, "alerts");
        assert!(fallback.limit.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn duplicate_source_names_rejected() {
        let cfg = parse(
            "primary:\n  name: main\n  url: https://a.example.com\nfallback:\n  name: main\n  base_url: https://db.example.com\n",
        );
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("sources.fallback.name"));
    }

    #[test]
    fn zero_timeout_rejected() {
        let cfg = parse("primary:\n  url: https://a.example.com\nfetch_timeout_secs: 0\n");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn bad_table_rejected() {
        let cfg = parse(
            "primary:\n  url: https://a.example.com\nfallback:\n  base_url: https://db.example.com\n  table: \"alerts?select=secret\"\n",
        );
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn limit_bounds() {
        let cfg = parse(
            "primary:\n  url: https://a.example.com\nfallback:\n  base_url: https://db.example.com\n  limit: 0\n",
        );
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unknown_field_rejected() {
        let result: Result<SourcesConfig, _> =
            serde_yaml_ng::from_str("primary:\n  url: https://a.example.com\n  urll: x\n");
        assert!(result.is_err());
    }

    #[test]
    fn mask_hides_key() {
        let mut cfg = StoreSourceConfig {
            name: "store".to_string(),
            base_url: "https://db.example.com".to_string(),
            table: "alerts".to_string(),
            limit: None,
            api_key: Some("secret".to_string()),
        };
        cfg.mask_secrets();
        assert_eq!(cfg.api_key.as_deref(), Some(MASK));
    }
}
