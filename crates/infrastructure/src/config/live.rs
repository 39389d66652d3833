use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::common::{
    ConfigError, MASK, check_identifier, check_positive, check_url, default_true,
};
use crate::constants::{DEFAULT_BACKOFF_INITIAL_MS, DEFAULT_BACKOFF_MAX_SECS};

/// Newline-delimited JSON change feed kept open for live inserts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LiveConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_live_name")]
    pub name: String,

    pub url: String,

    /// Only changes for this table are applied. All tables when unset.
    #[serde(default)]
    pub table: Option<String>,

    /// Falls back to the store key when unset.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,

    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,
}

impl LiveConfig {
    pub fn backoff_initial(&self) -> Duration {
        Duration::from_millis(self.backoff_initial_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        check_identifier("live.name", &self.name)?;
        check_url("live.url", &self.url)?;
        if let Some(ref table) = self.table {
            check_identifier("live.table", table)?;
        }
        check_positive("live.backoff_initial_ms", self.backoff_initial_ms)?;
        check_positive("live.backoff_max_secs", self.backoff_max_secs)?;
        if self.backoff_initial() > self.backoff_max() {
            return Err(ConfigError::Validation {
                field: "live.backoff_initial_ms".to_string(),
                message: format!(
                    "{}ms exceeds live.backoff_max_secs ({}s)",
                    self.backoff_initial_ms, self.backoff_max_secs
                ),
            });
        }
        Ok(())
    }

    pub(super) fn mask_secrets(&mut self) {
        if self.api_key.is_some() {
            self.api_key = Some(MASK.to_string());
        }
    }
}

fn default_live_name() -> String {
    "live".to_string()
}
fn default_backoff_initial_ms() -> u64 {
    DEFAULT_BACKOFF_INITIAL_MS
}
fn default_backoff_max_secs() -> u64 {
    DEFAULT_BACKOFF_MAX_SECS
}
