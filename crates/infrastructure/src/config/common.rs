//! Shared validation helpers and the config error type.

use std::path::Path;

use tracing::warn;

// ── Config errors ──────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(String),

    #[error("validation error: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("logging setup failed: {0}")]
    Logging(String),
}

impl From<serde_yaml_ng::Error> for ConfigError {
    fn from(e: serde_yaml_ng::Error) -> Self {
        Self::Yaml(e.to_string())
    }
}

// ── Shared serde defaults ──────────────────────────────────────────

pub(super) fn default_true() -> bool {
    true
}

/// Replacement text for secrets in sanitized output.
pub(super) const MASK: &str = "***";

// ── Validation helpers ─────────────────────────────────────────────

/// Require an absolute `http://` or `https://` URL with a host.
pub(super) fn check_url(field: &str, url: &str) -> Result<(), ConfigError> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| ConfigError::Validation {
            field: field.to_string(),
            message: format!("'{url}' must start with http:// or https://"),
        })?;
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() {
        return Err(ConfigError::Validation {
            field: field.to_string(),
            message: format!("'{url}' has no host"),
        });
    }
    if url.starts_with("http://") && !is_loopback_host(host) {
        warn!(field, url, "plain HTTP URL: alerts and API keys travel unencrypted");
    }
    Ok(())
}

fn is_loopback_host(host: &str) -> bool {
    let name = host.rsplit_once(':').map_or(host, |(name, _)| name);
    matches!(name, "localhost" | "127.0.0.1" | "[::1]")
}

/// Require a positive integer setting.
pub(super) fn check_positive(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Validation {
            field: field.to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}

/// Require `value` to lie in `min..=max`.
pub(super) fn check_range(
    field: &str,
    value: usize,
    min: usize,
    max: usize,
) -> Result<(), ConfigError> {
    if !(min..=max).contains(&value) {
        return Err(ConfigError::Validation {
            field: field.to_string(),
            message: format!("{value} is outside {min}..={max}"),
        });
    }
    Ok(())
}

/// Require a non-empty name made of ASCII letters, digits, `_` and `-`.
pub(super) fn check_identifier(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty()
        || !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ConfigError::Validation {
            field: field.to_string(),
            message: format!("'{value}' must be non-empty and contain only [A-Za-z0-9_-]"),
        });
    }
    Ok(())
}

/// Log a warning if a file is world-readable (Unix only).
///
/// Config files may carry store API keys and should be readable only by
/// the owner and group (mode 0640 or stricter).
#[cfg(unix)]
pub(super) fn warn_if_world_readable(path: &Path, label: &str) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(metadata) = std::fs::metadata(path) {
        let mode = metadata.permissions().mode();
        if mode & 0o004 != 0 {
            warn!(
                path = %path.display(),
                mode = format!("{mode:04o}"),
                "{label} is world-readable, consider chmod 640 or stricter",
            );
        }
    }
}

#[cfg(not(unix))]
pub(super) fn warn_if_world_readable(_path: &Path, _label: &str) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_requires_scheme_and_host() {
        assert!(check_url("u", "https://alerts.example.com/api/alerts").is_ok());
        assert!(check_url("u", "http://localhost:8000/alerts").is_ok());
        assert!(check_url("u", "ftp://example.com").is_err());
        assert!(check_url("u", "alerts.example.com").is_err());
        assert!(check_url("u", "https:///alerts").is_err());
    }

    #[test]
    fn url_error_names_field() {
        let err = check_url("sources.primary.url", "nope").unwrap_err();
        assert!(err.to_string().contains("sources.primary.url"));
    }

    #[test]
    fn loopback_hosts() {
        assert!(is_loopback_host("localhost:8000"));
        assert!(is_loopback_host("127.0.0.1"));
        assert!(!is_loopback_host("alerts.example.com"));
    }

    #[test]
    fn positive_and_range_checks() {
        assert!(check_positive("x", 1).is_ok());
        assert!(check_positive("x", 0).is_err());
        assert!(check_range("x", 1, 1, 10).is_ok());
        assert!(check_range("x", 10, 1, 10).is_ok());
        assert!(check_range("x", 0, 1, 10).is_err());
        assert!(check_range("x", 11, 1, 10).is_err());
    }

    #[test]
    fn identifier_check() {
        assert!(check_identifier("t", "alerts").is_ok());
        assert!(check_identifier("t", "security_alerts-v2").is_ok());
        assert!(check_identifier("t", "").is_err());
        assert!(check_identifier("t", "alerts;drop").is_err());
        assert!(check_identifier("t", "a b").is_err());
    }

    #[test]
    fn yaml_error_converts() {
        let err: ConfigError = serde_yaml_ng::from_str::<u32>("not a number")
            .unwrap_err()
            .into();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }
}
