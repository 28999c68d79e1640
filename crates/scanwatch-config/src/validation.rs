//! Configuration validation logic.

use crate::errors::ConfigError;
use crate::types::ScanwatchConfig;

/// Longest accepted fetch timeout (5 minutes).
pub const MAX_FETCH_TIMEOUT_MS: u64 = 300_000;

/// Validate a ScanwatchConfig, returning an error if any values are invalid.
///
/// # Validation Rules
///
/// - `backend.url`, if set, must be an `http://` or `https://` URL
/// - `backend.port`, if set, must be non-zero
/// - `polling.interval_ms` must be > 0
/// - `polling.fetch_timeout_ms` must be in `1..=300000`
pub fn validate_config(config: &ScanwatchConfig) -> Result<(), ConfigError> {
    if let Some(ref url) = config.backend.url {
        let url = url.trim();
        if !url.is_empty() && !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidConfiguration {
                message: format!("backend.url '{}' must start with http:// or https://", url),
            });
        }
    }

    if config.backend.port == Some(0) {
        return Err(ConfigError::InvalidConfiguration {
            message: "backend.port must be > 0".to_string(),
        });
    }

    if config.polling.interval_ms == Some(0) {
        return Err(ConfigError::InvalidConfiguration {
            message: "polling.interval_ms must be > 0".to_string(),
        });
    }

    match config.polling.fetch_timeout_ms {
        Some(0) => {
            return Err(ConfigError::InvalidConfiguration {
                message: "polling.fetch_timeout_ms must be > 0".to_string(),
            });
        }
        Some(ms) if ms > MAX_FETCH_TIMEOUT_MS => {
            return Err(ConfigError::InvalidConfiguration {
                message: format!(
                    "polling.fetch_timeout_ms must be <= {} (5 minutes)",
                    MAX_FETCH_TIMEOUT_MS
                ),
            });
        }
        _ => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ScanwatchConfig::default()).is_ok());
    }

    #[test]
    fn test_rejects_non_http_url() {
        let mut config = ScanwatchConfig::default();
        config.backend.url = Some("ftp://invoices".to_string());
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_rejects_zero_port() {
        let mut config = ScanwatchConfig::default();
        config.backend.port = Some(0);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_zero_interval() {
        let mut config = ScanwatchConfig::default();
        config.polling.interval_ms = Some(0);
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("interval_ms"));
    }

    #[test]
    fn test_fetch_timeout_bounds() {
        let mut config = ScanwatchConfig::default();
        config.polling.fetch_timeout_ms = Some(0);
        assert!(validate_config(&config).is_err());

        config.polling.fetch_timeout_ms = Some(MAX_FETCH_TIMEOUT_MS + 1);
        assert!(validate_config(&config).is_err());

        config.polling.fetch_timeout_ms = Some(MAX_FETCH_TIMEOUT_MS);
        assert!(validate_config(&config).is_ok());
    }
}
