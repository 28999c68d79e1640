//! Configuration type definitions.
//!
//! # Example Configuration
//!
//! ```toml
//! [backend]
//! url = "https://invoices.example.com"
//!
//! [polling]
//! interval_ms = 3000
//! fetch_timeout_ms = 10000
//!
//! [view]
//! rate_limit = "throttle"
//! rate_limit_ms = 250
//!
//! [store]
//! strict_transitions = false
//! ```
//!
//! Fields are `Option<T>` so that hierarchy merging only overrides values a
//! file explicitly sets; accessors supply the defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BACKEND_HOST: &str = "localhost";
pub const DEFAULT_BACKEND_PORT: u16 = 8010;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_RATE_LIMIT_MS: u64 = 250;

/// Main configuration loaded from TOML config files.
///
/// Loaded from `~/.scanwatch/config.toml`, then `./.scanwatch/config.toml`,
/// then environment overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanwatchConfig {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub view: ViewConfig,

    #[serde(default)]
    pub store: StoreConfig,
}

/// Where the invoice backend lives.
///
/// `url` wins when set. Otherwise requests go to `http://{host}:{port}`,
/// the backend origin a dashboard served next to it would use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl BackendConfig {
    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or(DEFAULT_BACKEND_HOST)
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_BACKEND_PORT)
    }

    /// Backend origin without a trailing slash.
    pub fn base_url(&self) -> String {
        match self.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.host(), self.port()),
        }
    }

    /// Join an endpoint path onto the base URL with exactly one slash.
    pub fn api_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url(), endpoint.trim_start_matches('/'))
    }
}

/// Background polling of watched invoices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,

    /// Upper bound for a single status request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_timeout_ms: Option<u64>,
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms.unwrap_or(DEFAULT_FETCH_TIMEOUT_MS))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitKind {
    Immediate,
    Debounce,
    Throttle,
}

/// How often view consumers are told about changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_ms: Option<u64>,
}

impl ViewConfig {
    pub fn rate_limit(&self) -> RateLimitKind {
        self.rate_limit.unwrap_or(RateLimitKind::Throttle)
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms.unwrap_or(DEFAULT_RATE_LIMIT_MS))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Reject lifecycle transitions outside the pipeline's transition table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict_transitions: Option<bool>,
}

impl StoreConfig {
    pub fn strict_transitions(&self) -> bool {
        self.strict_transitions.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ScanwatchConfig::default();
        assert_eq!(config.backend.base_url(), "http://localhost:8010");
        assert_eq!(config.polling.interval(), Duration::from_secs(3));
        assert_eq!(config.polling.fetch_timeout(), Duration::from_secs(10));
        assert_eq!(config.view.rate_limit(), RateLimitKind::Throttle);
        assert_eq!(config.view.rate_limit_delay(), Duration::from_millis(250));
        assert!(!config.store.strict_transitions());
    }

    #[test]
    fn test_explicit_url_wins_over_host_and_port() {
        let backend = BackendConfig {
            url: Some("https://api.example.com/".to_string()),
            host: Some("ignored".to_string()),
            port: Some(1),
        };
        assert_eq!(backend.base_url(), "https://api.example.com");
    }

    #[test]
    fn test_blank_url_falls_back_to_origin() {
        let backend = BackendConfig {
            url: Some("  ".to_string()),
            host: Some("scanner.local".to_string()),
            port: Some(9000),
        };
        assert_eq!(backend.base_url(), "http://scanner.local:9000");
    }

    #[test]
    fn test_api_url_normalizes_slashes() {
        let backend = BackendConfig {
            url: Some("http://b:1/".to_string()),
            ..Default::default()
        };
        assert_eq!(
            backend.api_url("api/invoices/42/status"),
            "http://b:1/api/invoices/42/status"
        );
        assert_eq!(
            backend.api_url("/api/invoices/42/status"),
            "http://b:1/api/invoices/42/status"
        );
    }

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[backend]
url = "https://invoices.example.com"

[polling]
interval_ms = 1500
fetch_timeout_ms = 4000

[view]
rate_limit = "debounce"
rate_limit_ms = 100

[store]
strict_transitions = true
"#;
        let config: ScanwatchConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.backend.base_url(), "https://invoices.example.com");
        assert_eq!(config.polling.interval(), Duration::from_millis(1500));
        assert_eq!(config.polling.fetch_timeout(), Duration::from_millis(4000));
        assert_eq!(config.view.rate_limit(), RateLimitKind::Debounce);
        assert!(config.store.strict_transitions());
    }

    #[test]
    fn test_unknown_rate_limit_kind_fails_to_parse() {
        let toml_str = "[view]\nrate_limit = \"sometimes\"\n";
        assert!(toml::from_str::<ScanwatchConfig>(toml_str).is_err());
    }
}
