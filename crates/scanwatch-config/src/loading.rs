//! Configuration loading and merging logic.
//!
//! # Configuration Hierarchy
//!
//! Later sources override earlier ones:
//! 1. **Hardcoded defaults** - accessor fallbacks on the config types
//! 2. **User config** - `~/.scanwatch/config.toml`
//! 3. **Project config** - `./.scanwatch/config.toml`
//! 4. **Environment** - `SCANWATCH_BACKEND_URL`, `SCANWATCH_BACKEND_HOST`,
//!    `SCANWATCH_BACKEND_PORT`
//! 5. **CLI arguments** - applied by the binary (highest priority)

use crate::errors::ConfigError;
use crate::types::{BackendConfig, PollingConfig, ScanwatchConfig, StoreConfig, ViewConfig};
use crate::validation::validate_config;
use scanwatch_paths::ScanwatchPaths;
use std::fs;
use std::path::Path;

pub const ENV_BACKEND_URL: &str = "SCANWATCH_BACKEND_URL";
pub const ENV_BACKEND_HOST: &str = "SCANWATCH_BACKEND_HOST";
pub const ENV_BACKEND_PORT: &str = "SCANWATCH_BACKEND_PORT";

/// Load configuration from the user and project config files plus environment.
///
/// # Errors
///
/// Missing config files are not errors. Parse errors, bad environment values
/// and validation failures are.
pub fn load_hierarchy() -> Result<ScanwatchConfig, ConfigError> {
    let user_path = match ScanwatchPaths::resolve() {
        Ok(paths) => Some(paths.user_config()),
        Err(e) => {
            tracing::warn!(
                event = "config.load.home_unavailable",
                error = %e,
                "Skipping user config"
            );
            None
        }
    };
    let project_path = ScanwatchPaths::project_config(&std::env::current_dir()?);

    load_hierarchy_from(user_path.as_deref(), &project_path)
}

/// Load the hierarchy from explicit file locations. Used by tests.
pub(crate) fn load_hierarchy_from(
    user_path: Option<&Path>,
    project_path: &Path,
) -> Result<ScanwatchConfig, ConfigError> {
    let mut config = ScanwatchConfig::default();

    if let Some(path) = user_path
        && let Some(user_config) = load_config_file(path)?
    {
        config = merge_configs(config, user_config);
    }

    if let Some(project_config) = load_config_file(project_path)? {
        config = merge_configs(config, project_config);
    }

    let config = apply_env_overrides(config)?;
    validate_config(&config)?;

    tracing::debug!(
        event = "config.load.completed",
        base_url = %config.backend.base_url(),
        interval_ms = config.polling.interval().as_millis() as u64,
    );

    Ok(config)
}

/// Load a configuration file. Returns `Ok(None)` when the file does not exist.
pub fn load_config_file(path: &Path) -> Result<Option<ScanwatchConfig>, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let config = toml::from_str(&content).map_err(|e| ConfigError::ConfigParseError {
        message: format!("'{}': {}", path.display(), e),
    })?;

    tracing::debug!(event = "config.load.file_loaded", path = %path.display());
    Ok(Some(config))
}

/// Merge two configurations, with `override_config` taking precedence for
/// every value it sets explicitly.
pub fn merge_configs(base: ScanwatchConfig, override_config: ScanwatchConfig) -> ScanwatchConfig {
    ScanwatchConfig {
        backend: BackendConfig {
            url: override_config.backend.url.or(base.backend.url),
            host: override_config.backend.host.or(base.backend.host),
            port: override_config.backend.port.or(base.backend.port),
        },
        polling: PollingConfig {
            interval_ms: override_config
                .polling
                .interval_ms
                .or(base.polling.interval_ms),
            fetch_timeout_ms: override_config
                .polling
                .fetch_timeout_ms
                .or(base.polling.fetch_timeout_ms),
        },
        view: ViewConfig {
            rate_limit: override_config.view.rate_limit.or(base.view.rate_limit),
            rate_limit_ms: override_config
                .view
                .rate_limit_ms
                .or(base.view.rate_limit_ms),
        },
        store: StoreConfig {
            strict_transitions: override_config
                .store
                .strict_transitions
                .or(base.store.strict_transitions),
        },
    }
}

/// Apply backend overrides from the environment.
pub fn apply_env_overrides(mut config: ScanwatchConfig) -> Result<ScanwatchConfig, ConfigError> {
    if let Some(url) = non_empty_env(ENV_BACKEND_URL) {
        config.backend.url = Some(url);
    }
    if let Some(host) = non_empty_env(ENV_BACKEND_HOST) {
        config.backend.host = Some(host);
    }
    if let Some(port) = non_empty_env(ENV_BACKEND_PORT) {
        let parsed = port
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidConfiguration {
                message: format!("{ENV_BACKEND_PORT}='{port}' is not a valid port: {e}"),
            })?;
        config.backend.port = Some(parsed);
    }
    Ok(config)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
