//! # scanwatch-config
//!
//! TOML configuration types, loading, and validation for scanwatch.
//!
//! Depends only on `scanwatch-paths`.

mod loading;
mod validation;

pub mod errors;
pub mod types;

// Public API re-exports
pub use errors::ConfigError;
pub use loading::{apply_env_overrides, load_config_file, load_hierarchy, merge_configs};
pub use types::{
    BackendConfig, PollingConfig, RateLimitKind, ScanwatchConfig, StoreConfig, ViewConfig,
};
pub use validation::validate_config;

impl ScanwatchConfig {
    /// Load configuration from the hierarchy of config files plus environment.
    ///
    /// See [`loading::load_hierarchy`] for details.
    pub fn load_hierarchy() -> Result<Self, ConfigError> {
        loading::load_hierarchy()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate_config(self)
    }
}
