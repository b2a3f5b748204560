//! Configuration management for gitdeck.

pub mod paths;
pub mod settings;

pub use paths::config_file;
pub use settings::{AppConfig, AuthConfig, GitHubConfig, SyncConfig};

use std::path::Path;

use crate::error::{AppError, Result};

/// Load configuration from the default config file.
///
/// If the config file doesn't exist, returns default configuration.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file()?;
    load_config_from(&path)
}

/// Load configuration from a specific path.
///
/// If the file doesn't exist, returns default configuration.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default().with_env_overrides());
    }

    let contents = std::fs::read_to_string(path)?;
    let config: AppConfig =
        toml::from_str(&contents).map_err(|e| AppError::ConfigRead(e.to_string()))?;

    Ok(config.with_env_overrides())
}
