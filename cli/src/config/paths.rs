//! Platform-specific path utilities for gitdeck.

use std::path::PathBuf;

use crate::error::{AppError, Result};

const APP_DIR: &str = "gitdeck";

/// Get the configuration directory for gitdeck.
///
/// - Linux: `~/.config/gitdeck`
/// - macOS: `~/Library/Application Support/gitdeck`
/// - Windows: `%APPDATA%\gitdeck`
pub fn config_dir() -> Result<PathBuf> {
    let base = dirs::config_dir()
        .ok_or_else(|| AppError::Config("Cannot determine config directory".to_string()))?;
    Ok(base.join(APP_DIR))
}

/// Get the data directory for gitdeck.
///
/// - Linux: `~/.local/share/gitdeck`
/// - macOS: `~/Library/Application Support/gitdeck`
/// - Windows: `%APPDATA%\gitdeck`
pub fn data_dir() -> Result<PathBuf> {
    let base = dirs::data_dir()
        .ok_or_else(|| AppError::Config("Cannot determine data directory".to_string()))?;
    Ok(base.join(APP_DIR))
}

/// Get the main configuration file path.
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Persisted repository registry.
pub fn registry_file() -> Result<PathBuf> {
    Ok(data_dir()?.join("repositories.json"))
}

/// Fallback token file, used only when the OS keyring is unavailable.
pub fn fallback_token_file() -> Result<PathBuf> {
    Ok(data_dir()?.join("session-token.json"))
}
