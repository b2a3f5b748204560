//! Registry persistence.
//!
//! - [`RegistryStore`] - Trait for registry storage operations
//! - [`FileRegistryStore`] - JSON file-based storage implementation

use std::fs;
use std::path::PathBuf;

use parking_lot::Mutex;

use crate::config::paths::registry_file;
use crate::error::{AppError, Result};
use crate::registry::types::RegistryState;

/// Trait for registry storage operations (enables swapping in tests).
pub trait RegistryStore: Send + Sync {
    /// Loads the persisted state; a missing store yields the empty state.
    ///
    /// # Errors
    ///
    /// Returns an error if the store exists but cannot be read or parsed.
    fn load(&self) -> Result<RegistryState>;

    /// Replaces the persisted state.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn save(&self, state: &RegistryState) -> Result<()>;
}

/// File-based registry storage.
pub struct FileRegistryStore {
    path: PathBuf,
}

impl FileRegistryStore {
    /// Creates a store at the default registry location.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be determined.
    pub fn new() -> Result<Self> {
        Ok(Self {
            path: registry_file()?,
        })
    }

    /// Creates a store at a custom path.
    #[must_use]
    pub const fn with_path(path: PathBuf) -> Self {
        Self { path }
    }
}

impl RegistryStore for FileRegistryStore {
    fn load(&self) -> Result<RegistryState> {
        if !self.path.exists() {
            return Ok(RegistryState::default());
        }

        let contents = fs::read_to_string(&self.path)?;
        let state: RegistryState = serde_json::from_str(&contents).map_err(|e| {
            AppError::Serialization(format!(
                "repository registry at {} is corrupted: {e}",
                self.path.display()
            ))
        })?;
        Ok(state.repaired())
    }

    fn save(&self, state: &RegistryState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write then rename so a crash never leaves a half-written registry.
        let json = serde_json::to_string_pretty(state)?;
        let temp = self.path.with_extension("json.tmp");
        fs::write(&temp, json)?;
        fs::rename(&temp, &self.path)?;
        Ok(())
    }
}

/// In-memory registry storage.
#[derive(Default)]
pub struct MemoryRegistryStore {
    state: Mutex<RegistryState>,
}

impl MemoryRegistryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegistryStore for MemoryRegistryStore {
    fn load(&self) -> Result<RegistryState> {
        Ok(self.state.lock().clone())
    }

    fn save(&self, state: &RegistryState) -> Result<()> {
        *self.state.lock() = state.clone();
        Ok(())
    }
}
