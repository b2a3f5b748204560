//! Repository registry.
//!
//! Tracks the repositories the user has added and which one is active.
//! The registry never owns repository contents; it only validates paths
//! through the engine and persists the list.
//! - [`RepositoryRegistry`] - validated registry operations
//! - [`RegistryStore`] - persistence seam
//! - [`RegistryState`] - the persisted snapshot

pub mod storage;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

pub use storage::{FileRegistryStore, MemoryRegistryStore, RegistryStore};
pub use types::RegistryState;

use crate::engine::{GitEngine, RemoteCredentials};
use crate::error::{AppError, Result};
use crate::sync::ProgressReporter;

/// The registry of known repositories.
pub struct RepositoryRegistry {
    engine: Arc<dyn GitEngine>,
    store: Box<dyn RegistryStore>,
    state: RwLock<RegistryState>,
}

impl RepositoryRegistry {
    /// Loads the registry from `store`.
    pub fn load(engine: Arc<dyn GitEngine>, store: Box<dyn RegistryStore>) -> Result<Self> {
        let state = store.load()?.repaired();
        debug!(
            repositories = state.known_repositories.len(),
            "Loaded repository registry"
        );
        Ok(Self {
            engine,
            store,
            state: RwLock::new(state),
        })
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> RegistryState {
        self.state.read().clone()
    }

    /// Adds `path` if the engine recognizes it as a repository.
    ///
    /// Returns `false` without changing anything for non-repositories.
    /// Registering a known path is a no-op that returns `true`. The active
    /// repository is never changed.
    pub async fn validate_and_register(&self, path: &Path) -> Result<bool> {
        let Some(path) = normalize(path)? else {
            return Ok(false);
        };
        if !self.engine.is_repository(&path).await {
            debug!(path = %path.display(), "Rejected non-repository path");
            return Ok(false);
        }

        let mut state = self.state.write();
        if state.contains(&path) {
            return Ok(true);
        }
        let mut next = state.clone();
        next.known_repositories.push(path.clone());
        self.store.save(&next)?;
        *state = next;

        info!(path = %path.display(), "Registered repository");
        Ok(true)
    }

    /// Makes a known repository active.
    pub fn set_active(&self, path: &Path) -> Result<RegistryState> {
        let path = normalize(path)?.ok_or_else(|| AppError::not_found("Repository", ""))?;

        let mut state = self.state.write();
        if !state.contains(&path) {
            return Err(AppError::not_found("Repository", path.display().to_string()));
        }
        if state.is_active(&path) {
            return Ok(state.clone());
        }
        let mut next = state.clone();
        next.active_repository = Some(path);
        self.store.save(&next)?;
        *state = next;
        Ok(state.clone())
    }

    /// Forgets a repository. Unknown paths are a no-op.
    ///
    /// Removing the active repository clears the active selection.
    pub fn remove(&self, path: &Path) -> Result<RegistryState> {
        let Some(path) = normalize(path)? else {
            return Ok(self.snapshot());
        };

        let mut state = self.state.write();
        if !state.contains(&path) {
            return Ok(state.clone());
        }
        let mut next = state.clone();
        next.known_repositories.retain(|known| known != &path);
        if next.is_active(&path) {
            next.active_repository = None;
        }
        self.store.save(&next)?;
        *state = next;

        info!(path = %path.display(), "Removed repository");
        Ok(state.clone())
    }

    /// Clones `url` into `destination` through the engine.
    ///
    /// The clone is not registered; callers add it explicitly.
    pub async fn clone_into(
        &self,
        url: &str,
        destination: &Path,
        credentials: &RemoteCredentials,
        progress: ProgressReporter,
    ) -> Result<()> {
        let url = url.trim();
        if url.is_empty() {
            return Err(AppError::Config("Clone URL must not be empty".to_string()));
        }
        self.engine
            .clone_repository(url, destination, credentials, progress)
            .await
    }

    /// Resolves the repository an operation targets.
    ///
    /// An explicit path wins; otherwise the active repository is used.
    pub fn resolve(&self, explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return normalize(path)?.ok_or(AppError::NoActiveRepository);
        }
        self.state
            .read()
            .active_repository
            .clone()
            .ok_or(AppError::NoActiveRepository)
    }
}

/// Trims surrounding whitespace and makes the path absolute.
///
/// Returns `None` for an empty path.
fn normalize(path: &Path) -> Result<Option<PathBuf>> {
    let trimmed = path.to_string_lossy();
    let trimmed = trimmed.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let path = PathBuf::from(trimmed);
    if path.is_absolute() {
        Ok(Some(path))
    } else {
        Ok(Some(std::env::current_dir()?.join(path)))
    }
}
