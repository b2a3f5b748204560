//! Registry data types.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Known repositories and the active one.
///
/// `active_repository`, when set, is always an element of
/// `known_repositories`, and `known_repositories` holds no duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryState {
    #[serde(default)]
    pub known_repositories: Vec<PathBuf>,
    #[serde(default)]
    pub active_repository: Option<PathBuf>,
}

impl RegistryState {
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.known_repositories.iter().any(|known| known == path)
    }

    #[must_use]
    pub fn is_active(&self, path: &Path) -> bool {
        self.active_repository.as_deref() == Some(path)
    }

    /// Drops duplicates and a dangling active entry, e.g. after a hand edit.
    #[must_use]
    pub fn repaired(mut self) -> Self {
        let mut seen = Vec::with_capacity(self.known_repositories.len());
        self.known_repositories.retain(|path| {
            if seen.contains(path) {
                false
            } else {
                seen.push(path.clone());
                true
            }
        });
        if let Some(active) = &self.active_repository {
            if !self.contains(active) {
                self.active_repository = None;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repaired_removes_duplicates_and_dangling_active() {
        let state = RegistryState {
            known_repositories: vec![
                PathBuf::from("/repo/a"),
                PathBuf::from("/repo/b"),
                PathBuf::from("/repo/a"),
            ],
            active_repository: Some(PathBuf::from("/repo/gone")),
        }
        .repaired();

        assert_eq!(
            state.known_repositories,
            vec![PathBuf::from("/repo/a"), PathBuf::from("/repo/b")]
        );
        assert_eq!(state.active_repository, None);
    }

    #[test]
    fn deserializes_with_missing_fields() {
        let state: RegistryState = serde_json::from_str("{}").unwrap();
        assert_eq!(state, RegistryState::default());
    }
}
