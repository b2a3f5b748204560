//! Read-through cache of git views.
//!
//! Holds the results of engine reads keyed by repository (and commit or
//! path where relevant). After a mutation succeeds the orchestrator calls
//! [`WorkingTreeCache::invalidate`], which marks exactly the views that
//! mutation can change as stale. Reads after that go back to the engine.

mod slots;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::engine::{Branch, CommitRecord, FileChange, FileDiff, GitEngine};
use crate::error::Result;
use crate::sync::Mutation;

use slots::Slots;

/// Views a mutation invalidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Invalidation {
    pub branches: bool,
    pub commit_history: bool,
    pub working_tree_changes: bool,
    /// All `file_diff` entries of the repository.
    pub file_diffs: bool,
}

impl Mutation {
    /// Which cached views this mutation makes stale.
    #[must_use]
    pub const fn invalidation(self) -> Invalidation {
        const ALL: Invalidation = Invalidation {
            branches: true,
            commit_history: true,
            working_tree_changes: true,
            file_diffs: true,
        };
        match self {
            Self::Checkout | Self::Merge | Self::Fetch | Self::Clone => ALL,
            Self::CreateBranch => Invalidation {
                branches: true,
                ..Invalidation::NONE
            },
            Self::Commit => Invalidation {
                commit_history: true,
                working_tree_changes: true,
                file_diffs: true,
                ..Invalidation::NONE
            },
            Self::Stage | Self::Unstage => Invalidation {
                working_tree_changes: true,
                file_diffs: true,
                ..Invalidation::NONE
            },
            Self::Push => Invalidation {
                branches: true,
                commit_history: true,
                working_tree_changes: true,
                file_diffs: false,
            },
        }
    }
}

impl Invalidation {
    pub const NONE: Self = Self {
        branches: false,
        commit_history: false,
        working_tree_changes: false,
        file_diffs: false,
    };
}

/// Addresses one cached view; used to inspect freshness.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Branches(PathBuf),
    CommitHistory(PathBuf),
    WorkingTreeChanges(PathBuf),
    CommitFileChanges(PathBuf, String),
    FileDiff(PathBuf, String),
    CommitFileDiff(String, String),
}

/// Read-through cache in front of a [`GitEngine`].
pub struct WorkingTreeCache {
    engine: Arc<dyn GitEngine>,
    commit_page_size: usize,
    branches: Slots<PathBuf, Vec<Branch>>,
    commit_history: Slots<PathBuf, Vec<CommitRecord>>,
    working_tree_changes: Slots<PathBuf, Vec<FileChange>>,
    commit_file_changes: Slots<(PathBuf, String), Vec<FileChange>>,
    file_diff: Slots<(PathBuf, String), FileDiff>,
    // Commits are immutable, so this one is keyed without the repository
    // and never invalidated.
    commit_file_diff: Slots<(String, String), FileDiff>,
}

impl WorkingTreeCache {
    #[must_use]
    pub fn new(engine: Arc<dyn GitEngine>, commit_page_size: usize) -> Self {
        Self {
            engine,
            commit_page_size,
            branches: Slots::default(),
            commit_history: Slots::default(),
            working_tree_changes: Slots::default(),
            commit_file_changes: Slots::default(),
            file_diff: Slots::default(),
            commit_file_diff: Slots::default(),
        }
    }

    pub async fn branches(&self, repo: &Path) -> Result<Vec<Branch>> {
        self.branches
            .get_or_fetch(repo.to_path_buf(), || self.engine.list_branches(repo))
            .await
    }

    pub async fn commit_history(&self, repo: &Path) -> Result<Vec<CommitRecord>> {
        self.commit_history
            .get_or_fetch(repo.to_path_buf(), || {
                self.engine.get_commits(repo, self.commit_page_size)
            })
            .await
    }

    /// The newest `count` commits.
    ///
    /// Served from the cached page when it is long enough; a larger request
    /// reads through to the engine and is not cached.
    pub async fn recent_commits(&self, repo: &Path, count: usize) -> Result<Vec<CommitRecord>> {
        if count <= self.commit_page_size {
            let mut history = self.commit_history(repo).await?;
            history.truncate(count);
            return Ok(history);
        }
        self.engine.get_commits(repo, count).await
    }

    pub async fn working_tree_changes(&self, repo: &Path) -> Result<Vec<FileChange>> {
        self.working_tree_changes
            .get_or_fetch(repo.to_path_buf(), || {
                self.engine.get_working_tree_changes(repo)
            })
            .await
    }

    pub async fn commit_file_changes(&self, repo: &Path, commit: &str) -> Result<Vec<FileChange>> {
        self.commit_file_changes
            .get_or_fetch((repo.to_path_buf(), commit.to_string()), || {
                self.engine.get_repo_changes_from_commit(repo, commit)
            })
            .await
    }

    pub async fn file_diff(&self, repo: &Path, path: &str) -> Result<FileDiff> {
        self.file_diff
            .get_or_fetch((repo.to_path_buf(), path.to_string()), || {
                self.engine.get_file_diff(repo, path)
            })
            .await
    }

    pub async fn commit_file_diff(&self, repo: &Path, commit: &str, path: &str) -> Result<FileDiff> {
        self.commit_file_diff
            .get_or_fetch((commit.to_string(), path.to_string()), || {
                self.engine.get_file_diff_by_commit(repo, commit, path)
            })
            .await
    }

    /// Marks stale every view of `repo` that `mutation` can change.
    pub fn invalidate(&self, repo: &Path, mutation: Mutation) {
        let invalidation = mutation.invalidation();
        let key = repo.to_path_buf();

        if invalidation.branches {
            self.branches.invalidate(&key);
        }
        if invalidation.commit_history {
            self.commit_history.invalidate(&key);
        }
        if invalidation.working_tree_changes {
            self.working_tree_changes.invalidate(&key);
        }
        if invalidation.file_diffs {
            self.file_diff.invalidate_where(|(r, _)| r == repo);
        }
        debug!(repository = %repo.display(), %mutation, ?invalidation, "Invalidated cached views");
    }

    /// Marks every view of `repo` stale.
    pub fn invalidate_repository(&self, repo: &Path) {
        let key = repo.to_path_buf();
        self.branches.invalidate(&key);
        self.commit_history.invalidate(&key);
        self.working_tree_changes.invalidate(&key);
        self.commit_file_changes.invalidate_where(|(r, _)| r == repo);
        self.file_diff.invalidate_where(|(r, _)| r == repo);
    }

    /// True if `key` currently holds a cached value.
    pub fn is_fresh(&self, key: &CacheKey) -> bool {
        match key {
            CacheKey::Branches(repo) => self.branches.is_fresh(repo),
            CacheKey::CommitHistory(repo) => self.commit_history.is_fresh(repo),
            CacheKey::WorkingTreeChanges(repo) => self.working_tree_changes.is_fresh(repo),
            CacheKey::CommitFileChanges(repo, commit) => self
                .commit_file_changes
                .is_fresh(&(repo.clone(), commit.clone())),
            CacheKey::FileDiff(repo, path) => {
                self.file_diff.is_fresh(&(repo.clone(), path.clone()))
            },
            CacheKey::CommitFileDiff(commit, path) => self
                .commit_file_diff
                .is_fresh(&(commit.clone(), path.clone())),
        }
    }
}
