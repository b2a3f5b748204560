//! Git engine boundary.
//!
//! Every method is a single request/response pair with no retained state
//! and no retries; retry and sequencing policy belongs to the
//! [`SyncOrchestrator`](crate::sync::SyncOrchestrator).
//! - [`GitEngine`] - the typed boundary (mockable in tests)
//! - [`Git2Engine`] - implementation on the git2 (libgit2) library

pub mod error;
pub mod git2_engine;
pub mod types;

use std::path::Path;

use async_trait::async_trait;

pub use error::EngineError;
pub use git2_engine::Git2Engine;
pub use types::{
    Branch, BranchKind, CommitRecord, FileChange, FileDiff, FileStatus, MergeAnalysis, MergeKind,
    PushResult, RemoteCredentials,
};

use crate::error::Result;
use crate::sync::ProgressReporter;

/// Operations the core needs from a git engine.
///
/// Every repository-scoped call takes the repository path explicitly;
/// defaulting to the active repository happens one layer up.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GitEngine: Send + Sync {
    /// Returns true if `path` is an openable git repository.
    async fn is_repository(&self, path: &Path) -> bool;

    /// Clones `url` into `destination`, reporting transfer progress.
    async fn clone_repository(
        &self,
        url: &str,
        destination: &Path,
        credentials: &RemoteCredentials,
        progress: ProgressReporter,
    ) -> Result<()>;

    /// Lists local and remote branches.
    async fn list_branches(&self, repo: &Path) -> Result<Vec<Branch>>;

    /// Checks out a branch, failing on conflicting local changes.
    async fn checkout_branch(&self, repo: &Path, name: &str) -> Result<()>;

    /// Creates a local branch at HEAD without checking it out.
    async fn create_branch(&self, repo: &Path, name: &str) -> Result<()>;

    /// Classifies merging `source` into `target`. Side-effect free.
    async fn merge_analysis(&self, repo: &Path, source: &str, target: &str)
        -> Result<MergeAnalysis>;

    /// Moves `target` to `source`. Rejected if `target` is not an ancestor.
    async fn fast_forward(&self, repo: &Path, source: &str, target: &str) -> Result<()>;

    /// Creates a merge commit of `source` on `target`.
    async fn normal_merge(&self, repo: &Path, source: &str, target: &str) -> Result<()>;

    /// Returns up to `page_size` commits reachable from HEAD, newest first.
    async fn get_commits(&self, repo: &Path, page_size: usize) -> Result<Vec<CommitRecord>>;

    /// Content of `path` in `commit` against its first parent.
    async fn get_file_diff_by_commit(&self, repo: &Path, commit: &str, path: &str)
        -> Result<FileDiff>;

    /// Paths changed by `commit` relative to its first parent.
    async fn get_repo_changes_from_commit(&self, repo: &Path, commit: &str)
        -> Result<Vec<FileChange>>;

    async fn stage(&self, repo: &Path, path: &str) -> Result<()>;

    async fn stage_all(&self, repo: &Path) -> Result<()>;

    async fn unstage(&self, repo: &Path, path: &str) -> Result<()>;

    async fn unstage_all(&self, repo: &Path) -> Result<()>;

    /// Commits the index on HEAD and returns the new commit id.
    async fn commit(&self, repo: &Path, message: &str) -> Result<String>;

    /// Working-tree and index changes relative to HEAD.
    async fn get_working_tree_changes(&self, repo: &Path) -> Result<Vec<FileChange>>;

    /// Paths whose index entry differs from HEAD.
    async fn staged_paths(&self, repo: &Path) -> Result<Vec<String>>;

    /// HEAD content of `path` against the file on disk.
    async fn get_file_diff(&self, repo: &Path, path: &str) -> Result<FileDiff>;

    async fn fetch(
        &self,
        repo: &Path,
        remote: &str,
        credentials: &RemoteCredentials,
        progress: ProgressReporter,
    ) -> Result<()>;

    /// Pushes the checked-out branch, setting its upstream on first push.
    async fn push(
        &self,
        repo: &Path,
        remote: &str,
        credentials: &RemoteCredentials,
        progress: ProgressReporter,
    ) -> Result<PushResult>;
}
