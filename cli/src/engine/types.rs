//! Data types crossing the git engine boundary.
//!
//! - [`Branch`] / [`BranchKind`] - branch listing entries
//! - [`CommitRecord`] - one entry of commit history
//! - [`FileChange`] / [`FileStatus`] - working-tree or per-commit changes
//! - [`FileDiff`] - old/new content pair for a single path
//! - [`MergeAnalysis`] / [`MergeKind`] - advisory merge classification
//! - [`PushResult`] / [`RemoteCredentials`] - remote operation inputs and outputs

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a branch lives in `refs/heads` or `refs/remotes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BranchKind {
    Local,
    Remote,
}

impl fmt::Display for BranchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

impl From<git2::BranchType> for BranchKind {
    fn from(kind: git2::BranchType) -> Self {
        match kind {
            git2::BranchType::Local => Self::Local,
            git2::BranchType::Remote => Self::Remote,
        }
    }
}

/// A branch as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    /// Short name (`main`, `origin/main`).
    pub name: String,
    /// Local or remote.
    pub kind: BranchKind,
    /// True for the checked-out local branch.
    pub is_head: bool,
}

/// A single commit from history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub id: String,
    pub short_id: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub authored_at: DateTime<Utc>,
    /// Parent ids in order; merge commits have more than one.
    pub parent_ids: Vec<String>,
}

impl CommitRecord {
    /// First line of the commit message.
    #[must_use]
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }

    /// Returns true if this commit has more than one parent.
    #[must_use]
    pub fn is_merge(&self) -> bool {
        self.parent_ids.len() > 1
    }
}

/// Kind of change applied to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
    Unknown,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Renamed => "renamed",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

impl From<git2::Status> for FileStatus {
    fn from(status: git2::Status) -> Self {
        if status.intersects(git2::Status::WT_NEW | git2::Status::INDEX_NEW) {
            Self::Added
        } else if status.intersects(git2::Status::WT_DELETED | git2::Status::INDEX_DELETED) {
            Self::Deleted
        } else if status.intersects(git2::Status::WT_RENAMED | git2::Status::INDEX_RENAMED) {
            Self::Renamed
        } else if status.intersects(
            git2::Status::WT_MODIFIED
                | git2::Status::INDEX_MODIFIED
                | git2::Status::WT_TYPECHANGE
                | git2::Status::INDEX_TYPECHANGE,
        ) {
            Self::Modified
        } else {
            Self::Unknown
        }
    }
}

impl From<git2::Delta> for FileStatus {
    fn from(delta: git2::Delta) -> Self {
        match delta {
            git2::Delta::Added | git2::Delta::Untracked | git2::Delta::Copied => Self::Added,
            git2::Delta::Deleted => Self::Deleted,
            git2::Delta::Modified | git2::Delta::Typechange => Self::Modified,
            git2::Delta::Renamed => Self::Renamed,
            _ => Self::Unknown,
        }
    }
}

/// A changed path, either in the working tree or introduced by a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub status: FileStatus,
}

impl FileChange {
    #[must_use]
    pub fn new(path: impl Into<String>, status: FileStatus) -> Self {
        Self {
            path: path.into(),
            status,
        }
    }
}

/// Old and new content of a single file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    pub old_content: String,
    pub new_content: String,
}

/// Outcome class of merging `source` into `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MergeKind {
    UpToDate,
    FastForward,
    NormalMerge,
}

impl fmt::Display for MergeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpToDate => write!(f, "up to date"),
            Self::FastForward => write!(f, "fast-forward"),
            Self::NormalMerge => write!(f, "merge commit required"),
        }
    }
}

/// Result of a merge analysis. Becomes stale as soon as either ref moves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeAnalysis {
    pub kind: MergeKind,
    pub source_branch: String,
    pub target_branch: String,
}

/// What a push did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResult {
    pub branch_name: String,
    pub remote_name: String,
    /// True if this push configured the upstream for the branch.
    pub set_upstream: bool,
}

/// Credentials for remote operations.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RemoteCredentials {
    /// GitHub bearer token, used as an HTTPS password.
    pub token: Option<String>,
}

impl RemoteCredentials {
    /// Builds credentials from an optional token, ignoring blank values.
    #[must_use]
    pub fn from_token(token: Option<String>) -> Self {
        let token = token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        Self { token }
    }

    /// Anonymous credentials (SSH agent or public remotes only).
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }
}

impl fmt::Debug for RemoteCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCredentials")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
