//! Per-repository operation state.
//!
//! Two pieces cooperate here:
//! - [`OperationTable`] - the `(repository, kind)` state machine for remote
//!   operations, with attempt identifiers for progress tagging. Callers
//!   drive it through an [`AttemptGuard`]
//! - [`RepoLeases`] - the per-repository mutation lease that serializes every
//!   mutating operation and rejects overlap instead of queueing it

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AppError, Result};

/// Failure reason recorded for attempts whose caller went away.
const CANCELLED: &str = "cancelled";

/// Identifier of one run of a remote operation.
pub type AttemptId = u64;

/// Remote operations tracked by the sync state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Fetch,
    Push,
    Clone,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch => write!(f, "fetch"),
            Self::Push => write!(f, "push"),
            Self::Clone => write!(f, "clone"),
        }
    }
}

/// Every operation that mutates a repository or its refs.
///
/// Also selects which cache entries are invalidated once it succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mutation {
    Checkout,
    CreateBranch,
    Merge,
    Commit,
    Stage,
    Unstage,
    Fetch,
    Push,
    Clone,
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Checkout => "checkout",
            Self::CreateBranch => "create-branch",
            Self::Merge => "merge",
            Self::Commit => "commit",
            Self::Stage => "stage",
            Self::Unstage => "unstage",
            Self::Fetch => "fetch",
            Self::Push => "push",
            Self::Clone => "clone",
        };
        f.write_str(label)
    }
}

impl From<OperationKind> for Mutation {
    fn from(kind: OperationKind) -> Self {
        match kind {
            OperationKind::Fetch => Self::Fetch,
            OperationKind::Push => Self::Push,
            OperationKind::Clone => Self::Clone,
        }
    }
}

/// State of one `(repository, kind)` pair.
///
/// `Succeeded` and `Failed` are terminal for their attempt; the table
/// returns the pair to `Idle` once the orchestrator has reacted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Running {
        attempt: AttemptId,
        phase: String,
        progress: u8,
    },
    Succeeded {
        attempt: AttemptId,
    },
    Failed {
        attempt: AttemptId,
        reason: String,
    },
}

impl SyncState {
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }
}

/// Key of the state machine: one independent machine per pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationKey {
    pub repository: PathBuf,
    pub kind: OperationKind,
}

impl OperationKey {
    #[must_use]
    pub fn new(repository: &Path, kind: OperationKind) -> Self {
        Self {
            repository: repository.to_path_buf(),
            kind,
        }
    }
}

#[derive(Debug, Default)]
struct TableInner {
    states: HashMap<OperationKey, SyncState>,
    latest: HashMap<OperationKey, AttemptId>,
}

/// State machine table for remote operations.
#[derive(Debug, Default)]
pub struct OperationTable {
    inner: Mutex<TableInner>,
    next_attempt: AtomicU64,
}

impl OperationTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state; pairs never started are `Idle`.
    pub fn state(&self, key: &OperationKey) -> SyncState {
        self.inner
            .lock()
            .states
            .get(key)
            .cloned()
            .unwrap_or(SyncState::Idle)
    }

    /// Moves `Idle -> Running` under a fresh attempt id.
    ///
    /// Fails with [`AppError::OperationInProgress`] while the pair is running.
    pub fn begin(&self, key: &OperationKey) -> Result<AttemptId> {
        let mut inner = self.inner.lock();
        if inner.states.get(key).is_some_and(SyncState::is_running) {
            return Err(AppError::OperationInProgress {
                repository: key.repository.clone(),
                operation: key.kind.into(),
            });
        }

        let attempt = self.next_attempt.fetch_add(1, Ordering::Relaxed) + 1;
        inner.states.insert(
            key.clone(),
            SyncState::Running {
                attempt,
                phase: "Starting".to_string(),
                progress: 0,
            },
        );
        inner.latest.insert(key.clone(), attempt);
        Ok(attempt)
    }

    /// Records progress for a running attempt.
    ///
    /// Returns the value that was stored, or `None` if the update belongs
    /// to an attempt that is no longer running. Values never decrease
    /// within an attempt.
    pub fn record_progress(
        &self,
        key: &OperationKey,
        attempt: AttemptId,
        phase: &str,
        value: u8,
    ) -> Option<u8> {
        let mut inner = self.inner.lock();
        match inner.states.get_mut(key) {
            Some(SyncState::Running {
                attempt: running,
                phase: current_phase,
                progress,
            }) if *running == attempt => {
                *progress = value.min(100).max(*progress);
                phase.clone_into(current_phase);
                Some(*progress)
            },
            _ => None,
        }
    }

    /// Moves a running attempt to its terminal state.
    pub fn complete(&self, key: &OperationKey, attempt: AttemptId, outcome: Option<String>) {
        let mut inner = self.inner.lock();
        if !matches!(inner.states.get(key), Some(SyncState::Running { attempt: running, .. }) if *running == attempt)
        {
            return;
        }
        let terminal = match outcome {
            None => SyncState::Succeeded { attempt },
            Some(reason) => SyncState::Failed { attempt, reason },
        };
        inner.states.insert(key.clone(), terminal);
    }

    /// Returns a terminal attempt to `Idle`.
    pub fn reset(&self, key: &OperationKey, attempt: AttemptId) {
        let mut inner = self.inner.lock();
        let terminal_for_attempt = matches!(
            inner.states.get(key),
            Some(SyncState::Succeeded { attempt: a } | SyncState::Failed { attempt: a, .. }) if *a == attempt
        );
        if terminal_for_attempt {
            inner.states.remove(key);
        }
    }

    /// True if `attempt` is the most recent attempt started for the pair.
    pub fn is_latest(&self, key: &OperationKey, attempt: AttemptId) -> bool {
        self.inner.lock().latest.get(key) == Some(&attempt)
    }
}

/// A running attempt that settles itself.
///
/// Dropping the guard without [`finish`](Self::finish), for example when
/// the caller's future is cancelled, records the attempt as failed and
/// returns the pair to `Idle`.
#[derive(Debug)]
pub struct AttemptGuard {
    table: Arc<OperationTable>,
    key: OperationKey,
    attempt: AttemptId,
    settled: bool,
}

impl AttemptGuard {
    /// Starts a new attempt for `key`; see [`OperationTable::begin`].
    pub fn begin(table: &Arc<OperationTable>, key: OperationKey) -> Result<Self> {
        let attempt = table.begin(&key)?;
        Ok(Self {
            table: Arc::clone(table),
            key,
            attempt,
            settled: false,
        })
    }

    #[must_use]
    pub const fn attempt(&self) -> AttemptId {
        self.attempt
    }

    #[must_use]
    pub const fn key(&self) -> &OperationKey {
        &self.key
    }

    /// Records the outcome (`None` for success) and returns to `Idle`.
    pub fn finish(mut self, outcome: Option<String>) {
        self.settle(outcome);
    }

    fn settle(&mut self, outcome: Option<String>) {
        self.settled = true;
        self.table.complete(&self.key, self.attempt, outcome);
        self.table.reset(&self.key, self.attempt);
    }
}

impl Drop for AttemptGuard {
    fn drop(&mut self) {
        if !self.settled {
            warn!(
                repository = %self.key.repository.display(),
                kind = %self.key.kind,
                attempt = self.attempt,
                "Remote operation abandoned"
            );
            self.settle(Some(CANCELLED.to_string()));
        }
    }
}

/// Per-repository mutation leases.
#[derive(Debug, Clone, Default)]
pub struct RepoLeases {
    held: Arc<Mutex<HashMap<PathBuf, Mutation>>>,
}

impl RepoLeases {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the lease for `repository`, or reports which mutation holds it.
    pub fn acquire(&self, repository: &Path, mutation: Mutation) -> Result<RepoLease> {
        let mut held = self.held.lock();
        if let Some(holder) = held.get(repository) {
            return Err(AppError::OperationInProgress {
                repository: repository.to_path_buf(),
                operation: *holder,
            });
        }
        held.insert(repository.to_path_buf(), mutation);
        Ok(RepoLease {
            held: Arc::clone(&self.held),
            repository: repository.to_path_buf(),
        })
    }

    /// Mutation currently holding the lease, if any.
    pub fn holder(&self, repository: &Path) -> Option<Mutation> {
        self.held.lock().get(repository).copied()
    }
}

/// Releases its repository when dropped.
#[derive(Debug)]
pub struct RepoLease {
    held: Arc<Mutex<HashMap<PathBuf, Mutation>>>,
    repository: PathBuf,
}

impl Drop for RepoLease {
    fn drop(&mut self) {
        self.held.lock().remove(&self.repository);
    }
}
