//! Sync orchestration.
//!
//! This module sequences every mutating git operation:
//! - [`SyncOrchestrator`] - entry point for mutations and remote operations
//! - [`OperationTable`] / [`SyncState`] - per-repository, per-kind state machine
//! - [`ProgressHub`] - attempt-tagged progress fan-out
//! - [`StagingBoard`] - optimistic staging projection with rollback

pub mod orchestrator;
pub mod progress;
pub mod staging;
pub mod state;

pub use orchestrator::SyncOrchestrator;
pub use progress::{ProgressHub, ProgressReporter, ProgressSubscription, ProgressUpdate};
pub use staging::{StagingBoard, StagingOp, StagingSet, StagingUpdate};
pub use state::{
    AttemptGuard, AttemptId, Mutation, OperationKey, OperationKind, OperationTable, RepoLease,
    RepoLeases, SyncState,
};
