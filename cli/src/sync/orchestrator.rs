//! Sequencing of mutating git operations.
//!
//! Every mutation takes the repository's lease first, so at most one
//! mutation per repository is in flight and overlap is rejected rather than
//! queued. Remote operations additionally run through the per-kind state
//! machine with attempt-tagged progress. After a mutation succeeds the
//! affected cache views are invalidated.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cache::WorkingTreeCache;
use crate::config::SyncConfig;
use crate::engine::{GitEngine, MergeAnalysis, MergeKind, PushResult, RemoteCredentials};
use crate::error::{AppError, Result};
use crate::registry::RepositoryRegistry;

use super::progress::{ProgressHub, ProgressReporter, ProgressSubscription};
use super::staging::{StagingBoard, StagingOp, StagingSet};
use super::state::{
    AttemptGuard, Mutation, OperationKey, OperationKind, OperationTable, RepoLease, RepoLeases,
    SyncState,
};

/// Coordinates engine calls, cache invalidation and progress.
pub struct SyncOrchestrator {
    engine: Arc<dyn GitEngine>,
    registry: Arc<RepositoryRegistry>,
    cache: Arc<WorkingTreeCache>,
    operations: Arc<OperationTable>,
    progress: ProgressHub,
    leases: RepoLeases,
    staging: StagingBoard,
    settings: SyncConfig,
}

impl SyncOrchestrator {
    #[must_use]
    pub fn new(
        engine: Arc<dyn GitEngine>,
        registry: Arc<RepositoryRegistry>,
        cache: Arc<WorkingTreeCache>,
        settings: SyncConfig,
    ) -> Self {
        let operations = Arc::new(OperationTable::new());
        Self {
            engine,
            registry,
            cache,
            progress: ProgressHub::new(Arc::clone(&operations)),
            operations,
            leases: RepoLeases::new(),
            staging: StagingBoard::new(),
            settings,
        }
    }

    /// State of `kind` for `repository`.
    pub fn state(&self, repository: &Path, kind: OperationKind) -> SyncState {
        self.operations
            .state(&OperationKey::new(repository, kind))
    }

    /// Subscribes to progress of `kind` on `repository`.
    pub fn subscribe(&self, repository: &Path, kind: OperationKind) -> ProgressSubscription {
        self.progress.subscribe(repository, kind)
    }

    /// Drops the cached views and staging projection of `repository`.
    pub fn forget(&self, repository: &Path) {
        self.staging.forget(repository);
        self.cache.invalidate_repository(repository);
        debug!(repository = %repository.display(), "Forgot repository state");
    }

    /// Runs a remote operation through the state machine.
    ///
    /// `lease` travels with the progress reporter into the engine, so a
    /// transfer that outlives a timeout keeps the repository leased until
    /// it has really stopped. If this future is dropped, the attempt guard
    /// records the attempt as failed.
    async fn run_remote<T, F, Fut>(
        &self,
        repository: &Path,
        kind: OperationKind,
        lease: &Arc<RepoLease>,
        op: F,
    ) -> Result<T>
    where
        F: FnOnce(ProgressReporter) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let guard = AttemptGuard::begin(&self.operations, OperationKey::new(repository, kind))?;
        let attempt = guard.attempt();
        info!(repository = %repository.display(), %kind, attempt, "Starting remote operation");

        let reporter = self
            .progress
            .leased_reporter(guard.key().clone(), attempt, Arc::clone(lease));
        let limit = Duration::from_secs(self.settings.remote_timeout_secs);
        let result = match tokio::time::timeout(limit, op(reporter)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::TransportFailure(format!(
                "{kind} timed out after {}s",
                limit.as_secs()
            ))),
        };

        match &result {
            Ok(_) => {
                guard.finish(None);
                self.cache.invalidate(repository, kind.into());
                info!(repository = %repository.display(), %kind, attempt, "Remote operation succeeded");
            },
            Err(err) => {
                guard.finish(Some(err.to_string()));
                warn!(repository = %repository.display(), %kind, attempt, error = %err, "Remote operation failed");
            },
        }
        result
    }

    /// Runs a local mutation under the repository lease and invalidates on success.
    async fn mutate<T, F, Fut>(&self, repository: &Path, mutation: Mutation, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _lease = self.leases.acquire(repository, mutation)?;
        let value = op().await?;
        self.cache.invalidate(repository, mutation);
        debug!(repository = %repository.display(), %mutation, "Mutation applied");
        Ok(value)
    }

    pub async fn fetch(&self, repository: Option<&Path>, credentials: &RemoteCredentials) -> Result<()> {
        let repository = self.registry.resolve(repository)?;
        let lease = Arc::new(self.leases.acquire(&repository, Mutation::Fetch)?);
        self.fetch_leased(&repository, &lease, credentials).await
    }

    async fn fetch_leased(
        &self,
        repository: &Path,
        lease: &Arc<RepoLease>,
        credentials: &RemoteCredentials,
    ) -> Result<()> {
        let remote = self.settings.remote_name.as_str();
        self.run_remote(repository, OperationKind::Fetch, lease, |progress| {
            self.engine.fetch(repository, remote, credentials, progress)
        })
        .await
    }

    /// Pushes the checked-out branch.
    ///
    /// With `fetch_first`, a fetch must succeed before the push is attempted;
    /// a failed fetch is returned and the push never starts.
    pub async fn push(
        &self,
        repository: Option<&Path>,
        credentials: &RemoteCredentials,
        fetch_first: bool,
    ) -> Result<PushResult> {
        let repository = self.registry.resolve(repository)?;
        let lease = Arc::new(self.leases.acquire(&repository, Mutation::Push)?);

        if fetch_first {
            if let Err(err) = self.fetch_leased(&repository, &lease, credentials).await {
                warn!(repository = %repository.display(), "Fetch before push failed; push not attempted");
                return Err(err);
            }
        }

        let remote = self.settings.remote_name.as_str();
        let result = self
            .run_remote(&repository, OperationKind::Push, &lease, |progress| {
                self.engine.push(&repository, remote, credentials, progress)
            })
            .await?;
        if result.set_upstream {
            info!(branch = %result.branch_name, remote = %result.remote_name, "Configured upstream");
        }
        Ok(result)
    }

    /// Clones into `destination`. The clone is not registered.
    pub async fn clone_repository(
        &self,
        url: &str,
        destination: &Path,
        credentials: &RemoteCredentials,
    ) -> Result<PathBuf> {
        let lease = Arc::new(self.leases.acquire(destination, Mutation::Clone)?);
        self.run_remote(destination, OperationKind::Clone, &lease, |progress| {
            // Arc<T> has its own `clone_into` via ToOwned.
            RepositoryRegistry::clone_into(&self.registry, url, destination, credentials, progress)
        })
        .await?;
        Ok(destination.to_path_buf())
    }

    pub async fn checkout_branch(&self, repository: Option<&Path>, name: &str) -> Result<()> {
        let repository = self.registry.resolve(repository)?;
        self.mutate(&repository, Mutation::Checkout, || {
            self.engine.checkout_branch(&repository, name)
        })
        .await?;
        // The index now follows the new branch; reseed on the next read.
        self.staging.forget(&repository);
        info!(repository = %repository.display(), branch = name, "Checked out branch");
        Ok(())
    }

    pub async fn create_branch(&self, repository: Option<&Path>, name: &str) -> Result<()> {
        let repository = self.registry.resolve(repository)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::EngineFailure("branch name must not be empty".to_string()));
        }
        self.mutate(&repository, Mutation::CreateBranch, || {
            self.engine.create_branch(&repository, name)
        })
        .await
    }

    /// Classifies a merge. Side-effect free and never cached.
    pub async fn merge_analysis(
        &self,
        repository: Option<&Path>,
        source: &str,
        target: &str,
    ) -> Result<MergeAnalysis> {
        let repository = self.registry.resolve(repository)?;
        self.engine.merge_analysis(&repository, source, target).await
    }

    /// Analyses and acts on a fresh result in one step.
    ///
    /// Returns the analysis that was acted on.
    pub async fn merge(
        &self,
        repository: Option<&Path>,
        source: &str,
        target: &str,
    ) -> Result<MergeAnalysis> {
        let repository = self.registry.resolve(repository)?;
        let _lease = self.leases.acquire(&repository, Mutation::Merge)?;
        let analysis = self.engine.merge_analysis(&repository, source, target).await?;
        self.execute_merge(&repository, &analysis).await?;
        Ok(analysis)
    }

    /// Acts on an analysis the caller obtained earlier.
    ///
    /// The analysis is recomputed first; if the branches moved in the
    /// meantime the merge is refused with [`AppError::StaleMergeAnalysis`].
    pub async fn apply_merge(&self, repository: Option<&Path>, analysis: &MergeAnalysis) -> Result<()> {
        let repository = self.registry.resolve(repository)?;
        let _lease = self.leases.acquire(&repository, Mutation::Merge)?;
        let fresh = self
            .engine
            .merge_analysis(&repository, &analysis.source_branch, &analysis.target_branch)
            .await?;
        if fresh.kind != analysis.kind {
            return Err(AppError::StaleMergeAnalysis {
                expected: analysis.kind,
                actual: fresh.kind,
            });
        }
        self.execute_merge(&repository, &fresh).await
    }

    async fn execute_merge(&self, repository: &Path, analysis: &MergeAnalysis) -> Result<()> {
        let (source, target) = (&analysis.source_branch, &analysis.target_branch);
        match analysis.kind {
            MergeKind::UpToDate => {
                debug!(%source, %target, "Nothing to merge");
                return Ok(());
            },
            MergeKind::FastForward => self.engine.fast_forward(repository, source, target).await?,
            MergeKind::NormalMerge => self.engine.normal_merge(repository, source, target).await?,
        }
        self.cache.invalidate(repository, Mutation::Merge);
        self.staging.forget(repository);
        info!(repository = %repository.display(), %source, %target, kind = %analysis.kind, "Merged");
        Ok(())
    }

    /// Commits the index and returns the new commit id.
    pub async fn commit(&self, repository: Option<&Path>, message: &str) -> Result<String> {
        let repository = self.registry.resolve(repository)?;
        let id = self
            .mutate(&repository, Mutation::Commit, || {
                self.engine.commit(&repository, message)
            })
            .await?;
        self.staging.clear(&repository);
        info!(repository = %repository.display(), commit = %id, "Committed");
        Ok(id)
    }

    /// Staging projection reconciled with the current working-tree changes.
    pub async fn staging(&self, repository: Option<&Path>) -> Result<StagingSet> {
        let repository = self.registry.resolve(repository)?;
        self.reconciled_staging(&repository).await
    }

    /// Starts the projection from the index the first time `repository` is read.
    async fn seed_staging(&self, repository: &Path) -> Result<()> {
        if self.staging.is_tracked(repository) {
            return Ok(());
        }
        let staged = self.engine.staged_paths(repository).await?;
        debug!(
            repository = %repository.display(),
            staged = staged.len(),
            "Seeded staging from index"
        );
        self.staging.seed(repository, staged);
        Ok(())
    }

    async fn reconciled_staging(&self, repository: &Path) -> Result<StagingSet> {
        self.seed_staging(repository).await?;
        let changes = self.cache.working_tree_changes(repository).await?;
        Ok(self.staging.reconcile(repository, changes))
    }

    pub async fn stage(&self, repository: Option<&Path>, path: &str) -> Result<StagingSet> {
        self.apply_staging(repository, StagingOp::Stage(path.to_string()))
            .await
    }

    pub async fn unstage(&self, repository: Option<&Path>, path: &str) -> Result<StagingSet> {
        self.apply_staging(repository, StagingOp::Unstage(path.to_string()))
            .await
    }

    pub async fn stage_all(&self, repository: Option<&Path>) -> Result<StagingSet> {
        self.apply_staging(repository, StagingOp::StageAll).await
    }

    pub async fn unstage_all(&self, repository: Option<&Path>) -> Result<StagingSet> {
        self.apply_staging(repository, StagingOp::UnstageAll).await
    }

    /// Applies a staging change optimistically, then confirms or rolls back.
    async fn apply_staging(&self, repository: Option<&Path>, op: StagingOp) -> Result<StagingSet> {
        let repository = self.registry.resolve(repository)?;
        {
            let _lease = self.leases.acquire(&repository, op.mutation())?;
            self.seed_staging(&repository).await?;
            let pending = self.staging.begin(&repository, &op);

            let result = match &op {
                StagingOp::Stage(path) => self.engine.stage(&repository, path).await,
                StagingOp::Unstage(path) => self.engine.unstage(&repository, path).await,
                StagingOp::StageAll => self.engine.stage_all(&repository).await,
                StagingOp::UnstageAll => self.engine.unstage_all(&repository).await,
            };

            let outcome = self.staging.settle(&repository, pending, result.is_ok());
            if let Err(err) = result {
                warn!(repository = %repository.display(), ?op, error = %err, "Staging failed; rolled back");
                return Err(err);
            }
            debug!(repository = %repository.display(), ?op, ?outcome, "Staging applied");
            self.cache.invalidate(&repository, op.mutation());
        }
        self.reconciled_staging(&repository).await
    }
}
