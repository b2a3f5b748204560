//! Scripted in-memory engine for orchestration tests.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::engine::{
    Branch, BranchKind, CommitRecord, FileChange, FileDiff, GitEngine, MergeAnalysis, MergeKind,
    PushResult, RemoteCredentials,
};
use crate::error::{AppError, Result};
use crate::sync::ProgressReporter;

#[derive(Default)]
struct FakeState {
    calls: HashMap<&'static str, usize>,
    failures: HashMap<&'static str, AppError>,
    repositories: HashSet<PathBuf>,
    changes: Vec<FileChange>,
    staged: BTreeSet<String>,
    merge_kind: Option<MergeKind>,
    commits: Vec<CommitRecord>,
}

/// A [`GitEngine`] whose answers are set by the test.
///
/// Any path under `/repo` is a repository unless
/// [`with_repositories`](Self::with_repositories) narrows the set.
#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<FakeState>,
    gates: Mutex<HashMap<&'static str, Arc<Semaphore>>>,
    detached: Mutex<HashSet<&'static str>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repositories(paths: &[&str]) -> Self {
        let engine = Self::new();
        engine.state.lock().repositories = paths.iter().map(PathBuf::from).collect();
        engine
    }

    pub fn calls(&self, op: &'static str) -> usize {
        self.state.lock().calls.get(op).copied().unwrap_or(0)
    }

    /// Makes the next call of `op` fail with `error`.
    pub fn fail_next(&self, op: &'static str, error: AppError) {
        self.state.lock().failures.insert(op, error);
    }

    pub fn set_changes(&self, changes: Vec<FileChange>) {
        self.state.lock().changes = changes;
    }

    /// Marks `paths` as already staged in the index.
    pub fn set_staged(&self, paths: &[&str]) {
        self.state.lock().staged = paths.iter().map(|p| (*p).to_string()).collect();
    }

    pub fn set_merge_kind(&self, kind: MergeKind) {
        self.state.lock().merge_kind = Some(kind);
    }

    /// Blocks `op` after it has been counted, until [`release`](Self::release).
    pub fn hold(&self, op: &'static str) {
        self.gates.lock().insert(op, Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, op: &'static str) {
        if let Some(gate) = self.gates.lock().get(op) {
            gate.add_permits(1);
        }
    }

    /// Runs `op` on a spawned worker that keeps going if the caller is dropped,
    /// like a blocking libgit2 transfer. Only remote operations honour this.
    pub fn detach(&self, op: &'static str) {
        self.detached.lock().insert(op);
    }

    /// Counts the call and returns the scripted failure, if any.
    async fn enter(&self, op: &'static str) -> Result<()> {
        let failure = {
            let mut state = self.state.lock();
            *state.calls.entry(op).or_default() += 1;
            state.failures.remove(op)
        };
        let gate = self.gates.lock().get(op).cloned();
        if let Some(gate) = gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        failure.map_or(Ok(()), Err)
    }

    fn merge_analysis_for(&self, source: &str, target: &str) -> MergeAnalysis {
        MergeAnalysis {
            kind: self.state.lock().merge_kind.unwrap_or(MergeKind::UpToDate),
            source_branch: source.to_string(),
            target_branch: target.to_string(),
        }
    }
}

pub fn commit(id: &str, message: &str) -> CommitRecord {
    CommitRecord {
        id: id.to_string(),
        short_id: id.chars().take(7).collect(),
        message: message.to_string(),
        author_name: "Test".to_string(),
        author_email: "test@test.com".to_string(),
        authored_at: Utc::now(),
        parent_ids: Vec::new(),
    }
}

#[async_trait]
impl GitEngine for FakeEngine {
    async fn is_repository(&self, path: &Path) -> bool {
        let state = self.state.lock();
        if state.repositories.is_empty() {
            path.starts_with("/repo")
        } else {
            state.repositories.contains(path)
        }
    }

    async fn clone_repository(
        &self,
        _url: &str,
        _destination: &Path,
        _credentials: &RemoteCredentials,
        progress: ProgressReporter,
    ) -> Result<()> {
        self.enter("clone").await?;
        progress.report("Downloading Objects", 100);
        Ok(())
    }

    async fn list_branches(&self, _repo: &Path) -> Result<Vec<Branch>> {
        self.enter("list_branches").await?;
        Ok(vec![
            Branch {
                name: "main".to_string(),
                kind: BranchKind::Local,
                is_head: true,
            },
            Branch {
                name: "feature".to_string(),
                kind: BranchKind::Local,
                is_head: false,
            },
        ])
    }

    async fn checkout_branch(&self, _repo: &Path, _name: &str) -> Result<()> {
        self.enter("checkout").await
    }

    async fn create_branch(&self, _repo: &Path, _name: &str) -> Result<()> {
        self.enter("create_branch").await
    }

    async fn merge_analysis(
        &self,
        _repo: &Path,
        source: &str,
        target: &str,
    ) -> Result<MergeAnalysis> {
        self.enter("merge_analysis").await?;
        Ok(self.merge_analysis_for(source, target))
    }

    async fn fast_forward(&self, _repo: &Path, _source: &str, _target: &str) -> Result<()> {
        self.enter("fast_forward").await?;
        self.state.lock().merge_kind = Some(MergeKind::UpToDate);
        Ok(())
    }

    async fn normal_merge(&self, _repo: &Path, _source: &str, _target: &str) -> Result<()> {
        self.enter("normal_merge").await?;
        self.state.lock().merge_kind = Some(MergeKind::UpToDate);
        Ok(())
    }

    async fn get_commits(&self, _repo: &Path, page_size: usize) -> Result<Vec<CommitRecord>> {
        self.enter("get_commits").await?;
        Ok(self
            .state
            .lock()
            .commits
            .iter()
            .take(page_size)
            .cloned()
            .collect())
    }

    async fn get_file_diff_by_commit(
        &self,
        _repo: &Path,
        _commit: &str,
        _path: &str,
    ) -> Result<FileDiff> {
        self.enter("get_file_diff_by_commit").await?;
        Ok(FileDiff::default())
    }

    async fn get_repo_changes_from_commit(
        &self,
        _repo: &Path,
        _commit: &str,
    ) -> Result<Vec<FileChange>> {
        self.enter("get_repo_changes_from_commit").await?;
        Ok(Vec::new())
    }

    async fn stage(&self, _repo: &Path, path: &str) -> Result<()> {
        self.enter("stage").await?;
        self.state.lock().staged.insert(path.to_string());
        Ok(())
    }

    async fn stage_all(&self, _repo: &Path) -> Result<()> {
        self.enter("stage_all").await?;
        let mut state = self.state.lock();
        let paths: Vec<String> = state.changes.iter().map(|c| c.path.clone()).collect();
        state.staged.extend(paths);
        Ok(())
    }

    async fn unstage(&self, _repo: &Path, path: &str) -> Result<()> {
        self.enter("unstage").await?;
        self.state.lock().staged.remove(path);
        Ok(())
    }

    async fn unstage_all(&self, _repo: &Path) -> Result<()> {
        self.enter("unstage_all").await?;
        self.state.lock().staged.clear();
        Ok(())
    }

    async fn commit(&self, _repo: &Path, message: &str) -> Result<String> {
        self.enter("commit").await?;
        let mut state = self.state.lock();
        let id = format!("{:040x}", state.commits.len() + 1);
        state.commits.insert(0, commit(&id, message));
        state.changes.clear();
        state.staged.clear();
        Ok(id)
    }

    async fn get_working_tree_changes(&self, _repo: &Path) -> Result<Vec<FileChange>> {
        self.enter("get_working_tree_changes").await?;
        Ok(self.state.lock().changes.clone())
    }

    async fn staged_paths(&self, _repo: &Path) -> Result<Vec<String>> {
        self.enter("staged_paths").await?;
        Ok(self.state.lock().staged.iter().cloned().collect())
    }

    async fn get_file_diff(&self, _repo: &Path, _path: &str) -> Result<FileDiff> {
        self.enter("get_file_diff").await?;
        Ok(FileDiff::default())
    }

    async fn fetch(
        &self,
        _repo: &Path,
        _remote: &str,
        _credentials: &RemoteCredentials,
        progress: ProgressReporter,
    ) -> Result<()> {
        progress.report("Receiving objects", 10);
        if self.detached.lock().contains("fetch") {
            *self.state.lock().calls.entry("fetch").or_default() += 1;
            let gate = self.gates.lock().get("fetch").cloned();
            let worker = tokio::spawn(async move {
                if let Some(gate) = gate {
                    gate.acquire_owned().await.expect("gate closed").forget();
                }
                progress.report("Receiving objects", 100)
            });
            let accepted = worker
                .await
                .map_err(|e| AppError::EngineFailure(e.to_string()))?;
            return if accepted {
                Ok(())
            } else {
                Err(AppError::EngineFailure("transfer aborted".to_string()))
            };
        }
        self.enter("fetch").await?;
        progress.report("Receiving objects", 100);
        Ok(())
    }

    async fn push(
        &self,
        _repo: &Path,
        remote: &str,
        _credentials: &RemoteCredentials,
        progress: ProgressReporter,
    ) -> Result<PushResult> {
        progress.report("Pushing objects", 10);
        self.enter("push").await?;
        progress.report("Pushing objects", 100);
        Ok(PushResult {
            branch_name: "main".to_string(),
            remote_name: remote.to_string(),
            set_upstream: false,
        })
    }
}
