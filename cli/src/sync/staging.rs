//! Client-side staging projection.
//!
//! The staged set is optimistic: it is updated before the engine call and
//! either committed or rolled back to the exact prior set once the call
//! returns. It is reconciled against the working-tree change list whenever
//! that list is refreshed, and seeded from the index the first time a
//! repository is seen so paths staged outside this process show up.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::Serialize;

use crate::engine::FileChange;

use super::state::Mutation;

/// Staging request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagingOp {
    Stage(String),
    Unstage(String),
    StageAll,
    UnstageAll,
}

impl StagingOp {
    #[must_use]
    pub const fn mutation(&self) -> Mutation {
        match self {
            Self::Stage(_) | Self::StageAll => Mutation::Stage,
            Self::Unstage(_) | Self::UnstageAll => Mutation::Unstage,
        }
    }
}

/// Lifecycle of an optimistic staging update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagingUpdate {
    /// Applied locally; `prior` is restored on rollback.
    Pending { prior: BTreeSet<String> },
    Committed,
    RolledBack,
}

/// Working-tree changes partitioned into staged and unstaged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StagingSet {
    changes: Vec<FileChange>,
    staged: BTreeSet<String>,
}

impl StagingSet {
    /// Changes currently marked staged.
    pub fn staged(&self) -> Vec<&FileChange> {
        self.changes
            .iter()
            .filter(|c| self.staged.contains(&c.path))
            .collect()
    }

    /// Changes not marked staged.
    pub fn unstaged(&self) -> Vec<&FileChange> {
        self.changes
            .iter()
            .filter(|c| !self.staged.contains(&c.path))
            .collect()
    }

    pub fn is_staged(&self, path: &str) -> bool {
        self.staged.contains(path)
    }

    pub fn changes(&self) -> &[FileChange] {
        &self.changes
    }

    fn apply(&mut self, op: &StagingOp) {
        match op {
            StagingOp::Stage(path) => {
                self.staged.insert(path.clone());
            },
            StagingOp::Unstage(path) => {
                self.staged.remove(path);
            },
            StagingOp::StageAll => {
                self.staged
                    .extend(self.changes.iter().map(|c| c.path.clone()));
            },
            StagingOp::UnstageAll => self.staged.clear(),
        }
    }

    /// Replaces the change list and drops staged paths no longer present.
    fn reconcile(&mut self, changes: Vec<FileChange>) {
        self.staged
            .retain(|path| changes.iter().any(|c| &c.path == path));
        self.changes = changes;
    }
}

/// Staging projections for every repository.
#[derive(Debug, Default)]
pub struct StagingBoard {
    sets: Mutex<HashMap<PathBuf, StagingSet>>,
}

impl StagingBoard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, repository: &Path) -> StagingSet {
        self.sets
            .lock()
            .get(repository)
            .cloned()
            .unwrap_or_default()
    }

    /// True once `repository` has a projection.
    pub fn is_tracked(&self, repository: &Path) -> bool {
        self.sets.lock().contains_key(repository)
    }

    /// Starts the projection of `repository` from the paths already staged
    /// in its index. An existing projection is left alone.
    pub fn seed(&self, repository: &Path, staged: Vec<String>) {
        self.sets
            .lock()
            .entry(repository.to_path_buf())
            .or_insert_with(|| StagingSet {
                changes: Vec::new(),
                staged: staged.into_iter().collect(),
            });
    }

    /// Applies `op` optimistically.
    pub fn begin(&self, repository: &Path, op: &StagingOp) -> StagingUpdate {
        let mut sets = self.sets.lock();
        let set = sets.entry(repository.to_path_buf()).or_default();
        let prior = set.staged.clone();
        set.apply(op);
        StagingUpdate::Pending { prior }
    }

    /// Settles a pending update; a failed engine call restores the prior set.
    pub fn settle(&self, repository: &Path, update: StagingUpdate, succeeded: bool) -> StagingUpdate {
        let StagingUpdate::Pending { prior } = update else {
            return update;
        };
        if succeeded {
            return StagingUpdate::Committed;
        }
        if let Some(set) = self.sets.lock().get_mut(repository) {
            set.staged = prior;
        }
        StagingUpdate::RolledBack
    }

    /// Reconciles against a fresh change list and returns the result.
    pub fn reconcile(&self, repository: &Path, changes: Vec<FileChange>) -> StagingSet {
        let mut sets = self.sets.lock();
        let set = sets.entry(repository.to_path_buf()).or_default();
        set.reconcile(changes);
        set.clone()
    }

    /// Clears the staged set, e.g. after its contents were committed.
    pub fn clear(&self, repository: &Path) {
        if let Some(set) = self.sets.lock().get_mut(repository) {
            set.staged.clear();
        }
    }

    pub fn forget(&self, repository: &Path) {
        self.sets.lock().remove(repository);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FileStatus;

    const REPO: &str = "/repo/a";

    fn changes(paths: &[&str]) -> Vec<FileChange> {
        paths
            .iter()
            .map(|p| FileChange::new(*p, FileStatus::Modified))
            .collect()
    }

    fn board_with(paths: &[&str]) -> StagingBoard {
        let board = StagingBoard::new();
        board.reconcile(Path::new(REPO), changes(paths));
        board
    }

    fn staged_paths(set: &StagingSet) -> Vec<&str> {
        set.staged().iter().map(|c| c.path.as_str()).collect()
    }

    #[test]
    fn staged_and_unstaged_partition_changes() {
        let board = board_with(&["a.txt", "b.txt"]);
        let update = board.begin(Path::new(REPO), &StagingOp::Stage("a.txt".to_string()));
        board.settle(Path::new(REPO), update, true);

        let set = board.snapshot(Path::new(REPO));
        assert_eq!(staged_paths(&set), vec!["a.txt"]);
        assert_eq!(set.unstaged().len(), 1);
        assert_eq!(set.staged().len() + set.unstaged().len(), set.changes().len());
    }

    #[test]
    fn failed_stage_restores_exact_prior_set() {
        let board = board_with(&["a.txt", "b.txt"]);
        let repo = Path::new(REPO);
        let first = board.begin(repo, &StagingOp::Stage("a.txt".to_string()));
        board.settle(repo, first, true);

        let pending = board.begin(repo, &StagingOp::Stage("b.txt".to_string()));
        assert!(board.snapshot(repo).is_staged("b.txt"));

        let outcome = board.settle(repo, pending, false);
        assert_eq!(outcome, StagingUpdate::RolledBack);
        assert_eq!(staged_paths(&board.snapshot(repo)), vec!["a.txt"]);
    }

    #[test]
    fn stage_all_rolls_back_as_a_batch() {
        let board = board_with(&["a.txt", "b.txt", "c.txt"]);
        let repo = Path::new(REPO);

        let pending = board.begin(repo, &StagingOp::StageAll);
        assert_eq!(board.snapshot(repo).staged().len(), 3);

        board.settle(repo, pending, false);
        assert!(board.snapshot(repo).staged().is_empty());
    }

    #[test]
    fn unstage_all_clears_everything() {
        let board = board_with(&["a.txt", "b.txt"]);
        let repo = Path::new(REPO);
        let pending = board.begin(repo, &StagingOp::StageAll);
        board.settle(repo, pending, true);

        let pending = board.begin(repo, &StagingOp::UnstageAll);
        assert_eq!(board.settle(repo, pending, true), StagingUpdate::Committed);
        assert!(board.snapshot(repo).staged().is_empty());
    }

    #[test]
    fn reconcile_drops_vanished_paths() {
        let board = board_with(&["a.txt", "b.txt"]);
        let repo = Path::new(REPO);
        let pending = board.begin(repo, &StagingOp::StageAll);
        board.settle(repo, pending, true);

        let set = board.reconcile(repo, changes(&["b.txt", "c.txt"]));
        assert_eq!(staged_paths(&set), vec!["b.txt"]);
        assert!(!set.is_staged("a.txt"));
    }

    #[test]
    fn seed_only_starts_untracked_projections() {
        let board = StagingBoard::new();
        let repo = Path::new(REPO);
        assert!(!board.is_tracked(repo));

        board.seed(repo, vec!["a.txt".to_string(), "gone.txt".to_string()]);
        assert!(board.is_tracked(repo));
        let set = board.reconcile(repo, changes(&["a.txt", "b.txt"]));
        assert_eq!(staged_paths(&set), vec!["a.txt"]);

        board.seed(repo, vec!["b.txt".to_string()]);
        assert_eq!(staged_paths(&board.snapshot(repo)), vec!["a.txt"]);
    }

    #[test]
    fn staging_ops_map_to_mutations() {
        assert_eq!(StagingOp::StageAll.mutation(), Mutation::Stage);
        assert_eq!(StagingOp::Unstage("x".to_string()).mutation(), Mutation::Unstage);
    }
}
