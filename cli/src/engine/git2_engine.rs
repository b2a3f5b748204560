//! [`GitEngine`] implementation on libgit2.
//!
//! libgit2 calls block, so every operation opens the repository fresh inside
//! `spawn_blocking` and returns owned data.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    BranchType, Cred, CredentialType, ErrorClass, ErrorCode, FetchOptions, IndexAddOption,
    PushOptions, RemoteCallbacks, Repository, Signature, Sort, StatusOptions,
};
use tracing::debug;

use crate::engine::error::EngineError;
use crate::engine::types::{
    Branch, BranchKind, CommitRecord, FileChange, FileDiff, MergeAnalysis, MergeKind, PushResult,
    RemoteCredentials,
};
use crate::engine::GitEngine;
use crate::error::{AppError, Result};
use crate::sync::ProgressReporter;

/// Username sent alongside a bearer token over HTTPS.
const TOKEN_USERNAME: &str = "x-access-token";
/// libgit2 re-invokes the credential callback after a rejection; stop after this many.
const MAX_CREDENTIAL_ATTEMPTS: u8 = 3;

const PHASE_DOWNLOADING: &str = "Downloading Objects";
const PHASE_RECEIVING: &str = "Receiving objects";
const PHASE_PUSHING: &str = "Pushing objects";
const PHASE_DONE: &str = "Done";

/// Git engine backed by the git2 crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct Git2Engine;

impl Git2Engine {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GitEngine for Git2Engine {
    async fn is_repository(&self, path: &Path) -> bool {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || Repository::open(path).is_ok())
            .await
            .unwrap_or(false)
    }

    async fn clone_repository(
        &self,
        url: &str,
        destination: &Path,
        credentials: &RemoteCredentials,
        progress: ProgressReporter,
    ) -> Result<()> {
        let url = url.to_string();
        let destination = destination.to_path_buf();
        let credentials = credentials.clone();
        blocking(move || clone_into(&url, &destination, &credentials, &progress)).await
    }

    async fn list_branches(&self, repo: &Path) -> Result<Vec<Branch>> {
        with_repo(repo, list_branches).await
    }

    async fn checkout_branch(&self, repo: &Path, name: &str) -> Result<()> {
        let name = name.to_string();
        with_repo(repo, move |repo| checkout(repo, &name)).await
    }

    async fn create_branch(&self, repo: &Path, name: &str) -> Result<()> {
        let name = name.to_string();
        with_repo(repo, move |repo| create_branch(repo, &name)).await
    }

    async fn merge_analysis(
        &self,
        repo: &Path,
        source: &str,
        target: &str,
    ) -> Result<MergeAnalysis> {
        let (source, target) = (source.to_string(), target.to_string());
        with_repo(repo, move |repo| analyze_merge(repo, &source, &target)).await
    }

    async fn fast_forward(&self, repo: &Path, source: &str, target: &str) -> Result<()> {
        let (source, target) = (source.to_string(), target.to_string());
        with_repo(repo, move |repo| fast_forward(repo, &source, &target)).await
    }

    async fn normal_merge(&self, repo: &Path, source: &str, target: &str) -> Result<()> {
        let (source, target) = (source.to_string(), target.to_string());
        with_repo(repo, move |repo| merge_commit(repo, &source, &target)).await
    }

    async fn get_commits(&self, repo: &Path, page_size: usize) -> Result<Vec<CommitRecord>> {
        with_repo(repo, move |repo| commit_page(repo, page_size)).await
    }

    async fn get_file_diff_by_commit(
        &self,
        repo: &Path,
        commit: &str,
        path: &str,
    ) -> Result<FileDiff> {
        let (commit, path) = (commit.to_string(), path.to_string());
        with_repo(repo, move |repo| commit_file_diff(repo, &commit, &path)).await
    }

    async fn get_repo_changes_from_commit(
        &self,
        repo: &Path,
        commit: &str,
    ) -> Result<Vec<FileChange>> {
        let commit = commit.to_string();
        with_repo(repo, move |repo| commit_changes(repo, &commit)).await
    }

    async fn stage(&self, repo: &Path, path: &str) -> Result<()> {
        let path = path.to_string();
        with_repo(repo, move |repo| stage_path(repo, &path)).await
    }

    async fn stage_all(&self, repo: &Path) -> Result<()> {
        with_repo(repo, |repo| {
            let mut index = repo.index()?;
            index.add_all(["*"], IndexAddOption::DEFAULT, None)?;
            index.update_all(["*"], None)?;
            index.write()?;
            Ok(())
        })
        .await
    }

    async fn unstage(&self, repo: &Path, path: &str) -> Result<()> {
        let path = path.to_string();
        with_repo(repo, move |repo| unstage_paths(repo, &[path])).await
    }

    async fn unstage_all(&self, repo: &Path) -> Result<()> {
        with_repo(repo, |repo| {
            let staged = staged_paths(repo)?;
            unstage_paths(repo, &staged)
        })
        .await
    }

    async fn commit(&self, repo: &Path, message: &str) -> Result<String> {
        let message = message.to_string();
        with_repo(repo, move |repo| commit_index(repo, &message)).await
    }

    async fn get_working_tree_changes(&self, repo: &Path) -> Result<Vec<FileChange>> {
        with_repo(repo, working_tree_changes).await
    }

    async fn staged_paths(&self, repo: &Path) -> Result<Vec<String>> {
        with_repo(repo, staged_paths).await
    }

    async fn get_file_diff(&self, repo: &Path, path: &str) -> Result<FileDiff> {
        let path = path.to_string();
        with_repo(repo, move |repo| working_file_diff(repo, &path)).await
    }

    async fn fetch(
        &self,
        repo: &Path,
        remote: &str,
        credentials: &RemoteCredentials,
        progress: ProgressReporter,
    ) -> Result<()> {
        let remote = remote.to_string();
        let credentials = credentials.clone();
        with_repo(repo, move |repo| fetch_remote(repo, &remote, &credentials, &progress)).await
    }

    async fn push(
        &self,
        repo: &Path,
        remote: &str,
        credentials: &RemoteCredentials,
        progress: ProgressReporter,
    ) -> Result<PushResult> {
        let remote = remote.to_string();
        let credentials = credentials.clone();
        with_repo(repo, move |repo| push_head(repo, &remote, &credentials, &progress)).await
    }
}

/// Runs blocking libgit2 work off the async runtime.
async fn blocking<T, F>(op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| AppError::EngineFailure(format!("engine task failed: {e}")))?
}

/// Opens the repository at `path` and runs `op` against it on the blocking pool.
async fn with_repo<T, F>(path: &Path, op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Repository) -> Result<T> + Send + 'static,
{
    let path = path.to_path_buf();
    blocking(move || {
        let repo = open(&path)?;
        op(&repo)
    })
    .await
}

fn open(path: &Path) -> Result<Repository> {
    Repository::open(path)
        .map_err(|_| EngineError::NotARepository(path.display().to_string()).into())
}

fn workdir(repo: &Repository) -> Result<&Path> {
    repo.workdir()
        .ok_or_else(|| EngineError::Git2("bare repositories are not supported".to_string()).into())
}

fn signature(repo: &Repository) -> Result<Signature<'static>> {
    Ok(repo
        .signature()
        .or_else(|_| Signature::now("gitdeck", "gitdeck@localhost"))?)
}

fn is_unborn(err: &git2::Error) -> bool {
    matches!(err.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound)
}

fn head_commit(repo: &Repository) -> Result<Option<git2::Commit<'_>>> {
    match repo.head() {
        Ok(head) => Ok(Some(head.peel_to_commit()?)),
        Err(e) if is_unborn(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    u8::try_from(done.min(total) * 100 / total).unwrap_or(100)
}

/// Credential callbacks shared by clone, fetch and push.
///
/// A token is offered as an HTTPS password; otherwise the SSH agent or a bare
/// username is tried, depending on what the remote allows.
fn remote_callbacks(credentials: &RemoteCredentials) -> RemoteCallbacks<'static> {
    let token = credentials.token.clone();
    let mut attempts = 0_u8;
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |_url, username_from_url, allowed| {
        attempts += 1;
        if attempts > MAX_CREDENTIAL_ATTEMPTS {
            return Err(git2::Error::new(
                ErrorCode::Auth,
                ErrorClass::Net,
                "remote rejected the supplied credentials",
            ));
        }
        if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
            if let Some(token) = token.as_deref() {
                return Cred::userpass_plaintext(TOKEN_USERNAME, token);
            }
        }
        if allowed.contains(CredentialType::SSH_KEY) {
            return Cred::ssh_key_from_agent(username_from_url.unwrap_or("git"));
        }
        if allowed.contains(CredentialType::USERNAME) {
            return Cred::username(username_from_url.unwrap_or("git"));
        }
        Cred::default()
    });
    callbacks
}

fn clone_into(
    url: &str,
    destination: &Path,
    credentials: &RemoteCredentials,
    progress: &ProgressReporter,
) -> Result<()> {
    let mut callbacks = remote_callbacks(credentials);
    let reporter = progress.clone();
    // Returning false aborts the transfer once the attempt was abandoned.
    callbacks.transfer_progress(move |stats| {
        reporter.report(
            PHASE_DOWNLOADING,
            percent(stats.received_objects(), stats.total_objects()),
        )
    });

    let mut fetch = FetchOptions::new();
    fetch.remote_callbacks(callbacks);

    let mut builder = RepoBuilder::new();
    builder.fetch_options(fetch);
    builder.clone(url, destination)?;

    progress.report(PHASE_DONE, 100);
    debug!(url, destination = %destination.display(), "Clone finished");
    Ok(())
}

fn list_branches(repo: &Repository) -> Result<Vec<Branch>> {
    let mut branches = Vec::new();
    for entry in repo.branches(None)? {
        let (branch, kind) = entry?;
        let Some(name) = branch.name()? else {
            continue;
        };
        // origin/HEAD is a symbolic alias, not a branch
        if name.ends_with("/HEAD") {
            continue;
        }
        let kind = BranchKind::from(kind);
        branches.push(Branch {
            name: name.to_string(),
            kind,
            is_head: kind == BranchKind::Local && branch.is_head(),
        });
    }
    Ok(branches)
}

fn local_branch<'r>(repo: &'r Repository, name: &str) -> Result<git2::Branch<'r>> {
    repo.find_branch(name, BranchType::Local)
        .map_err(|_| EngineError::BranchNotFound(name.to_string()).into())
}

/// Tip commit of a local branch, falling back to a remote-tracking branch.
fn branch_commit<'r>(repo: &'r Repository, name: &str) -> Result<git2::Commit<'r>> {
    let branch = repo
        .find_branch(name, BranchType::Local)
        .or_else(|_| repo.find_branch(name, BranchType::Remote))
        .map_err(|_| EngineError::BranchNotFound(name.to_string()))?;
    Ok(branch.get().peel_to_commit()?)
}

/// Finds or creates the local branch tracking a remote branch.
///
/// Accepts either the remote short name (`origin/feature`) or a bare name
/// that exists on some remote (`feature`).
fn tracking_branch<'r>(repo: &'r Repository, name: &str) -> Result<git2::Branch<'r>> {
    let mut candidates = vec![name.to_string()];
    for remote in repo.remotes()?.iter().flatten() {
        candidates.push(format!("{remote}/{name}"));
    }

    let Some((remote_name, remote_branch)) = candidates.iter().find_map(|candidate| {
        repo.find_branch(candidate, BranchType::Remote)
            .ok()
            .map(|branch| (candidate.clone(), branch))
    }) else {
        return Err(EngineError::BranchNotFound(name.to_string()).into());
    };

    let local_name = remote_name
        .split_once('/')
        .map_or(remote_name.as_str(), |(_, rest)| rest);
    if let Ok(existing) = repo.find_branch(local_name, BranchType::Local) {
        return Ok(existing);
    }

    let commit = remote_branch.get().peel_to_commit()?;
    let mut local = repo.branch(local_name, &commit, false)?;
    local.set_upstream(Some(&remote_name))?;
    debug!(branch = local_name, upstream = %remote_name, "Created tracking branch");
    Ok(local)
}

fn checkout(repo: &Repository, name: &str) -> Result<()> {
    let branch = match repo.find_branch(name, BranchType::Local) {
        Ok(branch) => branch,
        Err(_) => tracking_branch(repo, name)?,
    };
    let reference = branch.into_reference();
    let tree = reference.peel_to_tree()?;

    let mut options = CheckoutBuilder::new();
    options.safe();
    repo.checkout_tree(tree.as_object(), Some(&mut options))?;

    let refname = reference
        .name()
        .ok_or_else(|| EngineError::Git2("Invalid reference name".to_string()))?;
    repo.set_head(refname)?;
    Ok(())
}

fn create_branch(repo: &Repository, name: &str) -> Result<()> {
    let commit = repo.head()?.peel_to_commit()?;
    repo.branch(name, &commit, false).map_err(|e| {
        if e.code() == ErrorCode::Exists {
            EngineError::Git2(format!("a branch named '{name}' already exists"))
        } else {
            EngineError::from(e)
        }
    })?;
    Ok(())
}

fn analyze_merge(repo: &Repository, source: &str, target: &str) -> Result<MergeAnalysis> {
    let source_commit = branch_commit(repo, source)?;
    let target_branch = local_branch(repo, target)?;
    let annotated = repo.find_annotated_commit(source_commit.id())?;
    let (analysis, _) = repo.merge_analysis_for_ref(target_branch.get(), &[&annotated])?;

    let kind = if analysis.is_up_to_date() {
        MergeKind::UpToDate
    } else if analysis.is_fast_forward() {
        MergeKind::FastForward
    } else {
        MergeKind::NormalMerge
    };

    Ok(MergeAnalysis {
        kind,
        source_branch: source.to_string(),
        target_branch: target.to_string(),
    })
}

fn fast_forward(repo: &Repository, source: &str, target: &str) -> Result<()> {
    let source_commit = branch_commit(repo, source)?;
    let mut target_branch = local_branch(repo, target)?;
    let target_oid = target_branch.get().peel_to_commit()?.id();

    if target_oid == source_commit.id() {
        return Ok(());
    }
    if !repo.graph_descendant_of(source_commit.id(), target_oid)? {
        return Err(EngineError::Git2(format!(
            "cannot fast-forward '{target}' to '{source}': the branches have diverged"
        ))
        .into());
    }

    // Update the working tree before the ref so a conflicting checkout leaves the branch alone.
    if target_branch.is_head() {
        let mut options = CheckoutBuilder::new();
        options.safe();
        repo.checkout_tree(source_commit.as_object(), Some(&mut options))?;
    }

    target_branch.get_mut().set_target(
        source_commit.id(),
        &format!("merge {source}: Fast-forward"),
    )?;
    Ok(())
}

fn merge_commit(repo: &Repository, source: &str, target: &str) -> Result<()> {
    let source_commit = branch_commit(repo, source)?;
    let target_branch = local_branch(repo, target)?;
    let target_commit = target_branch.get().peel_to_commit()?;

    let mut index = repo.merge_commits(&target_commit, &source_commit, None)?;
    if index.has_conflicts() {
        let paths: Vec<String> = index
            .conflicts()?
            .filter_map(std::result::Result::ok)
            .filter_map(|conflict| conflict.our.or(conflict.their))
            .map(|entry| String::from_utf8_lossy(&entry.path).into_owned())
            .collect();
        return Err(EngineError::Conflict(paths.join(", ")).into());
    }

    let tree = repo.find_tree(index.write_tree_to(repo)?)?;
    if target_branch.is_head() {
        let mut options = CheckoutBuilder::new();
        options.safe();
        repo.checkout_tree(tree.as_object(), Some(&mut options))?;
    }

    let refname = target_branch
        .get()
        .name()
        .ok_or_else(|| EngineError::Git2("Invalid reference name".to_string()))?
        .to_string();
    let author = signature(repo)?;
    let message = format!("Merge branch '{source}' into {target}");
    repo.commit(
        Some(&refname),
        &author,
        &author,
        &message,
        &tree,
        &[&target_commit, &source_commit],
    )?;
    Ok(())
}

fn commit_record(commit: &git2::Commit<'_>) -> CommitRecord {
    let id = commit.id().to_string();
    let author = commit.author();
    CommitRecord {
        short_id: id.chars().take(7).collect(),
        id,
        message: commit.message().unwrap_or_default().trim_end().to_string(),
        author_name: author.name().unwrap_or_default().to_string(),
        author_email: author.email().unwrap_or_default().to_string(),
        authored_at: DateTime::<Utc>::from_timestamp(author.when().seconds(), 0)
            .unwrap_or_default(),
        parent_ids: commit.parent_ids().map(|id| id.to_string()).collect(),
    }
}

fn commit_page(repo: &Repository, page_size: usize) -> Result<Vec<CommitRecord>> {
    if head_commit(repo)?.is_none() {
        return Ok(Vec::new());
    }

    let mut revwalk = repo.revwalk()?;
    revwalk.push_head()?;
    revwalk.set_sorting(Sort::TIME)?;

    revwalk
        .take(page_size)
        .map(|oid| {
            let commit = repo.find_commit(oid?)?;
            Ok(commit_record(&commit))
        })
        .collect()
}

fn find_commit<'r>(repo: &'r Repository, id: &str) -> Result<git2::Commit<'r>> {
    repo.revparse_single(id)
        .and_then(|object| object.peel_to_commit())
        .map_err(|_| EngineError::CommitNotFound(id.to_string()).into())
}

/// Content of `path` in `tree`, or empty if it isn't there.
fn blob_text(repo: &Repository, tree: &git2::Tree<'_>, path: &str) -> String {
    tree.get_path(Path::new(path))
        .and_then(|entry| entry.to_object(repo))
        .and_then(|object| object.peel_to_blob())
        .map(|blob| String::from_utf8_lossy(blob.content()).into_owned())
        .unwrap_or_default()
}

fn commit_changes(repo: &Repository, id: &str) -> Result<Vec<FileChange>> {
    let commit = find_commit(repo, id)?;
    let tree = commit.tree()?;
    let parent_tree = commit.parents().next().map(|p| p.tree()).transpose()?;

    let mut diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;
    diff.find_similar(None)?;

    Ok(diff
        .deltas()
        .map(|delta| {
            let path = delta
                .new_file()
                .path()
                .or_else(|| delta.old_file().path())
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            FileChange::new(path, delta.status().into())
        })
        .collect())
}

fn commit_file_diff(repo: &Repository, id: &str, path: &str) -> Result<FileDiff> {
    let commit = find_commit(repo, id)?;
    let new_content = blob_text(repo, &commit.tree()?, path);
    let old_content = match commit.parents().next() {
        Some(parent) => blob_text(repo, &parent.tree()?, path),
        None => String::new(),
    };
    Ok(FileDiff {
        old_content,
        new_content,
    })
}

fn working_file_diff(repo: &Repository, path: &str) -> Result<FileDiff> {
    let old_content = match head_commit(repo)? {
        Some(commit) => blob_text(repo, &commit.tree()?, path),
        None => String::new(),
    };
    let new_content = std::fs::read(workdir(repo)?.join(path))
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default();
    Ok(FileDiff {
        old_content,
        new_content,
    })
}

fn working_tree_changes(repo: &Repository) -> Result<Vec<FileChange>> {
    let mut options = StatusOptions::new();
    options
        .include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false);

    let statuses = repo.statuses(Some(&mut options))?;
    Ok(statuses
        .iter()
        .filter(|entry| !entry.status().is_ignored())
        .filter_map(|entry| {
            entry
                .path()
                .map(|path| FileChange::new(path, entry.status().into()))
        })
        .collect())
}

fn stage_path(repo: &Repository, path: &str) -> Result<()> {
    let mut index = repo.index()?;
    if workdir(repo)?.join(path).exists() {
        index.add_all([path], IndexAddOption::DEFAULT, None)?;
    } else {
        index.remove_all([path], None)?;
    }
    index.write()?;
    Ok(())
}

fn staged_paths(repo: &Repository) -> Result<Vec<String>> {
    let index_flags = git2::Status::INDEX_NEW
        | git2::Status::INDEX_MODIFIED
        | git2::Status::INDEX_DELETED
        | git2::Status::INDEX_RENAMED
        | git2::Status::INDEX_TYPECHANGE;

    let statuses = repo.statuses(None)?;
    Ok(statuses
        .iter()
        .filter(|entry| entry.status().intersects(index_flags))
        .filter_map(|entry| entry.path().map(String::from))
        .collect())
}

fn unstage_paths(repo: &Repository, paths: &[String]) -> Result<()> {
    if paths.is_empty() {
        return Ok(());
    }
    match head_commit(repo)? {
        Some(head) => repo.reset_default(Some(head.as_object()), paths.iter().map(String::as_str))?,
        None => {
            // Nothing committed yet: unstaging means dropping the entries.
            let mut index = repo.index()?;
            for path in paths {
                index.remove_path(Path::new(path))?;
            }
            index.write()?;
        },
    }
    Ok(())
}

fn commit_index(repo: &Repository, message: &str) -> Result<String> {
    if message.trim().is_empty() {
        return Err(EngineError::Git2("commit message must not be empty".to_string()).into());
    }

    let mut index = repo.index()?;
    let tree_id = index.write_tree()?;
    let parent = head_commit(repo)?;
    if parent.as_ref().is_some_and(|p| p.tree_id() == tree_id) {
        return Err(EngineError::Git2("nothing staged to commit".to_string()).into());
    }

    let tree = repo.find_tree(tree_id)?;
    let author = signature(repo)?;
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
    let oid = repo.commit(Some("HEAD"), &author, &author, message, &tree, &parents)?;
    Ok(oid.to_string())
}

fn fetch_remote(
    repo: &Repository,
    remote_name: &str,
    credentials: &RemoteCredentials,
    progress: &ProgressReporter,
) -> Result<()> {
    let mut remote = repo
        .find_remote(remote_name)
        .map_err(|_| AppError::not_found("Remote", remote_name))?;

    let mut callbacks = remote_callbacks(credentials);
    let reporter = progress.clone();
    // Returning false aborts the transfer once the attempt was abandoned.
    callbacks.transfer_progress(move |stats| {
        reporter.report(
            PHASE_RECEIVING,
            percent(stats.received_objects(), stats.total_objects()),
        )
    });

    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks);
    remote.fetch(&[] as &[&str], Some(&mut options), None)?;

    progress.report(PHASE_DONE, 100);
    Ok(())
}

fn push_head(
    repo: &Repository,
    remote_name: &str,
    credentials: &RemoteCredentials,
    progress: &ProgressReporter,
) -> Result<PushResult> {
    let head = repo.head()?;
    if !head.is_branch() {
        return Err(EngineError::Git2(
            "HEAD is detached; check out a branch before pushing".to_string(),
        )
        .into());
    }
    let refname = head
        .name()
        .ok_or_else(|| EngineError::Git2("Invalid reference name".to_string()))?
        .to_string();
    let branch_name = head
        .shorthand()
        .ok_or_else(|| EngineError::Git2("Invalid branch name".to_string()))?
        .to_string();

    let mut remote = repo
        .find_remote(remote_name)
        .map_err(|_| AppError::not_found("Remote", remote_name))?;

    let rejected = Rc::new(RefCell::new(Vec::new()));
    let mut callbacks = remote_callbacks(credentials);
    let sink = Rc::clone(&rejected);
    callbacks.push_update_reference(move |reference, status| {
        if let Some(message) = status {
            sink.borrow_mut().push(format!("{reference}: {message}"));
        }
        Ok(())
    });
    let reporter = progress.clone();
    callbacks.push_transfer_progress(move |current, total, _bytes| {
        reporter.report(PHASE_PUSHING, percent(current, total));
    });

    let mut options = PushOptions::new();
    options.remote_callbacks(callbacks);
    let refspec = format!("{refname}:{refname}");
    remote.push(&[refspec.as_str()], Some(&mut options))?;

    let rejections = rejected.borrow();
    if !rejections.is_empty() {
        return Err(EngineError::Rejected(rejections.join("; ")).into());
    }

    let mut branch = local_branch(repo, &branch_name)?;
    let set_upstream = if branch.upstream().is_ok() {
        false
    } else {
        branch.set_upstream(Some(&format!("{remote_name}/{branch_name}")))?;
        true
    };

    progress.report(PHASE_DONE, 100);
    Ok(PushResult {
        branch_name,
        remote_name: remote_name.to_string(),
        set_upstream,
    })
}
