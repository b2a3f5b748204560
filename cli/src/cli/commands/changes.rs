//! Working-tree and history command handlers.
//!
//! - [`handle_status`] - Staged and unstaged changes (`gitdeck status`)
//! - [`handle_diff`] - Diff of one working-tree file (`gitdeck diff`)
//! - [`handle_stage`] / [`handle_unstage`] - Staging (`gitdeck stage`, `gitdeck unstage`)
//! - [`handle_commit`] - Commit staged changes (`gitdeck commit`)
//! - [`handle_log`] - Commit history (`gitdeck log`)
//! - [`handle_show`] - Files or diff of one commit (`gitdeck show`)

use std::path::Path;

use gitdeck::engine::{FileChange, FileDiff};
use gitdeck::sync::StagingSet;
use gitdeck::{AppContext, Result};

fn print_changes(title: &str, changes: &[&FileChange]) {
    if changes.is_empty() {
        return;
    }
    println!("{title}:");
    for change in changes {
        println!("  {:<9} {}", change.status.to_string(), change.path);
    }
    println!();
}

fn print_staging(set: &StagingSet) {
    if set.changes().is_empty() {
        println!("Nothing to commit, working tree clean.");
        return;
    }
    print_changes("Staged", &set.staged());
    print_changes("Not staged", &set.unstaged());
}

/// Line-by-line listing of old and new content.
fn print_diff(diff: &FileDiff) {
    for line in diff.old_content.lines() {
        println!("- {line}");
    }
    for line in diff.new_content.lines() {
        println!("+ {line}");
    }
}

/// Handles the `gitdeck status` command.
pub async fn handle_status(ctx: &AppContext, repo: Option<&Path>) -> Result<()> {
    let set = ctx.orchestrator.staging(repo).await?;
    print_staging(&set);
    Ok(())
}

/// Handles the `gitdeck diff` command.
pub async fn handle_diff(ctx: &AppContext, repo: Option<&Path>, path: &str) -> Result<()> {
    let repository = ctx.registry.resolve(repo)?;
    let diff = ctx.cache.file_diff(&repository, path).await?;
    if diff.old_content == diff.new_content {
        println!("No changes in {path}.");
    } else {
        print_diff(&diff);
    }
    Ok(())
}

/// Handles the `gitdeck stage` command.
pub async fn handle_stage(ctx: &AppContext, repo: Option<&Path>, path: Option<&str>) -> Result<()> {
    let set = match path {
        Some(path) => ctx.orchestrator.stage(repo, path).await?,
        None => ctx.orchestrator.stage_all(repo).await?,
    };
    print_staging(&set);
    Ok(())
}

/// Handles the `gitdeck unstage` command.
pub async fn handle_unstage(
    ctx: &AppContext,
    repo: Option<&Path>,
    path: Option<&str>,
) -> Result<()> {
    let set = match path {
        Some(path) => ctx.orchestrator.unstage(repo, path).await?,
        None => ctx.orchestrator.unstage_all(repo).await?,
    };
    print_staging(&set);
    Ok(())
}

/// Handles the `gitdeck commit` command.
pub async fn handle_commit(ctx: &AppContext, repo: Option<&Path>, message: &str) -> Result<()> {
    let id = ctx.orchestrator.commit(repo, message).await?;
    let short: String = id.chars().take(7).collect();
    println!("[{short}] {}", message.lines().next().unwrap_or_default());
    Ok(())
}

/// Handles the `gitdeck log` command.
pub async fn handle_log(ctx: &AppContext, repo: Option<&Path>, count: Option<usize>) -> Result<()> {
    let repository = ctx.registry.resolve(repo)?;
    let history = match count {
        Some(count) => ctx.cache.recent_commits(&repository, count).await?,
        None => ctx.cache.commit_history(&repository).await?,
    };
    if history.is_empty() {
        println!("No commits yet.");
        return Ok(());
    }

    for commit in &history {
        let merge = if commit.is_merge() { " (merge)" } else { "" };
        println!(
            "{} {} {:<20} {}{merge}",
            commit.short_id,
            commit.authored_at.format("%Y-%m-%d"),
            commit.author_name,
            commit.summary()
        );
    }
    Ok(())
}

/// Handles the `gitdeck show` command.
pub async fn handle_show(
    ctx: &AppContext,
    repo: Option<&Path>,
    commit: &str,
    path: Option<&str>,
) -> Result<()> {
    let repository = ctx.registry.resolve(repo)?;
    match path {
        Some(path) => {
            let diff = ctx.cache.commit_file_diff(&repository, commit, path).await?;
            print_diff(&diff);
        },
        None => {
            let changes = ctx.cache.commit_file_changes(&repository, commit).await?;
            let refs: Vec<&FileChange> = changes.iter().collect();
            if refs.is_empty() {
                println!("Commit {commit} changed no files.");
            } else {
                print_changes(&format!("Changed in {commit}"), &refs);
            }
        },
    }
    Ok(())
}
