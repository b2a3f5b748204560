//! Branch command handlers.

use std::path::Path;

use gitdeck::engine::{BranchKind, MergeKind};
use gitdeck::{AppContext, Result};

/// Handles the `gitdeck branch list` command.
pub async fn handle_list(ctx: &AppContext, repo: Option<&Path>) -> Result<()> {
    let repository = ctx.registry.resolve(repo)?;
    let branches = ctx.cache.branches(&repository).await?;

    for kind in [BranchKind::Local, BranchKind::Remote] {
        let mut names: Vec<_> = branches.iter().filter(|b| b.kind == kind).collect();
        if names.is_empty() {
            continue;
        }
        names.sort_by(|a, b| a.name.cmp(&b.name));

        println!("{} branches:", if kind == BranchKind::Local { "Local" } else { "Remote" });
        for branch in names {
            let marker = if branch.is_head { "*" } else { " " };
            println!("{marker} {}", branch.name);
        }
        println!();
    }
    Ok(())
}

/// Handles the `gitdeck branch create` command.
pub async fn handle_create(ctx: &AppContext, repo: Option<&Path>, name: &str) -> Result<()> {
    ctx.orchestrator.create_branch(repo, name).await?;
    println!("Created branch '{name}'.");
    Ok(())
}

/// Handles the `gitdeck branch checkout` command.
pub async fn handle_checkout(ctx: &AppContext, repo: Option<&Path>, name: &str) -> Result<()> {
    ctx.orchestrator.checkout_branch(repo, name).await?;
    println!("Switched to branch '{name}'.");
    Ok(())
}

/// Handles the `gitdeck branch analyze` command.
pub async fn handle_analyze(
    ctx: &AppContext,
    repo: Option<&Path>,
    source: &str,
    target: &str,
) -> Result<()> {
    let analysis = ctx.orchestrator.merge_analysis(repo, source, target).await?;
    println!("Merging '{source}' into '{target}': {}", analysis.kind);
    Ok(())
}

/// Handles the `gitdeck branch merge` command.
pub async fn handle_merge(
    ctx: &AppContext,
    repo: Option<&Path>,
    source: &str,
    target: &str,
) -> Result<()> {
    let analysis = ctx.orchestrator.merge(repo, source, target).await?;
    match analysis.kind {
        MergeKind::UpToDate => println!("'{target}' is already up to date with '{source}'."),
        MergeKind::FastForward => println!("Fast-forwarded '{target}' to '{source}'."),
        MergeKind::NormalMerge => println!("Merged '{source}' into '{target}'."),
    }
    Ok(())
}
