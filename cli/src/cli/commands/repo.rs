//! Repository registry command handlers.
//!
//! - [`handle_add`] - Register a local repository (`gitdeck repo add`)
//! - [`handle_list`] - List known repositories (`gitdeck repo list`)
//! - [`handle_use`] - Switch the active repository (`gitdeck repo use`)
//! - [`handle_remove`] - Forget a repository (`gitdeck repo remove`)
//! - [`handle_clone`] - Clone and register (`gitdeck repo clone`)
//! - [`handle_github`] - List GitHub repositories (`gitdeck repo github`)

use std::path::Path;

use gitdeck::sync::OperationKind;
use gitdeck::{AppContext, AppError, Result};

use super::remote::with_progress;

/// Handles the `gitdeck repo add` command.
pub async fn handle_add(ctx: &AppContext, path: &Path) -> Result<()> {
    if ctx.registry.validate_and_register(path).await? {
        println!("Added repository: {}", path.display());
        if ctx.registry.snapshot().active_repository.is_none() {
            println!("Run 'gitdeck repo use {}' to make it active.", path.display());
        }
        Ok(())
    } else {
        Err(AppError::not_found("Repository", path.display().to_string()))
    }
}

/// Handles the `gitdeck repo list` command.
pub fn handle_list(ctx: &AppContext) -> Result<()> {
    let state = ctx.registry.snapshot();
    if state.known_repositories.is_empty() {
        println!("No repositories yet.");
        println!();
        println!("Add one with 'gitdeck repo add <path>' or 'gitdeck repo clone <url> <dest>'.");
        return Ok(());
    }

    println!("Repositories:");
    println!();
    for path in &state.known_repositories {
        let marker = if state.is_active(path) { "*" } else { " " };
        println!("{marker} {}", path.display());
    }
    Ok(())
}

/// Handles the `gitdeck repo use` command.
pub fn handle_use(ctx: &AppContext, path: &Path) -> Result<()> {
    let state = ctx.registry.set_active(path)?;
    if let Some(active) = state.active_repository {
        println!("Active repository: {}", active.display());
    }
    Ok(())
}

/// Handles the `gitdeck repo remove` command.
pub fn handle_remove(ctx: &AppContext, path: &Path) -> Result<()> {
    let before = ctx.registry.snapshot().known_repositories.len();
    let state = ctx.registry.remove(path)?;

    if state.known_repositories.len() < before {
        ctx.orchestrator.forget(&ctx.registry.resolve(Some(path))?);
        println!("Removed repository: {}", path.display());
        if state.active_repository.is_none() {
            println!("No repository is active now.");
        }
    } else {
        println!("Repository '{}' was not registered.", path.display());
    }
    Ok(())
}

/// Handles the `gitdeck repo clone` command.
///
/// Clones, then registers the new repository. The first repository added
/// also becomes active.
pub async fn handle_clone(ctx: &AppContext, url: &str, destination: &Path) -> Result<()> {
    let credentials = ctx.remote_credentials()?;
    println!("Cloning {url} into {}...", destination.display());

    let path = with_progress(
        ctx,
        destination,
        &[OperationKind::Clone],
        ctx.orchestrator
            .clone_repository(url, destination, &credentials),
    )
    .await?;

    if !ctx.registry.validate_and_register(&path).await? {
        return Err(AppError::EngineFailure(format!(
            "clone finished but {} is not a repository",
            path.display()
        )));
    }
    let state = ctx.registry.snapshot();
    if state.known_repositories.len() == 1 {
        ctx.registry.set_active(&path)?;
        println!("Cloned and activated {}", path.display());
    } else {
        println!("Cloned {}", path.display());
    }
    Ok(())
}

/// Handles the `gitdeck repo github` command.
pub async fn handle_github(ctx: &AppContext) -> Result<()> {
    if !ctx.authenticate_client().await? {
        return Err(AppError::NotAuthenticated);
    }

    let repositories = ctx.github.list_repositories().await?;
    if repositories.is_empty() {
        println!("No repositories found on GitHub.");
        return Ok(());
    }

    for repo in &repositories {
        let visibility = if repo.private { "private" } else { "public" };
        let language = repo.language.as_deref().unwrap_or("-");
        println!(
            "{:<40} {:<8} {:<12} {}",
            repo.full_name,
            visibility,
            language,
            repo.updated_at.format("%Y-%m-%d")
        );
        println!("    {}", repo.clone_url);
    }
    println!();
    println!("{} repositories", repositories.len());
    Ok(())
}
