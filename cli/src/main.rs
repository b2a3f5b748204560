//! Gitdeck CLI - Git repository workbench
//!
//! Keeps your repositories in one list, signs in to GitHub with the
//! device flow, and runs branch, staging and sync operations against the
//! active repository.

mod cli;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use gitdeck::config::{load_config, settings::env};
use gitdeck::{AppContext, Result};

use crate::cli::commands::{auth, branch, changes, remote, repo};
use crate::cli::{AuthCommands, BranchCommands, Cli, Commands, RepoCommands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(env::LOG_LEVEL)
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    if let Commands::Completions { shell } = cli.command {
        cli::commands::handle_completions(shell);
        return Ok(());
    }

    let ctx = AppContext::new(load_config()?)?;
    let target = cli.repo.as_deref();

    match cli.command {
        Commands::Auth { command } => match command {
            AuthCommands::Login { no_browser } => auth::handle_login(&ctx, no_browser).await,
            AuthCommands::Logout => auth::handle_logout(&ctx).await,
            AuthCommands::Status => auth::handle_status(&ctx).await,
        },
        Commands::Repo { command } => match command {
            RepoCommands::Add { path } => repo::handle_add(&ctx, &path).await,
            RepoCommands::List => repo::handle_list(&ctx),
            RepoCommands::Use { path } => repo::handle_use(&ctx, &path),
            RepoCommands::Remove { path } => repo::handle_remove(&ctx, &path),
            RepoCommands::Clone { url, destination } => {
                repo::handle_clone(&ctx, &url, &destination).await
            },
            RepoCommands::Github => repo::handle_github(&ctx).await,
        },
        Commands::Branch { command } => match command {
            BranchCommands::List => branch::handle_list(&ctx, target).await,
            BranchCommands::Create { name } => branch::handle_create(&ctx, target, &name).await,
            BranchCommands::Checkout { name } => {
                branch::handle_checkout(&ctx, target, &name).await
            },
            BranchCommands::Analyze { source, target: into } => {
                branch::handle_analyze(&ctx, target, &source, &into).await
            },
            BranchCommands::Merge { source, target: into } => {
                branch::handle_merge(&ctx, target, &source, &into).await
            },
        },
        Commands::Status => changes::handle_status(&ctx, target).await,
        Commands::Diff { path } => changes::handle_diff(&ctx, target, &path).await,
        Commands::Stage(selection) => {
            changes::handle_stage(&ctx, target, selection.path.as_deref()).await
        },
        Commands::Unstage(selection) => {
            changes::handle_unstage(&ctx, target, selection.path.as_deref()).await
        },
        Commands::Commit { message } => changes::handle_commit(&ctx, target, &message).await,
        Commands::Log { count } => changes::handle_log(&ctx, target, count).await,
        Commands::Show { commit, path } => {
            changes::handle_show(&ctx, target, &commit, path.as_deref()).await
        },
        Commands::Fetch => remote::handle_fetch(&ctx, target).await,
        Commands::Push { no_fetch } => remote::handle_push(&ctx, target, no_fetch).await,
        Commands::Completions { .. } => Ok(()),
    }
}
