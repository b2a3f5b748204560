//! Remote operation command handlers.
//!
//! - [`handle_fetch`] - Fetch from the configured remote (`gitdeck fetch`)
//! - [`handle_push`] - Push the checked-out branch (`gitdeck push`)

use std::future::Future;
use std::io::Write;
use std::path::Path;

use gitdeck::sync::{OperationKind, ProgressUpdate};
use gitdeck::{AppContext, Result};

/// Drives `operation` while printing progress of `kinds` on `repository`.
pub async fn with_progress<T, F>(
    ctx: &AppContext,
    repository: &Path,
    kinds: &[OperationKind],
    operation: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let mut subscriptions: Vec<_> = kinds
        .iter()
        .map(|kind| ctx.orchestrator.subscribe(repository, *kind))
        .collect();
    tokio::pin!(operation);

    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(100));
    let result = loop {
        tokio::select! {
            result = &mut operation => break result,
            _ = ticker.tick() => {
                for subscription in &mut subscriptions {
                    for update in subscription.drain() {
                        print_progress(&update);
                    }
                }
            }
        }
    };
    for subscription in &mut subscriptions {
        for update in subscription.drain() {
            print_progress(&update);
        }
    }
    println!();
    result
}

fn print_progress(update: &ProgressUpdate) {
    print!(
        "\r  {:<6} {:<20} {:>3}%",
        update.operation.to_string(),
        update.phase,
        update.value
    );
    let _ = std::io::stdout().flush();
}

/// Handles the `gitdeck fetch` command.
pub async fn handle_fetch(ctx: &AppContext, repo: Option<&Path>) -> Result<()> {
    let repository = ctx.registry.resolve(repo)?;
    let credentials = ctx.remote_credentials()?;
    println!("Fetching {}...", ctx.config.sync.remote_name);

    with_progress(
        ctx,
        &repository,
        &[OperationKind::Fetch],
        ctx.orchestrator.fetch(Some(&repository), &credentials),
    )
    .await?;

    println!("Fetch complete.");
    Ok(())
}

/// Handles the `gitdeck push` command.
pub async fn handle_push(ctx: &AppContext, repo: Option<&Path>, no_fetch: bool) -> Result<()> {
    let repository = ctx.registry.resolve(repo)?;
    let credentials = ctx.remote_credentials()?;
    let fetch_first = ctx.config.sync.fetch_before_push && !no_fetch;

    let result = with_progress(
        ctx,
        &repository,
        &[OperationKind::Fetch, OperationKind::Push],
        ctx.orchestrator
            .push(Some(&repository), &credentials, fetch_first),
    )
    .await?;

    println!("Pushed {} to {}.", result.branch_name, result.remote_name);
    if result.set_upstream {
        println!(
            "Branch '{}' now tracks '{}/{}'.",
            result.branch_name, result.remote_name, result.branch_name
        );
    }
    Ok(())
}
