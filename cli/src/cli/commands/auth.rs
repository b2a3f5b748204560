//! Authentication command handlers.

use gitdeck::auth::login;
use gitdeck::{AppContext, Result};

/// Handle the `gitdeck auth login` command.
pub async fn handle_login(ctx: &AppContext, no_browser: bool) -> Result<()> {
    println!("Logging in to GitHub...");
    println!();

    let sequencer = ctx.login()?;
    let flow = login(sequencer, &ctx.credentials, !no_browser, |authorization, opened| {
        println!("To authenticate, please visit:");
        println!();
        println!("  {}", authorization.verification_uri);
        println!();
        println!("And enter code: {}", authorization.user_code);
        println!();
        if !no_browser {
            if opened {
                println!("Browser opened automatically.");
            } else {
                println!("Could not open browser. Please visit the URL manually.");
            }
            println!();
        }
        println!("Waiting for authorization... (Ctrl+C to cancel)");
    });

    let token = tokio::select! {
        result = flow => result?,
        _ = tokio::signal::ctrl_c() => {
            sequencer.cancel();
            println!();
            println!("Login cancelled.");
            return Ok(());
        }
    };

    println!();
    println!("Successfully logged in.");
    if let Some(scope) = &token.scope {
        println!("  Scopes: {scope}");
    }
    Ok(())
}

/// Handle the `gitdeck auth logout` command.
pub async fn handle_logout(ctx: &AppContext) -> Result<()> {
    // A corrupted token still gets deleted.
    let signed_in = ctx.credentials.get().map_or(true, |token| token.is_some());
    ctx.credentials.delete()?;

    if signed_in {
        println!("Successfully logged out.");
    } else {
        println!("Not currently logged in.");
    }
    Ok(())
}

/// Handle the `gitdeck auth status` command.
pub async fn handle_status(ctx: &AppContext) -> Result<()> {
    match ctx.credentials.get()? {
        Some(token) => {
            println!("Logged in");
            println!();
            println!("  API Server: {}", ctx.config.github.api_url);
            println!("  Since:      {}", token.obtained_at.format("%Y-%m-%d %H:%M UTC"));
            if !token.scopes().is_empty() {
                println!("  Scopes:     {}", token.scopes().join(", "));
            }
        },
        None => {
            println!("Not logged in");
            println!();
            println!("Run 'gitdeck auth login' to authenticate.");
        },
    }
    Ok(())
}
