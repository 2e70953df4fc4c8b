//! Session commands: finalize and expiry sweep.
//!
//! Both work from the `chat_session` rows, so they reach sessions that were
//! started by another process.

use anyhow::{Context, Result};
use colored::Colorize;

use crate::cli::{SessionAction, SessionCommand};
use crate::commands::print_session_end;
use crate::config::Config;
use crate::runtime::build_engine;

/// Execute session command.
pub async fn execute(cmd: SessionCommand, config: &Config) -> Result<()> {
    match cmd.action {
        SessionAction::Finalize { user, session } => finalize(&user, &session, config).await,
        SessionAction::Sweep => sweep(config).await,
    }
}

async fn finalize(user_id: &str, session_id: &str, config: &Config) -> Result<()> {
    let engine = build_engine(config).await?;
    let result = engine
        .finalize(user_id, session_id)
        .await
        .with_context(|| format!("Failed to finalize session {}", session_id))?;
    print_session_end(&result);
    Ok(())
}

async fn sweep(config: &Config) -> Result<()> {
    let engine = build_engine(config).await?;
    let ended = engine
        .sweep_expired()
        .await
        .context("Expiry sweep failed")?;

    if ended.is_empty() {
        println!("{} No expired sessions", "✓".green());
        return Ok(());
    }

    println!("{} Finalized {} expired sessions:", "✓".green(), ended.len());
    println!();
    for result in &ended {
        print_session_end(result);
    }
    Ok(())
}
