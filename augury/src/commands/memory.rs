//! Long-term memory inspection.
//!
//! Uses augury-core Database directly; only `search` loads the embedder.
//! No LLM key is needed for any of these commands.

use anyhow::{Context, Result, bail};
use augury_core::{ChatKind, Database, ScoredRecord};
use augury_sdk::memory::{RetrievalScope, Retriever};
use chrono::{DateTime, Utc};
use colored::Colorize;

use crate::cli::{KindArg, MemoryAction, MemoryCommand};
use crate::config::Config;
use crate::runtime::{embeddings, open_database};

/// Execute memory command.
pub async fn execute(cmd: MemoryCommand, config: &Config) -> Result<()> {
    match cmd.action {
        MemoryAction::Search {
            user,
            text,
            kind,
            reflections,
            private,
            limit,
        } => search(&user, &text, kind, reflections, private, limit, config).await,

        MemoryAction::Reflections { user, kind, limit } => list_reflections(&user, kind, limit, config),

        MemoryAction::Plan { user, history } => plan(&user, history, config),

        MemoryAction::Prompt { user, kind, text } => set_prompt(&user, kind.into(), &text, config),

        MemoryAction::Stats { user } => stats(&user, config),
    }
}

/// Rank stored records against a query.
async fn search(
    user_id: &str,
    text: &str,
    kind: Option<KindArg>,
    reflections: bool,
    private: bool,
    limit: usize,
    config: &Config,
) -> Result<()> {
    if text.trim().is_empty() {
        bail!("Query text must not be empty");
    }

    let db = open_database(config)?;
    let embeddings = embeddings();
    let embedding = embeddings.embed(text).await.context("Failed to embed query")?;
    let retriever = Retriever::new(db, embeddings, config.engine.retrieval.weights());

    let mut scope = if reflections {
        RetrievalScope::reflections(user_id)
    } else {
        RetrievalScope::messages(user_id)
    };
    if !private && !reflections {
        scope = scope.with_private(false);
    }
    if let Some(kind) = kind {
        scope = scope.of_kind(kind.into());
    }

    let records = retriever.retrieve_embedded(&embedding, &scope, limit, None);
    if records.is_empty() {
        println!("{} No memories found matching criteria", "⚠".yellow());
        return Ok(());
    }

    println!("{} Found {} memories:", "✓".green(), records.len());
    println!();
    for (i, record) in records.iter().enumerate() {
        print_scored(i + 1, record);
    }
    Ok(())
}

fn print_scored(index: usize, record: &ScoredRecord) {
    println!(
        "{}. [{}] {} {}",
        index,
        format!("{:.3}", record.combined_score).cyan(),
        record.record_kind.as_str().dimmed(),
        timestamp(record.created_at).dimmed()
    );
    println!("   {}", record.text);
    if let Some(response) = &record.response_text {
        println!("   {} {}", "→".dimmed(), truncate(response, 160));
    }
    println!(
        "   similarity {:.3}, importance {}",
        record.similarity,
        importance(record.importance_score)
    );
    println!();
}

/// List recent reflections.
fn list_reflections(user_id: &str, kind: Option<KindArg>, limit: usize, config: &Config) -> Result<()> {
    let db = open_database(config)?;
    let reflections = db
        .recent_reflections(user_id, kind.map(ChatKind::from), limit)
        .context("Failed to list reflections")?;

    if reflections.is_empty() {
        println!("{} No reflections for user {}", "⚠".yellow(), user_id);
        return Ok(());
    }

    println!("{} {} reflections:", "✓".green(), reflections.len());
    println!();
    for reflection in &reflections {
        println!(
            "{} {} (importance {})",
            reflection.kind.as_str().cyan(),
            timestamp(reflection.updated_at).dimmed(),
            importance(reflection.importance_score)
        );
        println!("   {}", reflection.reflection_text);
        println!();
    }
    Ok(())
}

/// Show the active plan and recent history.
fn plan(user_id: &str, history: usize, config: &Config) -> Result<()> {
    let db = open_database(config)?;

    match db.active_plan(user_id).context("Failed to load active plan")? {
        Some(plan) => {
            println!(
                "{} Active plan ({}, {})",
                "✓".green(),
                plan.kind.as_str().cyan(),
                timestamp(plan.created_at).dimmed()
            );
            println!("{}", plan.plan_text);
        }
        None => println!("{} No active plan for user {}", "⚠".yellow(), user_id),
    }

    if history > 0 {
        let plans = db
            .list_plans(user_id, history)
            .context("Failed to list plans")?;
        println!();
        println!("{}", "History:".bold());
        for plan in plans.iter().filter(|plan| !plan.active) {
            println!("  {} {}", timestamp(plan.created_at).dimmed(), truncate(&plan.plan_text, 120));
        }
    }
    Ok(())
}

/// Store a custom prompt for a chat kind.
fn set_prompt(user_id: &str, kind: ChatKind, text: &str, config: &Config) -> Result<()> {
    if text.trim().is_empty() {
        bail!("Prompt text must not be empty");
    }

    let db = open_database(config)?;
    let prompt = db
        .set_user_prompt(user_id, kind, text.trim())
        .context("Failed to store prompt")?;

    println!(
        "{} Custom {} prompt set for user {}",
        "✓".green(),
        kind.as_str().cyan(),
        user_id
    );
    println!("  ID: {}", prompt.id);
    Ok(())
}

/// Show storage statistics.
fn stats(user_id: &str, config: &Config) -> Result<()> {
    let db = open_database(config)?;
    print_stats(&db, user_id)
}

fn print_stats(db: &Database, user_id: &str) -> Result<()> {
    let messages = db.count_messages(user_id)?;
    let reflections = db.recent_reflections(user_id, None, 16)?.len();
    let has_plan = db.active_plan(user_id)?.is_some();

    println!("{}", format!("Memory for user {}", user_id).bold());
    println!("  Messages: {}", messages);
    println!("  Reflections: {}", reflections);
    println!("  Active plan: {}", if has_plan { "yes".green() } else { "no".dimmed() });
    println!("  Reference corpus: {}", db.count_reference_samples()?);
    Ok(())
}

fn importance(score: Option<f64>) -> String {
    score.map_or_else(|| "unscored".to_string(), |score| format!("{:.2}", score))
}

fn timestamp(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}…", cut)
    }
}
