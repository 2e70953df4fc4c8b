//! Reference corpus seeding.

use anyhow::{Context, Result};
use augury_sdk::memory::{SeedSample, seed_samples};
use colored::Colorize;
use std::path::Path;

use crate::config::Config;
use crate::runtime::{embeddings, open_database};

/// Execute seed-samples command.
pub async fn execute(file: &Path, config: &Config) -> Result<()> {
    let samples = read_samples(file)?;
    if samples.is_empty() {
        println!("{} {} contains no samples", "⚠".yellow(), file.display());
        return Ok(());
    }

    let db = open_database(config)?;
    let report = seed_samples(&db, &embeddings(), &samples)
        .await
        .context("Failed to seed reference samples")?;

    println!(
        "{} Seeded reference corpus from {}",
        "✓".green(),
        file.display()
    );
    println!("  Inserted: {}", report.inserted);
    println!("  Already present: {}", report.skipped);
    if report.rejected > 0 {
        println!(
            "  {} {} rejected (empty text or label outside 1-10)",
            "⚠".yellow(),
            report.rejected
        );
    }
    println!("  Corpus size: {}", db.count_reference_samples()?);
    Ok(())
}

fn read_samples(file: &Path) -> Result<Vec<SeedSample>> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Expected [{{\"text\": ..., \"label\": 1..10}}] in {}", file.display()))
}
