//! augury - memory-augmented chat CLI
//!
//! Seeds the importance reference corpus, runs interactive tarot,
//! counsellor, and bagua sessions, and inspects long-term memory.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cli;
mod commands;
mod config;
mod runtime;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::from_default_env()
        .add_directive("augury=info".parse()?)
        .add_directive("augury_sdk=info".parse()?)
        .add_directive("augury_core=info".parse()?);
    let registry = tracing_subscriber::registry().with(filter);
    if cli.json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }

    // Load configuration
    let config = config::Config::load()?;

    // Execute command
    match cli.command {
        Commands::SeedSamples { file } => commands::seed::execute(&file, &config).await,
        Commands::Chat(args) => commands::chat::execute(args, &config).await,
        Commands::Session(cmd) => commands::session::execute(cmd, &config).await,
        Commands::Memory(cmd) => commands::memory::execute(cmd, &config).await,
        Commands::Version => {
            println!("augury {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
