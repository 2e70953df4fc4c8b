//! Collaborator wiring for CLI commands.
//!
//! Commands that only touch the store and the embedder (seeding, search,
//! inspection) open those directly; chat and session commands build the
//! full engine, which also needs the LLM provider key.

use anyhow::{Context, Result};
use augury_core::{Database, KvCache, MemoryCache};
use augury_sdk::llm::GeminiProvider;
use augury_sdk::memory::{EmbeddingService, FastEmbedder};
use augury_sdk::session::MemorySessionStore;
use augury_sdk::{Collaborators, ConversationEngine};
use std::sync::Arc;

use crate::config::Config;

/// Open (and migrate) the SQLite store
pub fn open_database(config: &Config) -> Result<Arc<Database>> {
    let path = config.database_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create data directory: {}", parent.display()))?;
    }

    let db = Database::open_path(&path)
        .with_context(|| format!("Failed to open database: {}", path.display()))?;
    tracing::debug!(path = %path.display(), "database opened");
    Ok(Arc::new(db))
}

/// Local sentence embedder
pub fn embeddings() -> EmbeddingService {
    EmbeddingService::new(Arc::new(FastEmbedder::new()))
}

/// Redis when configured and compiled in, otherwise the in-process cache
pub async fn open_cache(config: &Config) -> Result<Arc<dyn KvCache>> {
    match config.redis.url.as_deref() {
        #[cfg(feature = "redis")]
        Some(url) => {
            let cache = augury_core::cache::RedisCache::connect(url)
                .await
                .context("Failed to connect to Redis")?;
            Ok(Arc::new(cache))
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => {
            tracing::warn!("redis.url is set but augury was built without the redis feature; using in-process cache");
            Ok(Arc::new(MemoryCache::new()))
        }
        None => Ok(Arc::new(MemoryCache::new())),
    }
}

/// Build the conversation engine from configuration
pub async fn build_engine(config: &Config) -> Result<ConversationEngine> {
    let llm = GeminiProvider::from_config(&config.engine.llm).context("Failed to set up LLM provider")?;

    let engine = ConversationEngine::new(
        config.engine.clone(),
        Collaborators {
            db: open_database(config)?,
            embedder: Arc::new(FastEmbedder::new()),
            cache: open_cache(config).await?,
            llm: Arc::new(llm),
            sessions: Arc::new(MemorySessionStore::new()),
        },
    )
    .context("Failed to build conversation engine")?;
    Ok(engine)
}
