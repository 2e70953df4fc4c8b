//! Augury SDK - Conversational Memory Engine
//!
//! Long-term memory for the tarot, counsellor, and bagua chat agents. Every
//! turn is embedded, scored for importance, and stored; later turns retrieve
//! the most relevant history by a blend of similarity, importance, and
//! recency. Once a session has accumulated enough importance, or when it
//! ends, the engine distills it into a reflection and a plan for the next
//! conversation.
//!
//! # Modules
//!
//! - **config** - Engine tuning knobs with validation
//! - **memory** - Embedder, importance scorer, retriever, hot cache, corpus seeding
//! - **session** - Session store, per-session locks, lifecycle state machine
//! - **synthesis** - Reflection and plan generation
//! - **llm** - Streaming LLM providers and the rate-limited fallback chain
//! - **request** - Chat requests per kind, system instructions
//! - **prompt** - Turn prompt assembly
//! - **engine** - The chat turn pipeline
//!
//! # Example
//!
//! ```rust,no_run
//! use augury_sdk::{ChatRequest, Collaborators, ConversationEngine, EngineConfig};
//! use augury_sdk::memory::FastEmbedder;
//! use augury_sdk::llm::GeminiProvider;
//! use augury_sdk::session::MemorySessionStore;
//! use augury_core::{Database, MemoryCache};
//! use futures::StreamExt;
//! use std::sync::Arc;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let config = EngineConfig::default();
//!     let engine = ConversationEngine::new(
//!         config.clone(),
//!         Collaborators {
//!             db: Arc::new(Database::open_path("augury.db")?),
//!             embedder: Arc::new(FastEmbedder::new()),
//!             cache: Arc::new(MemoryCache::new()),
//!             llm: Arc::new(GeminiProvider::from_config(&config.llm)?),
//!             sessions: Arc::new(MemorySessionStore::new()),
//!         },
//!     )?;
//!
//!     let reply: String = engine
//!         .chat_turn(ChatRequest::counsellor("7", "s1", "I feel anxious"))
//!         .await?
//!         .collect::<Vec<_>>()
//!         .await
//!         .concat();
//!     println!("{}", reply);
//!     Ok(())
//! }
//! ```

// ─────────────────────────────────────────────────────────────────────────────
// Re-export core modules from augury-core
// ─────────────────────────────────────────────────────────────────────────────

/// Core records (messages, reflections, plans, sessions)
pub use augury_core::types;

/// Key-value cache collaborator
pub use augury_core::cache;

/// Error types from core
pub use augury_core::Error as CoreError;

// ─────────────────────────────────────────────────────────────────────────────
// SDK Modules
// ─────────────────────────────────────────────────────────────────────────────

pub mod config;
pub mod engine;
pub mod error;
pub mod llm;
pub mod memory;
pub mod prompt;
pub mod request;
pub mod session;
pub mod synthesis;

#[cfg(test)]
pub(crate) mod testing;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports
// ─────────────────────────────────────────────────────────────────────────────

pub use config::EngineConfig;
pub use engine::{Collaborators, ConversationEngine, ExpirySweeper, TurnStream};
pub use error::{SDKError, SDKResult};
pub use request::{ChatBody, ChatRequest, Language, TarotCard, TarotSpread};
pub use session::{ChatSession, MemorySessionStore, SessionStore};
