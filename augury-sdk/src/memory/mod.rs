//! Conversational memory.
//!
//! Leaves first:
//!
//! - **embeddings**: text → unit vector, with input validation
//! - **importance**: reference-corpus importance scoring with LLM fallback
//! - **retriever**: combined similarity/importance/recency ranking
//! - **hot_cache**: bounded per-session recent turns and importance counter
//! - **corpus**: reference sample seeding

pub mod corpus;
pub mod embeddings;
pub mod hot_cache;
pub mod importance;
pub mod retriever;

pub use corpus::{SeedReport, SeedSample, seed_samples};
pub use embeddings::{Embedder, EmbeddingService, FastEmbedder};
pub use hot_cache::{CacheEntry, HotCache};
pub use importance::{ImportanceScore, ImportanceScorer, ScoreSource};
pub use retriever::{RetrievalScope, Retriever};
