//! augury-core - Core library for Augury
//!
//! This crate provides the shared building blocks used by the memory engine
//! (`augury-sdk`) and the `augury` CLI:
//!
//! - **types**: Persisted record shapes (messages, reflections, plans, reference samples)
//! - **db**: Direct SQLite access with store-side vector scoring
//! - **cache**: Key-value cache collaborator (in-process or Redis)

pub mod cache;
#[cfg(feature = "db")]
pub mod db;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use cache::{KvCache, MemoryCache};
#[cfg(feature = "db")]
pub use db::Database;
pub use error::{Error, Result};
pub use types::*;
