//! Embedding Service
//!
//! Turns text into fixed-length unit vectors. The [`Embedder`] trait is the
//! collaborator seam; [`FastEmbedder`] runs all-MiniLM-L6-v2 locally through
//! `fastembed` (384 dimensions, `embeddings` feature).
//!
//! [`EmbeddingService`] wraps any embedder and enforces the contract the
//! rest of the engine relies on: empty input is rejected, the dimension is
//! fixed, and the output is unit-normalized.
//!
//! # Usage
//!
//! ```ignore
//! use augury_sdk::memory::embeddings::{EmbeddingService, FastEmbedder};
//!
//! let service = EmbeddingService::new(Arc::new(FastEmbedder::new()));
//! let vector = service.embed("I feel anxious").await?;
//! assert_eq!(vector.len(), 384);
//! ```

use crate::{SDKError, SDKResult};
use async_trait::async_trait;
use std::sync::Arc;

pub use augury_core::EMBEDDING_DIMENSIONS;

/// Text embedding collaborator
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed one non-empty text
    async fn embed(&self, text: &str) -> SDKResult<Vec<f32>>;

    /// Output dimensionality
    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }
}

/// Reject empty and whitespace-only text
pub fn validate_text(text: &str) -> SDKResult<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(SDKError::validation("text must not be empty"));
    }
    Ok(trimmed)
}

/// Scale a vector to unit length in place (zero vectors are left as-is)
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
}

/// Contract-enforcing wrapper around an [`Embedder`]
#[derive(Clone)]
pub struct EmbeddingService {
    embedder: Arc<dyn Embedder>,
}

impl EmbeddingService {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    /// Embed text into a unit vector of [`Self::dimensions`] entries
    pub async fn embed(&self, text: &str) -> SDKResult<Vec<f32>> {
        let text = validate_text(text)?;
        let mut vector = self.embedder.embed(text).await?;

        if vector.len() != self.dimensions() {
            return Err(SDKError::retrieval(format!(
                "embedder returned {} dimensions, expected {}",
                vector.len(),
                self.dimensions()
            )));
        }

        normalize(&mut vector);
        Ok(vector)
    }

    /// Embed several texts; fails on the first invalid one
    pub async fn embed_batch(&self, texts: &[&str]) -> SDKResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    pub fn dimensions(&self) -> usize {
        self.embedder.dimensions()
    }
}

/// Local all-MiniLM-L6-v2 embedder
#[cfg(feature = "embeddings")]
pub struct FastEmbedder {
    model: Arc<tokio::sync::RwLock<Option<fastembed::TextEmbedding>>>,
}

#[cfg(not(feature = "embeddings"))]
pub struct FastEmbedder {
    _phantom: std::marker::PhantomData<()>,
}

impl Default for FastEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "embeddings")]
impl FastEmbedder {
    pub fn new() -> Self {
        Self {
            model: Arc::new(tokio::sync::RwLock::new(None)),
        }
    }

    /// Load the model on first use
    async fn ensure_model(&self) -> SDKResult<()> {
        use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

        if self.model.read().await.is_some() {
            return Ok(());
        }

        let mut model_guard = self.model.write().await;
        if model_guard.is_some() {
            return Ok(());
        }

        tracing::info!("Loading embedding model: all-MiniLM-L6-v2");
        let start = std::time::Instant::now();

        let mut init_options = InitOptions::default();
        init_options.model_name = EmbeddingModel::AllMiniLML6V2;
        init_options.show_download_progress = false;

        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| SDKError::retrieval(format!("Failed to load embedding model: {}", e)))?;

        tracing::info!("Embedding model loaded in {:?}", start.elapsed());
        *model_guard = Some(model);
        Ok(())
    }

    /// Check if the model is loaded
    pub async fn is_loaded(&self) -> bool {
        self.model.read().await.is_some()
    }
}

#[cfg(feature = "embeddings")]
#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed(&self, text: &str) -> SDKResult<Vec<f32>> {
        self.ensure_model().await?;

        let model_guard = self.model.read().await;
        let model = model_guard
            .as_ref()
            .ok_or_else(|| SDKError::retrieval("Embedding model not initialized"))?;

        model
            .embed(vec![text], None)
            .map_err(|e| SDKError::retrieval(format!("Failed to generate embedding: {}", e)))?
            .into_iter()
            .next()
            .ok_or_else(|| SDKError::retrieval("No embedding generated"))
    }
}

#[cfg(not(feature = "embeddings"))]
impl FastEmbedder {
    /// Create the embedder (no-op without embeddings feature)
    pub fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }

    pub async fn is_loaded(&self) -> bool {
        false
    }
}

#[cfg(not(feature = "embeddings"))]
#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed(&self, _text: &str) -> SDKResult<Vec<f32>> {
        Err(SDKError::retrieval(
            "Embeddings feature not enabled. Compile with --features embeddings",
        ))
    }
}
