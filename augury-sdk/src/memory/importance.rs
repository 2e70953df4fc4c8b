//! Importance Scorer
//!
//! Estimates how significant a message is, on a 0-10 scale.
//!
//! 1. Embed the text and fetch the top-K reference samples by cosine
//!    similarity.
//! 2. Keep neighbors at or above the similarity threshold and average
//!    `similarity_weight * sim + label_weight * (label / 10)` over them.
//! 3. With no qualifying neighbor, ask the LLM for a 1-10 rating with a
//!    fixed few-shot prompt and take the first integer 1-10 in the reply.
//! 4. Otherwise the message has no score.

use crate::config::ScoringConfig;
use crate::llm::LlmDispatcher;
use crate::memory::embeddings::EmbeddingService;
use crate::{SDKError, SDKResult};
use augury_core::Database;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

static RATING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([1-9]|10)\b").expect("valid regex"));

const RATING_INSTRUCTIONS: &str = "On the scale of 1 to 10, where 1 is purely mundane and 10 is \
extremely important, rate these messages. Output ONLY the numerical rating.

Message: I'm feeling good today.
Rating: 1

Message: I'm in immediate danger.
Rating: 10

Message: I think I might need to go to the hospital.
Rating: 8

";

/// Few-shot rating prompt for one message
pub fn rating_prompt(text: &str) -> String {
    format!("{}Message: {}\nRating:", RATING_INSTRUCTIONS, text)
}

/// First integer 1-10 in a free-text reply
pub fn extract_rating(reply: &str) -> Option<u8> {
    RATING_RE
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Where a score came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreSource {
    /// Mean over this many reference neighbors
    Reference { neighbors: usize },
    /// LLM few-shot rating
    Llm,
    /// Nothing usable
    Unscored,
}

/// Score with provenance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImportanceScore {
    pub value: Option<f64>,
    pub source: ScoreSource,
}

impl ImportanceScore {
    fn unscored() -> Self {
        Self {
            value: None,
            source: ScoreSource::Unscored,
        }
    }
}

/// Reference-corpus scorer with LLM fallback
#[derive(Clone)]
pub struct ImportanceScorer {
    db: Arc<Database>,
    embeddings: EmbeddingService,
    llm: LlmDispatcher,
    config: ScoringConfig,
}

impl ImportanceScorer {
    pub fn new(
        db: Arc<Database>,
        embeddings: EmbeddingService,
        llm: LlmDispatcher,
        config: ScoringConfig,
    ) -> Self {
        Self {
            db,
            embeddings,
            llm,
            config,
        }
    }

    /// Score `text`; `None` when neither the corpus nor the LLM yields a score
    pub async fn score(&self, text: &str) -> SDKResult<Option<f64>> {
        let embedding = self.embeddings.embed(text).await?;
        Ok(self.score_embedded(text, &embedding).await?.value)
    }

    /// Score text whose embedding is already known
    pub async fn score_embedded(&self, text: &str, embedding: &[f32]) -> SDKResult<ImportanceScore> {
        if let Some((value, neighbors)) = self.reference_score(embedding)? {
            debug!(neighbors, value, "scored against reference corpus");
            return Ok(ImportanceScore {
                value: Some(value),
                source: ScoreSource::Reference { neighbors },
            });
        }

        if !self.config.llm_fallback {
            return Ok(ImportanceScore::unscored());
        }

        match self.llm_rating(text).await? {
            Some(value) => Ok(ImportanceScore {
                value: Some(value),
                source: ScoreSource::Llm,
            }),
            None => Ok(ImportanceScore::unscored()),
        }
    }

    /// Like [`Self::score_embedded`] but never fails; errors become `None`
    pub async fn score_or_placeholder(&self, text: &str, embedding: &[f32]) -> Option<f64> {
        match self.score_embedded(text, embedding).await {
            Ok(score) => score.value,
            Err(e) => {
                warn!("importance scoring failed, leaving message unscored: {}", e);
                None
            }
        }
    }

    /// Mean blended score over neighbors above the threshold
    fn reference_score(&self, embedding: &[f32]) -> SDKResult<Option<(f64, usize)>> {
        let neighbors = self
            .db
            .nearest_reference_samples(embedding, self.config.top_k)
            .map_err(|e| SDKError::scoring(format!("reference lookup failed: {}", e)))?;

        let kept: Vec<f64> = neighbors
            .iter()
            .filter(|(_, similarity)| *similarity >= self.config.similarity_threshold)
            .map(|(sample, similarity)| {
                self.config.similarity_weight * similarity
                    + self.config.label_weight * (sample.label as f64 / 10.0)
            })
            .collect();

        if kept.is_empty() {
            return Ok(None);
        }

        let mean = kept.iter().sum::<f64>() / kept.len() as f64;
        Ok(Some((mean.clamp(0.0, 10.0), kept.len())))
    }

    async fn llm_rating(&self, text: &str) -> SDKResult<Option<f64>> {
        let reply = self
            .llm
            .complete(rating_prompt(text), None, None)
            .await
            .map_err(|e| SDKError::scoring(format!("LLM rating failed: {}", e)))?;

        let rating = extract_rating(&reply);
        if rating.is_none() {
            warn!(reply = %reply.trim(), "LLM rating reply had no 1-10 integer");
        }
        Ok(rating.map(f64::from))
    }
}
