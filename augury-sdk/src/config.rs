//! Engine Configuration
//!
//! Defines tuning knobs for scoring, retrieval, caching, sessions, and LLM
//! dispatch. Every section deserializes with defaults so a partial TOML
//! file is enough.

use augury_core::ScoreWeights;
use serde::{Deserialize, Serialize};

/// Memory engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Importance scoring configuration
    pub scoring: ScoringConfig,

    /// Combined-score retrieval configuration
    pub retrieval: RetrievalConfig,

    /// Hot cache configuration
    pub cache: CacheConfig,

    /// Session lifecycle configuration
    pub session: SessionConfig,

    /// LLM dispatch configuration
    pub llm: LlmConfig,
}

/// Importance scorer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Reference samples fetched per lookup (default: 10)
    pub top_k: usize,

    /// Minimum cosine similarity for a reference sample to count (default: 0.6)
    pub similarity_threshold: f64,

    /// Weight of neighbor similarity in the per-neighbor score (default: 0.7)
    pub similarity_weight: f64,

    /// Weight of the neighbor's label / 10 (default: 0.3)
    pub label_weight: f64,

    /// Ask the LLM for a rating when no reference sample matches (default: true)
    pub llm_fallback: bool,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            similarity_threshold: 0.6,
            similarity_weight: 0.7,
            label_weight: 0.3,
            llm_fallback: true,
        }
    }
}

/// Retriever configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Weight of cosine similarity (default: 0.4)
    pub similarity_weight: f64,

    /// Weight of importance / 10 (default: 0.4)
    pub importance_weight: f64,

    /// Weight of exponential recency (default: 0.2)
    pub recency_weight: f64,

    /// Recency decay constant in days (default: 90)
    pub recency_days: f64,

    /// Messages injected into each prompt (default: 5)
    pub top_k: usize,

    /// Reflections injected into each prompt (default: 3)
    pub reflection_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_weight: 0.4,
            importance_weight: 0.4,
            recency_weight: 0.2,
            recency_days: 90.0,
            top_k: 5,
            reflection_top_k: 3,
        }
    }
}

impl RetrievalConfig {
    /// Weights in the shape the store consumes
    pub fn weights(&self) -> ScoreWeights {
        ScoreWeights {
            similarity: self.similarity_weight,
            importance: self.importance_weight,
            recency: self.recency_weight,
            recency_days: self.recency_days,
        }
    }
}

/// Hot cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Turns kept per session (default: 10)
    pub hot_cache_size: usize,

    /// Key time-to-live in seconds, refreshed on every push (default: 86400 = 1 day)
    pub ttl_secs: u64,

    /// Prefix for every cache key (default: "augury")
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            hot_cache_size: 10,
            ttl_secs: 86_400, // 1 day
            key_prefix: "augury".to_string(),
        }
    }
}

/// Session lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Inactivity window before a session expires, in seconds (default: 3600 = 1 hour)
    pub inactivity_secs: u64,

    /// Cumulative importance that triggers synthesis (default: 10.0)
    pub importance_threshold: f64,

    /// Recent reflections fed into plan synthesis (default: 5)
    pub reflection_window: usize,

    /// Interval of the background expiry sweep, in seconds (default: 300 = 5 minutes)
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_secs: 3600, // 1 hour
            importance_threshold: 10.0,
            reflection_window: 5,
            sweep_interval_secs: 300, // 5 minutes
        }
    }
}

/// One entry of the model fallback chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Provider model name
    pub name: String,

    /// Requests allowed per rolling minute
    pub rpm: u32,
}

impl ModelSpec {
    pub fn new(name: impl Into<String>, rpm: u32) -> Self {
        Self {
            name: name.into(),
            rpm,
        }
    }
}

/// LLM dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Ordered fallback chain
    pub models: Vec<ModelSpec>,

    /// Environment variable holding the provider API key (default: "GEMINI_API_KEY")
    pub api_key_env: String,

    /// Provider base URL
    pub base_url: String,

    /// Per-request timeout in seconds (default: 120)
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            models: vec![
                ModelSpec::new("gemini-2.0-flash", 15),
                ModelSpec::new("gemini-2.0-flash-lite", 30),
                ModelSpec::new("gemini-1.5-flash-latest", 15),
                ModelSpec::new("gemini-1.5-pro-latest", 2),
            ],
            api_key_env: "GEMINI_API_KEY".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_secs: 120,
        }
    }
}

impl EngineConfig {
    /// Set scoring configuration
    pub fn with_scoring(mut self, scoring: ScoringConfig) -> Self {
        self.scoring = scoring;
        self
    }

    /// Set retrieval configuration
    pub fn with_retrieval(mut self, retrieval: RetrievalConfig) -> Self {
        self.retrieval = retrieval;
        self
    }

    /// Set cache configuration
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Set session configuration
    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Set LLM configuration
    pub fn with_llm(mut self, llm: LlmConfig) -> Self {
        self.llm = llm;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let unit = |field: &str, value: f64| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ConfigValidationError::invalid(field, "must be between 0 and 1"))
            }
        };

        unit("scoring.similarity_threshold", self.scoring.similarity_threshold)?;
        if self.scoring.top_k == 0 {
            return Err(ConfigValidationError::invalid(
                "scoring.top_k",
                "must be greater than 0",
            ));
        }

        let r = &self.retrieval;
        for (field, weight) in [
            ("retrieval.similarity_weight", r.similarity_weight),
            ("retrieval.importance_weight", r.importance_weight),
            ("retrieval.recency_weight", r.recency_weight),
        ] {
            if weight < 0.0 {
                return Err(ConfigValidationError::invalid(field, "must not be negative"));
            }
        }
        if r.similarity_weight + r.importance_weight + r.recency_weight <= 0.0 {
            return Err(ConfigValidationError::invalid(
                "retrieval",
                "at least one weight must be positive",
            ));
        }
        if r.recency_days <= 0.0 {
            return Err(ConfigValidationError::invalid(
                "retrieval.recency_days",
                "must be greater than 0",
            ));
        }

        if self.cache.hot_cache_size == 0 {
            return Err(ConfigValidationError::invalid(
                "cache.hot_cache_size",
                "must be greater than 0",
            ));
        }
        if self.cache.key_prefix.is_empty() {
            return Err(ConfigValidationError::invalid(
                "cache.key_prefix",
                "must not be empty",
            ));
        }

        if self.session.inactivity_secs == 0 {
            return Err(ConfigValidationError::invalid(
                "session.inactivity_secs",
                "must be greater than 0",
            ));
        }
        if self.session.importance_threshold <= 0.0 {
            return Err(ConfigValidationError::invalid(
                "session.importance_threshold",
                "must be greater than 0",
            ));
        }

        if self.llm.models.is_empty() {
            return Err(ConfigValidationError::invalid(
                "llm.models",
                "at least one model is required",
            ));
        }
        if let Some(model) = self.llm.models.iter().find(|m| m.rpm == 0) {
            return Err(ConfigValidationError::invalid(
                "llm.models",
                format!("{} must allow at least one request per minute", model.name),
            ));
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigValidationError {
    fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}
