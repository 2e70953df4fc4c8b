//! SDK Error Types
//!
//! The first five variants mirror how a chat turn degrades: validation
//! rejects the turn, everything else is isolated to its own sub-step.

use thiserror::Error;

/// SDK Result type alias
pub type SDKResult<T> = Result<T, SDKError>;

/// SDK errors
#[derive(Debug, Error)]
pub enum SDKError {
    /// Empty or invalid user input; the turn is rejected with no side effects
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Embedding or vector store unavailable
    #[error("retrieval error: {message}")]
    Retrieval { message: String },

    /// Importance could not be scored
    #[error("scoring error: {message}")]
    Scoring { message: String },

    /// Write failed after the response was produced
    #[error("persistence error: {message}")]
    Persistence { message: String },

    /// Reflection or plan generation failed
    #[error("synthesis error: {message}")]
    Synthesis { message: String },

    /// LLM dispatch failed on every configured model
    #[error("llm error: {message}")]
    Llm { message: String },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigValidationError),

    /// Persistence or cache collaborator error
    #[error("core error: {0}")]
    Core(#[from] augury_core::Error),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Entry not found
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl SDKError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a retrieval error
    pub fn retrieval(message: impl Into<String>) -> Self {
        Self::Retrieval {
            message: message.into(),
        }
    }

    /// Create a scoring error
    pub fn scoring(message: impl Into<String>) -> Self {
        Self::Scoring {
            message: message.into(),
        }
    }

    /// Create a persistence error
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    /// Create a synthesis error
    pub fn synthesis(message: impl Into<String>) -> Self {
        Self::Synthesis {
            message: message.into(),
        }
    }

    /// Create an LLM error
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Check if this error rejects a turn outright
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Check if this error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = SDKError::validation("empty message");
        assert!(err.is_validation());
        assert!(err.to_string().contains("empty message"));

        let err = SDKError::not_found("Session", "s1");
        assert!(err.is_not_found());
        assert!(!err.is_validation());
        assert!(err.to_string().contains("Session"));

        let err: SDKError = augury_core::Error::cache("down").into();
        assert!(err.to_string().contains("down"));
    }
}
