//! Error types for augury-core.

use thiserror::Error;

/// Result type alias using augury-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for persistence and cache operations
#[derive(Error, Debug)]
pub enum Error {
    // Database errors
    #[cfg(feature = "db")]
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    // Cache errors
    #[error("Cache error: {0}")]
    Cache(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a not found error
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Create a cache error
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache(message.into())
    }

    /// Check if this error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Self::Cache(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::not_found("Plan", "abc");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Plan not found: abc");

        let err = Error::cache("WRONGTYPE");
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("WRONGTYPE"));
    }
}
