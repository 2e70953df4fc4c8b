//! Record types shared by the store, the cache, and the memory engine.

use serde::{Deserialize, Serialize};

/// Dimensionality of every persisted embedding (all-MiniLM-L6-v2)
pub const EMBEDDING_DIMENSIONS: usize = 384;

// ─────────────────────────────────────────────────────────────────────────────
// Enums
// ─────────────────────────────────────────────────────────────────────────────

/// Chat product a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Tarot,
    Counsellor,
    Bagua,
}

impl ChatKind {
    /// Convert from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "tarot" => Some(Self::Tarot),
            "counsellor" => Some(Self::Counsellor),
            "bagua" => Some(Self::Bagua),
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tarot => "tarot",
            Self::Counsellor => "counsellor",
            Self::Bagua => "bagua",
        }
    }

    /// Speaker label used for the assistant side of a transcript
    pub fn speaker(&self) -> &'static str {
        match self {
            Self::Tarot => "Reader",
            Self::Counsellor => "Counsellor",
            Self::Bagua => "Master",
        }
    }
}

impl std::fmt::Display for ChatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of record a vector query runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Message,
    Reflection,
}

impl RecordKind {
    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Reflection => "reflection",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status mirrored into the `chat_session` table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Expired,
    Closed,
}

impl SessionStatus {
    /// Convert from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "expired" => Some(Self::Expired),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Closed => "closed",
        }
    }

    /// Expired and closed sessions never become active again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entity Types
// ─────────────────────────────────────────────────────────────────────────────

/// One completed chat turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub user_id: String,
    pub session_id: String,
    pub kind: ChatKind,
    pub user_text: String,
    pub response_text: String,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub importance_score: Option<f64>,
    pub private: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Rolling per-user summary of past sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionRecord {
    pub id: String,
    pub user_id: String,
    pub kind: ChatKind,
    pub reflection_text: String,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub importance_score: Option<f64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Goals and topics seeded into the next session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRecord {
    pub id: String,
    pub user_id: String,
    pub kind: ChatKind,
    pub plan_text: String,
    pub active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Labeled calibration sample for importance scoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceSample {
    pub id: i64,
    pub sample_text: String,
    pub label: u8,
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

/// Durable mirror of an in-memory chat session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSessionRow {
    pub id: String,
    pub user_id: String,
    pub kind: ChatKind,
    pub title: Option<String>,
    pub private: bool,
    pub status: SessionStatus,
    pub last_activity_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Per-user custom prompt for a chat kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPrompt {
    pub id: String,
    pub user_id: String,
    pub kind: ChatKind,
    pub prompt_text: String,
    pub created_at: i64,
}

/// A stored record ranked by a vector query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub record_kind: RecordKind,
    pub id: String,
    pub user_id: String,
    pub session_id: Option<String>,
    /// `user_text` for messages, `reflection_text` for reflections
    pub text: String,
    pub response_text: Option<String>,
    pub importance_score: Option<f64>,
    pub created_at: i64,
    pub updated_at: i64,
    /// Cosine similarity in [0, 1]
    pub similarity: f64,
    pub combined_score: f64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Input Types (for creating entities)
// ─────────────────────────────────────────────────────────────────────────────

/// Input for persisting a completed turn
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub user_id: String,
    pub session_id: String,
    pub kind: ChatKind,
    pub user_text: String,
    pub response_text: String,
    pub embedding: Vec<f32>,
    pub importance_score: Option<f64>,
    pub private: bool,
    /// Milliseconds since the epoch
    pub created_at: i64,
}

/// Input for the create-or-update of a user's latest reflection
#[derive(Debug, Clone)]
pub struct NewReflection {
    pub user_id: String,
    pub kind: ChatKind,
    pub reflection_text: String,
    pub embedding: Vec<f32>,
    pub importance_score: Option<f64>,
}

/// Input for activating a new plan
#[derive(Debug, Clone)]
pub struct NewPlan {
    pub user_id: String,
    pub kind: ChatKind,
    pub plan_text: String,
}

/// Weights of the combined retrieval score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub similarity: f64,
    pub importance: f64,
    pub recency: f64,
    /// Decay constant of the recency term, in days
    pub recency_days: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            similarity: 0.4,
            importance: 0.4,
            recency: 0.2,
            recency_days: 90.0,
        }
    }
}

impl ScoreWeights {
    /// Blend similarity, importance, and recency into one ranking score.
    ///
    /// `importance` is on the 0-10 scale; a missing score contributes nothing.
    pub fn combine(&self, similarity: f64, importance: Option<f64>, age_secs: f64) -> f64 {
        let importance = importance.unwrap_or(0.0).clamp(0.0, 10.0);
        let recency = (-age_secs.max(0.0) / (86_400.0 * self.recency_days)).exp();
        self.similarity * similarity + self.importance * (importance / 10.0) + self.recency * recency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_kind_roundtrip() {
        for kind in [ChatKind::Tarot, ChatKind::Counsellor, ChatKind::Bagua] {
            assert_eq!(ChatKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(ChatKind::from_str("astrology"), None);
    }

    #[test]
    fn test_session_status_terminal() {
        assert!(!SessionStatus::Active.is_terminal());
        assert!(SessionStatus::Expired.is_terminal());
        assert!(SessionStatus::Closed.is_terminal());
    }

    #[test]
    fn test_combined_score() {
        let weights = ScoreWeights::default();

        // Perfect match, max importance, brand new
        let top = weights.combine(1.0, Some(10.0), 0.0);
        assert!((top - 1.0).abs() < 1e-9);

        // Missing importance only loses the importance term
        let no_importance = weights.combine(1.0, None, 0.0);
        assert!((no_importance - 0.6).abs() < 1e-9);

        // Recency decays with age
        let old = weights.combine(1.0, Some(10.0), 86_400.0 * 90.0);
        assert!((old - (0.8 + 0.2 * (-1.0f64).exp())).abs() < 1e-9);
    }
}
