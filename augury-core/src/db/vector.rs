//! Vector storage helpers.
//!
//! Embeddings are persisted as little-endian `f32` BLOBs. Similarity and the
//! combined retrieval score are computed inside SQLite by scalar functions
//! registered on every connection, so ranking, filtering and truncation all
//! happen in a single parameterized statement.
//!
//! Table and column identifiers come only from [`Table`]; every value,
//! including the query vector, is bound as a parameter.

use crate::types::{ChatKind, RecordKind, ScoreWeights, ScoredRecord};
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::{Connection, ToSql};

/// Fixed set of tables the store addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    MessageHistory,
    Reflection,
    Plan,
    ReferenceSample,
    ChatSession,
    UserPrompt,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MessageHistory => "message_history",
            Self::Reflection => "reflection",
            Self::Plan => "plan",
            Self::ReferenceSample => "reference_sample",
            Self::ChatSession => "chat_session",
            Self::UserPrompt => "user_prompt",
        }
    }

    /// Table backing a vector-searchable record kind
    pub fn for_record(kind: RecordKind) -> Self {
        match kind {
            RecordKind::Message => Self::MessageHistory,
            RecordKind::Reflection => Self::Reflection,
        }
    }

    /// Projection producing the common `ScoredRecord` column layout
    fn scored_columns(&self) -> &'static str {
        match self {
            Self::MessageHistory => {
                "id, user_id, session_id, user_text AS text, response_text, \
                 importance_score, created_at, updated_at"
            }
            _ => {
                "id, user_id, NULL AS session_id, reflection_text AS text, NULL AS response_text, \
                 importance_score, created_at, updated_at"
            }
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Encode an embedding for storage
pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a stored embedding. Trailing partial floats are ignored.
pub fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity clamped to [0, 1].
///
/// Opposed vectors count as unrelated. Mismatched lengths or zero vectors
/// yield 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0)
}

/// Register `cosine_similarity(blob, blob)` and `combined_score(...)` on a connection
pub fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    conn.create_scalar_function(
        "cosine_similarity",
        2,
        flags,
        |ctx: &Context<'_>| -> rusqlite::Result<f64> {
            let stored: Vec<u8> = ctx.get(0)?;
            let query: Vec<u8> = ctx.get(1)?;
            Ok(cosine_similarity(
                &decode_embedding(&stored),
                &decode_embedding(&query),
            ))
        },
    )?;

    // combined_score(similarity, importance, updated_at_ms, now_ms, w_sim, w_imp, w_rec, recency_days)
    conn.create_scalar_function(
        "combined_score",
        8,
        flags,
        |ctx: &Context<'_>| -> rusqlite::Result<f64> {
            let similarity: f64 = ctx.get(0)?;
            let importance: Option<f64> = ctx.get(1)?;
            let updated_at: i64 = ctx.get(2)?;
            let now: i64 = ctx.get(3)?;
            let weights = ScoreWeights {
                similarity: ctx.get(4)?,
                importance: ctx.get(5)?,
                recency: ctx.get(6)?,
                recency_days: ctx.get(7)?,
            };
            let age_secs = (now - updated_at) as f64 / 1000.0;
            Ok(weights.combine(similarity, importance, age_secs))
        },
    )?;

    Ok(())
}

/// Parameterized nearest-neighbor query over messages or reflections
#[derive(Debug, Clone)]
pub struct VectorQuery {
    pub record_kind: RecordKind,
    pub user_id: String,
    pub embedding: Vec<f32>,
    pub session_id: Option<String>,
    pub private: Option<bool>,
    pub chat_kind: Option<ChatKind>,
    pub weights: ScoreWeights,
    pub now_ms: i64,
    pub limit: usize,
}

impl VectorQuery {
    /// Create a query scoped to one user
    pub fn new(record_kind: RecordKind, user_id: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            record_kind,
            user_id: user_id.into(),
            embedding,
            session_id: None,
            private: None,
            chat_kind: None,
            weights: ScoreWeights::default(),
            now_ms: chrono::Utc::now().timestamp_millis(),
            limit: 5,
        }
    }

    /// Restrict to one session (messages only)
    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Restrict by privacy flag (messages only)
    pub fn private(mut self, private: bool) -> Self {
        self.private = Some(private);
        self
    }

    /// Restrict to one chat kind
    pub fn chat_kind(mut self, kind: ChatKind) -> Self {
        self.chat_kind = Some(kind);
        self
    }

    pub fn weights(mut self, weights: ScoreWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Reference time for the recency term
    pub fn now(mut self, now_ms: i64) -> Self {
        self.now_ms = now_ms;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Build the SQL text and its bound parameters.
    ///
    /// Anonymous `?` placeholders are bound in textual order, so parameters
    /// are pushed in the order they appear in the statement.
    pub fn build(&self) -> (String, Vec<Box<dyn ToSql>>) {
        let table = Table::for_record(self.record_kind);
        let mut params: Vec<Box<dyn ToSql>> = vec![
            Box::new(self.now_ms),
            Box::new(self.weights.similarity),
            Box::new(self.weights.importance),
            Box::new(self.weights.recency),
            Box::new(self.weights.recency_days),
            Box::new(encode_embedding(&self.embedding)),
            Box::new(self.user_id.clone()),
        ];

        // Rows stored without an embedding never rank
        let mut filters = String::from("user_id = ? AND length(embedding) > 0");
        if let Some(kind) = self.chat_kind {
            filters.push_str(" AND kind = ?");
            params.push(Box::new(kind.as_str()));
        }
        if table == Table::MessageHistory {
            if let Some(ref session_id) = self.session_id {
                filters.push_str(" AND session_id = ?");
                params.push(Box::new(session_id.clone()));
            }
            if let Some(private) = self.private {
                filters.push_str(" AND private = ?");
                params.push(Box::new(private));
            }
        }
        params.push(Box::new(self.limit as i64));

        let sql = format!(
            "SELECT id, user_id, session_id, text, response_text, importance_score,
                    created_at, updated_at, similarity,
                    combined_score(similarity, importance_score, updated_at, ?, ?, ?, ?, ?) AS score
             FROM (
                SELECT {columns}, cosine_similarity(embedding, ?) AS similarity
                FROM {table}
                WHERE {filters}
             )
             ORDER BY score DESC, updated_at DESC
             LIMIT ?",
            columns = table.scored_columns(),
            table = table.as_str(),
            filters = filters,
        );

        (sql, params)
    }

    pub(crate) fn map_row(&self, row: &rusqlite::Row) -> rusqlite::Result<ScoredRecord> {
        Ok(ScoredRecord {
            record_kind: self.record_kind,
            id: row.get(0)?,
            user_id: row.get(1)?,
            session_id: row.get(2)?,
            text: row.get(3)?,
            response_text: row.get(4)?,
            importance_score: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
            similarity: row.get(8)?,
            combined_score: row.get(9)?,
        })
    }
}
