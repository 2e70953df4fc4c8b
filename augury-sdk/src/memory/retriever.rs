//! Combined-Score Retriever
//!
//! Ranks stored messages or reflections by
//!
//! ```text
//! w_sim * similarity + w_imp * (importance / 10) + w_rec * exp(-age_s / (86400 * recency_days))
//! ```
//!
//! where similarity is cosine similarity in [0, 1] (`1 - distance`). The
//! score is computed by the store; ties go to the more recent record.
//! Retrieval never fails: collaborator errors are logged and produce an
//! empty result.

use crate::memory::embeddings::EmbeddingService;
use crate::{SDKError, SDKResult};
use augury_core::db::VectorQuery;
use augury_core::{ChatKind, Database, RecordKind, ScoreWeights, ScoredRecord};
use std::sync::Arc;
use tracing::warn;

/// Filter applied to every retrieval; `user_id` is mandatory
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalScope {
    pub user_id: String,
    pub record_kind: RecordKind,
    pub session_id: Option<String>,
    pub private: Option<bool>,
    pub chat_kind: Option<ChatKind>,
}

impl RetrievalScope {
    /// Messages of one user
    pub fn messages(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            record_kind: RecordKind::Message,
            session_id: None,
            private: None,
            chat_kind: None,
        }
    }

    /// Reflections of one user
    pub fn reflections(user_id: impl Into<String>) -> Self {
        Self {
            record_kind: RecordKind::Reflection,
            ..Self::messages(user_id)
        }
    }

    pub fn in_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_private(mut self, private: bool) -> Self {
        self.private = Some(private);
        self
    }

    pub fn of_kind(mut self, kind: ChatKind) -> Self {
        self.chat_kind = Some(kind);
        self
    }
}

/// Blended similarity/importance/recency ranking over the store
#[derive(Clone)]
pub struct Retriever {
    db: Arc<Database>,
    embeddings: EmbeddingService,
    weights: ScoreWeights,
}

impl Retriever {
    pub fn new(db: Arc<Database>, embeddings: EmbeddingService, weights: ScoreWeights) -> Self {
        Self {
            db,
            embeddings,
            weights,
        }
    }

    /// Default weights used when a call passes none
    pub fn weights(&self) -> ScoreWeights {
        self.weights
    }

    /// Embed `query_text` and rank records in `scope`
    pub async fn retrieve(
        &self,
        query_text: &str,
        scope: &RetrievalScope,
        top_k: usize,
        weights: Option<ScoreWeights>,
    ) -> Vec<ScoredRecord> {
        let embedding = match self.embeddings.embed(query_text).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(user_id = %scope.user_id, "retrieval skipped, embedding failed: {}", e);
                return Vec::new();
            }
        };
        self.retrieve_embedded(&embedding, scope, top_k, weights)
    }

    /// Rank records against an already computed query embedding
    pub fn retrieve_embedded(
        &self,
        embedding: &[f32],
        scope: &RetrievalScope,
        top_k: usize,
        weights: Option<ScoreWeights>,
    ) -> Vec<ScoredRecord> {
        match self.try_retrieve(embedding, scope, top_k, weights) {
            Ok(records) => records,
            Err(e) => {
                warn!(user_id = %scope.user_id, kind = %scope.record_kind, "retrieval failed: {}", e);
                Vec::new()
            }
        }
    }

    fn try_retrieve(
        &self,
        embedding: &[f32],
        scope: &RetrievalScope,
        top_k: usize,
        weights: Option<ScoreWeights>,
    ) -> SDKResult<Vec<ScoredRecord>> {
        if scope.user_id.trim().is_empty() {
            return Err(SDKError::retrieval("scope requires a user_id"));
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let mut query = VectorQuery::new(scope.record_kind, scope.user_id.clone(), embedding.to_vec())
            .weights(weights.unwrap_or(self.weights))
            .limit(top_k);
        if let Some(ref session_id) = scope.session_id {
            query = query.session(session_id.clone());
        }
        if let Some(private) = scope.private {
            query = query.private(private);
        }
        if let Some(kind) = scope.chat_kind {
            query = query.chat_kind(kind);
        }

        self.db
            .search(&query)
            .map_err(|e| SDKError::retrieval(format!("vector query failed: {}", e)))
    }
}
