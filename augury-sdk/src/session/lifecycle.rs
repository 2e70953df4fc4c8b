//! Session lifecycle with memory synthesis.
//!
//! ```text
//!   ABSENT ──turn──▶ ACTIVE ──idle > inactivity──▶ EXPIRED
//!                      │  ▲
//!                      │  └── turn (refresh last_active)
//!                      └──── finalize ──────────▶ CLOSED
//! ```
//!
//! - `ensure_session`: reuse a live session or start a new one seeded with
//!   the user's active plan, finalizing an expired predecessor first
//! - `record_importance`: add a turn's score to the session counter and
//!   synthesize once it reaches the threshold
//! - `finalize`: reflect on the session, derive the next plan, and discard
//!   the session
//!
//! Callers hold the session's lock from [`SessionLifecycle::locks`] around
//! every call that takes a session id.

use super::{ChatSession, SessionLocks, SessionStore};
use crate::config::SessionConfig;
use crate::memory::{CacheEntry, EmbeddingService, HotCache, ImportanceScorer};
use crate::prompt::{system_instruction_with_plan, transcript};
use crate::request::{ChatRequest, Language, system_instruction};
use crate::synthesis::Synthesizer;
use crate::{SDKError, SDKResult};
use augury_core::{
    ChatSessionRow, Database, NewPlan, NewReflection, PlanRecord, ReflectionRecord, SessionStatus,
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of [`SessionLifecycle::ensure_session`]
#[derive(Debug, Clone)]
pub struct SessionStart {
    pub session: ChatSession,
    /// A new session was created for this turn
    pub created: bool,
    /// The expired session that was finalized to make room
    pub previous: Option<SessionEndResult>,
}

/// Records written by one synthesis pass
#[derive(Debug, Clone, Default)]
pub struct SynthesisResult {
    pub reflection: Option<ReflectionRecord>,
    pub plan: Option<PlanRecord>,
}

/// Result of ending a session
#[derive(Debug, Clone)]
pub struct SessionEndResult {
    pub session_id: String,
    pub status: SessionStatus,
    pub synthesis: SynthesisResult,
}

/// Session state machine over the store, cache, and synthesizer
pub struct SessionLifecycle {
    db: Arc<Database>,
    store: Arc<dyn SessionStore>,
    locks: SessionLocks,
    hot_cache: HotCache,
    embeddings: EmbeddingService,
    scorer: ImportanceScorer,
    synthesizer: Synthesizer,
    config: SessionConfig,
}

impl SessionLifecycle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<Database>,
        store: Arc<dyn SessionStore>,
        hot_cache: HotCache,
        embeddings: EmbeddingService,
        scorer: ImportanceScorer,
        synthesizer: Synthesizer,
        config: SessionConfig,
    ) -> Self {
        Self {
            db,
            store,
            locks: SessionLocks::new(),
            hot_cache,
            embeddings,
            scorer,
            synthesizer,
            config,
        }
    }

    pub fn locks(&self) -> &SessionLocks {
        &self.locks
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    fn inactivity(&self) -> Duration {
        Duration::seconds(self.config.inactivity_secs as i64)
    }

    /// Reuse the live session for this turn or start a new one.
    ///
    /// A session that sat idle past the inactivity window is finalized as
    /// expired before its replacement starts. Synthesis failures during that
    /// finalization are logged and do not block the turn. An active
    /// `chat_session` row with no live session (left over from a previous
    /// process) is treated the same way: resumed while fresh, finalized once
    /// stale.
    ///
    /// # Errors
    ///
    /// A turn whose user, kind, or privacy differs from the session it
    /// continues is rejected as a validation error.
    pub async fn ensure_session(&self, request: &ChatRequest) -> SDKResult<SessionStart> {
        let now = Utc::now();
        let mut previous = None;
        let mut created_at = now;

        if let Some(mut session) = self.store.get(&request.session_id).await? {
            check_continuation(&session, request)?;

            if !session.is_expired(now, self.inactivity()) {
                session.last_active = now;
                self.store.put(session.clone()).await?;
                if let Err(e) = self.db.touch_chat_session(&session.session_id) {
                    warn!(session_id = %session.session_id, "failed to touch session row: {}", e);
                }
                return Ok(SessionStart {
                    session,
                    created: false,
                    previous: None,
                });
            }

            previous = self.end_expired(session, now).await;
        } else {
            match self.db.get_chat_session(&request.session_id) {
                Ok(Some(row)) if row.user_id != request.user_id => {
                    return Err(SDKError::validation(format!(
                        "session {} belongs to another user",
                        request.session_id
                    )));
                }
                Ok(Some(row)) if row.status == SessionStatus::Active => {
                    let orphan = session_from_row(row);
                    check_continuation(&orphan, request)?;
                    if orphan.is_expired(now, self.inactivity()) {
                        previous = self.end_expired(orphan, now).await;
                    } else {
                        created_at = orphan.created_at;
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(session_id = %request.session_id, "session row lookup failed: {}", e),
            }
        }

        let plan = self
            .db
            .active_plan(&request.user_id)
            .map_err(|e| SDKError::persistence(format!("plan lookup failed: {}", e)))?;

        let session = ChatSession {
            session_id: request.session_id.clone(),
            user_id: request.user_id.clone(),
            kind: request.kind(),
            language: request.language,
            system_instruction: system_instruction_with_plan(
                request.system_instruction(),
                plan.as_ref().map(|p| p.plan_text.as_str()),
            ),
            private: request.private,
            created_at,
            last_active: now,
            turn_count: 0,
        };
        self.store.put(session.clone()).await?;

        if let Err(e) = self.db.upsert_chat_session(
            &session.session_id,
            &session.user_id,
            session.kind,
            session.private,
            None,
        ) {
            warn!(session_id = %session.session_id, "failed to mirror session row: {}", e);
        }

        let resumed = created_at != now;
        info!(
            user_id = %session.user_id,
            session_id = %session.session_id,
            kind = %session.kind,
            seeded_plan = plan.is_some(),
            resumed,
            "session started"
        );

        Ok(SessionStart {
            session,
            created: true,
            previous,
        })
    }

    async fn end_expired(&self, session: ChatSession, now: DateTime<Utc>) -> Option<SessionEndResult> {
        info!(
            user_id = %session.user_id,
            session_id = %session.session_id,
            idle_secs = (now - session.last_active).num_seconds(),
            "session expired"
        );
        let session_id = session.session_id.clone();
        match self.end_session(session, SessionStatus::Expired).await {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(session_id = %session_id, "finalizing expired session failed: {}", e);
                None
            }
        }
    }

    /// Count a completed turn against the live session
    pub async fn record_turn(&self, session_id: &str) -> SDKResult<()> {
        if let Some(mut session) = self.store.get(session_id).await? {
            session.turn_count += 1;
            session.last_active = Utc::now();
            self.store.put(session).await?;
        }
        Ok(())
    }

    /// Add a turn's importance to the session counter.
    ///
    /// Once the counter reaches the threshold, a reflection and plan are
    /// synthesized and the counter is reset to 0. A failed synthesis leaves
    /// the counter as is, so the next scored turn tries again.
    pub async fn record_importance(
        &self,
        session: &ChatSession,
        score: f64,
    ) -> SDKResult<Option<SynthesisResult>> {
        let total = self
            .hot_cache
            .add_importance(&session.user_id, &session.session_id, score)
            .await?;
        debug!(session_id = %session.session_id, score, total, "importance recorded");

        if total < self.config.importance_threshold {
            return Ok(None);
        }

        info!(
            user_id = %session.user_id,
            session_id = %session.session_id,
            total,
            "importance threshold reached"
        );
        let result = self.synthesize(session).await?;
        self.hot_cache
            .reset_importance(&session.user_id, &session.session_id)
            .await?;
        Ok(Some(result))
    }

    /// Close a session: reflect, plan, and discard it.
    ///
    /// Sessions not live in this process are finalized from their
    /// `chat_session` row.
    pub async fn finalize(&self, user_id: &str, session_id: &str) -> SDKResult<SessionEndResult> {
        let session = match self.store.get(session_id).await? {
            Some(session) => session,
            None => self
                .db
                .get_chat_session(session_id)
                .map_err(|e| SDKError::persistence(format!("session lookup failed: {}", e)))?
                .filter(|row| row.status == SessionStatus::Active)
                .map(session_from_row)
                .ok_or_else(|| SDKError::not_found("session", session_id))?,
        };

        if session.user_id != user_id {
            return Err(SDKError::not_found("session", session_id));
        }

        self.end_session(session, SessionStatus::Closed).await
    }

    /// Finalize every session idle past the inactivity window.
    ///
    /// Active `chat_session` rows with no live session in the store (left
    /// over from a previous process) are swept as well.
    pub async fn sweep_expired(&self) -> SDKResult<Vec<SessionEndResult>> {
        let now = Utc::now();
        let mut candidates: Vec<String> = self
            .store
            .list_expired(now, self.inactivity())
            .await?
            .into_iter()
            .map(|session| session.session_id)
            .collect();

        let cutoff = (now - self.inactivity()).timestamp_millis();
        match self.db.stale_chat_sessions(cutoff) {
            Ok(rows) => {
                let orphans: Vec<String> = rows
                    .into_iter()
                    .map(|row| row.id)
                    .filter(|id| !candidates.contains(id))
                    .collect();
                candidates.extend(orphans);
            }
            Err(e) => warn!("stale session lookup failed: {}", e),
        }

        let mut results = Vec::new();
        for session_id in candidates {
            let guard = self.locks.acquire(&session_id).await;
            let outcome = match self.expired_session(&session_id).await {
                Ok(Some(session)) => Some(self.end_session(session, SessionStatus::Expired).await),
                Ok(None) => None,
                Err(e) => Some(Err(e)),
            };
            drop(guard);
            self.locks.prune(&session_id).await;

            match outcome {
                Some(Ok(result)) => results.push(result),
                Some(Err(e)) => warn!(session_id = %session_id, "expiry finalization failed: {}", e),
                None => {}
            }
        }

        if !results.is_empty() {
            info!(count = results.len(), "expired sessions finalized");
        }
        Ok(results)
    }

    /// Re-check expiry under the session lock; a turn may have refreshed it
    async fn expired_session(&self, session_id: &str) -> SDKResult<Option<ChatSession>> {
        let now = Utc::now();
        if let Some(session) = self.store.get(session_id).await? {
            return Ok(session.is_expired(now, self.inactivity()).then_some(session));
        }

        let row = self
            .db
            .get_chat_session(session_id)
            .map_err(|e| SDKError::persistence(format!("session lookup failed: {}", e)))?;
        Ok(row
            .filter(|row| row.status == SessionStatus::Active)
            .map(session_from_row)
            .filter(|session| session.is_expired(now, self.inactivity())))
    }

    async fn end_session(
        &self,
        session: ChatSession,
        status: SessionStatus,
    ) -> SDKResult<SessionEndResult> {
        self.store.delete(&session.session_id).await?;
        if let Err(e) = self.db.close_chat_session(&session.session_id, status) {
            warn!(session_id = %session.session_id, "failed to close session row: {}", e);
        }

        let synthesis = self.synthesize(&session).await?;
        if let Err(e) = self
            .hot_cache
            .clear(&session.user_id, &session.session_id)
            .await
        {
            warn!(session_id = %session.session_id, "failed to clear hot cache: {}", e);
        }

        info!(
            user_id = %session.user_id,
            session_id = %session.session_id,
            status = status.as_str(),
            turns = session.turn_count,
            reflected = synthesis.reflection.is_some(),
            planned = synthesis.plan.is_some(),
            "session ended"
        );

        Ok(SessionEndResult {
            session_id: session.session_id,
            status,
            synthesis,
        })
    }

    /// Reflect on the session history, then plan from recent reflections.
    ///
    /// Private sessions are never distilled into user-level memory.
    async fn synthesize(&self, session: &ChatSession) -> SDKResult<SynthesisResult> {
        if session.private {
            debug!(session_id = %session.session_id, "private session, skipping synthesis");
            return Ok(SynthesisResult::default());
        }

        let history = self.history(session).await;
        let reflection = if history.is_empty() {
            None
        } else {
            Some(self.reflect(session, &history).await?)
        };

        let reflections = self
            .db
            .recent_reflections(&session.user_id, None, self.config.reflection_window)
            .map_err(|e| SDKError::persistence(format!("reflection lookup failed: {}", e)))?;
        if reflections.is_empty() {
            return Ok(SynthesisResult {
                reflection,
                plan: None,
            });
        }

        let previous = self
            .db
            .active_plan(&session.user_id)
            .map_err(|e| SDKError::persistence(format!("plan lookup failed: {}", e)))?;
        let texts: Vec<String> = reflections.into_iter().map(|r| r.reflection_text).collect();
        let plan_text = self
            .synthesizer
            .plan(&texts, previous.as_ref().map(|p| p.plan_text.as_str()))
            .await?;

        let plan = self
            .db
            .activate_plan(&NewPlan {
                user_id: session.user_id.clone(),
                kind: session.kind,
                plan_text,
            })
            .map_err(|e| SDKError::persistence(format!("plan activation failed: {}", e)))?;

        Ok(SynthesisResult {
            reflection,
            plan: Some(plan),
        })
    }

    async fn reflect(&self, session: &ChatSession, history: &[CacheEntry]) -> SDKResult<ReflectionRecord> {
        let text = self
            .synthesizer
            .reflection(&session.user_id, &transcript(history, session.kind.speaker()))
            .await?;
        let embedding = self
            .embeddings
            .embed(&text)
            .await
            .map_err(|e| SDKError::synthesis(format!("reflection embedding failed: {}", e)))?;
        let importance = self.scorer.score_or_placeholder(&text, &embedding).await;

        self.db
            .upsert_reflection(&NewReflection {
                user_id: session.user_id.clone(),
                kind: session.kind,
                reflection_text: text,
                embedding,
                importance_score: importance,
            })
            .map_err(|e| SDKError::persistence(format!("reflection write failed: {}", e)))
    }

    /// This session's hot cache turns, falling back to persisted messages
    async fn history(&self, session: &ChatSession) -> Vec<CacheEntry> {
        let since = session.created_at.timestamp_millis();
        match self
            .hot_cache
            .read_since(&session.user_id, &session.session_id, since)
            .await
        {
            Ok(entries) if !entries.is_empty() => return entries,
            Ok(_) => {}
            Err(e) => warn!(session_id = %session.session_id, "hot cache read failed: {}", e),
        }

        match self.db.recent_messages(
            &session.user_id,
            &session.session_id,
            since,
            self.hot_cache.capacity(),
        ) {
            Ok(messages) => messages.into_iter().map(CacheEntry::from).collect(),
            Err(e) => {
                warn!(session_id = %session.session_id, "message history read failed: {}", e);
                Vec::new()
            }
        }
    }
}

/// A turn continuing `session` must match its owner, kind, and privacy
fn check_continuation(session: &ChatSession, request: &ChatRequest) -> SDKResult<()> {
    if session.user_id != request.user_id {
        return Err(SDKError::validation(format!(
            "session {} belongs to another user",
            request.session_id
        )));
    }
    if session.kind != request.kind() {
        return Err(SDKError::validation(format!(
            "session {} is a {} session",
            request.session_id, session.kind
        )));
    }
    if session.private != request.private {
        let expected = if session.private { "private" } else { "public" };
        return Err(SDKError::validation(format!(
            "session {} only accepts {} turns",
            request.session_id, expected
        )));
    }
    Ok(())
}

fn session_from_row(row: ChatSessionRow) -> ChatSession {
    let at = |ms: i64| DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_else(Utc::now);
    ChatSession {
        system_instruction: system_instruction(row.kind, Language::default()).to_string(),
        session_id: row.id,
        user_id: row.user_id,
        kind: row.kind,
        language: Language::default(),
        private: row.private,
        created_at: at(row.created_at),
        last_active: at(row.last_activity_at),
        turn_count: 0,
    }
}
