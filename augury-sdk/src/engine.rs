//! Conversation Engine
//!
//! Ties the memory components into the chat turn pipeline:
//!
//! ```text
//! validate → lock session → ensure session → embed → score → retrieve
//!          → build prompt → stream reply → persist → hot cache → counter
//!          → maybe synthesize
//! ```
//!
//! Everything up to the prompt runs inside [`ConversationEngine::chat_turn`];
//! errors there reach the caller before any chunk is streamed. The returned
//! [`TurnStream`] owns the session lock and runs the persistence steps once
//! it has been driven to completion. A stream dropped early persists
//! nothing.
//!
//! # Example
//!
//! ```rust,no_run
//! use augury_sdk::{ChatRequest, Collaborators, ConversationEngine, EngineConfig};
//! use futures::StreamExt;
//!
//! async fn example(collaborators: Collaborators) -> anyhow::Result<()> {
//!     let engine = ConversationEngine::new(EngineConfig::default(), collaborators)?;
//!
//!     let mut reply = engine
//!         .chat_turn(ChatRequest::counsellor("7", "s1", "I feel anxious"))
//!         .await?;
//!     while let Some(chunk) = reply.next().await {
//!         print!("{}", chunk);
//!     }
//!     Ok(())
//! }
//! ```

use crate::config::EngineConfig;
use crate::llm::{EXHAUSTED_SENTINEL, LlmDispatcher, LlmProvider};
use crate::memory::{
    CacheEntry, Embedder, EmbeddingService, HotCache, ImportanceScorer, RetrievalScope, Retriever,
    SeedReport, SeedSample, seed_samples,
};
use crate::prompt::{PromptContext, build_turn_prompt};
use crate::request::ChatRequest;
use crate::session::{ChatSession, SessionEndResult, SessionLifecycle, SessionStore};
use crate::synthesis::Synthesizer;
use crate::{SDKError, SDKResult};
use augury_core::{Database, KvCache, NewMessage, ScoredRecord};
use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Reply chunks of one chat turn
pub type TurnStream = BoxStream<'static, String>;

/// External collaborators the engine runs on
#[derive(Clone)]
pub struct Collaborators {
    pub db: Arc<Database>,
    pub embedder: Arc<dyn Embedder>,
    pub cache: Arc<dyn KvCache>,
    pub llm: Arc<dyn LlmProvider>,
    pub sessions: Arc<dyn SessionStore>,
}

/// The conversational memory engine
#[derive(Clone)]
pub struct ConversationEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    db: Arc<Database>,
    embeddings: EmbeddingService,
    scorer: ImportanceScorer,
    retriever: Retriever,
    hot_cache: HotCache,
    llm: LlmDispatcher,
    lifecycle: SessionLifecycle,
}

/// State carried from prompt build to persistence
struct PendingTurn {
    session: ChatSession,
    user_text: String,
    private: bool,
    embedding: Option<Vec<f32>>,
    importance: Option<f64>,
}

/// Background expiry sweep started by [`ConversationEngine::spawn_expiry_sweeper`]
pub struct ExpirySweeper {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl ExpirySweeper {
    /// Stop the sweep and wait for it to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.handle.await {
            warn!("expiry sweeper ended abnormally: {}", e);
        }
    }
}

impl ConversationEngine {
    /// Create an engine over the given collaborators
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails.
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> SDKResult<Self> {
        config.validate()?;

        let Collaborators {
            db,
            embedder,
            cache,
            llm,
            sessions,
        } = collaborators;

        let embeddings = EmbeddingService::new(embedder);
        let llm = LlmDispatcher::new(llm, config.llm.models.clone());
        let scorer = ImportanceScorer::new(
            db.clone(),
            embeddings.clone(),
            llm.clone(),
            config.scoring.clone(),
        );
        let retriever = Retriever::new(db.clone(), embeddings.clone(), config.retrieval.weights());
        let hot_cache = HotCache::new(cache, config.cache.clone());
        let lifecycle = SessionLifecycle::new(
            db.clone(),
            sessions,
            hot_cache.clone(),
            embeddings.clone(),
            scorer.clone(),
            Synthesizer::new(llm.clone()),
            config.session.clone(),
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                db,
                embeddings,
                scorer,
                retriever,
                hot_cache,
                llm,
                lifecycle,
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.inner.db
    }

    pub fn hot_cache(&self) -> &HotCache {
        &self.inner.hot_cache
    }

    pub fn lifecycle(&self) -> &SessionLifecycle {
        &self.inner.lifecycle
    }

    /// Run one chat turn and stream the reply.
    ///
    /// # Errors
    ///
    /// Validation failures, and session store or plan lookup failures, are
    /// returned before anything is streamed. Embedding, scoring, and
    /// retrieval failures only degrade the prompt.
    pub async fn chat_turn(&self, request: ChatRequest) -> SDKResult<TurnStream> {
        request.validate()?;

        let guard = self
            .inner
            .lifecycle
            .locks()
            .acquire(&request.session_id)
            .await;
        let start = match self.inner.lifecycle.ensure_session(&request).await {
            Ok(start) => start,
            Err(e) => {
                drop(guard);
                self.inner.lifecycle.locks().prune(&request.session_id).await;
                return Err(e);
            }
        };
        let session = start.session;
        let user_text = request.user_text();

        let embedding = match self.inner.embeddings.embed(&user_text).await {
            Ok(embedding) => Some(embedding),
            Err(e) if e.is_validation() => return Err(e),
            Err(e) => {
                warn!(user_id = %request.user_id, session_id = %request.session_id, "embedding failed, continuing without memory: {}", e);
                None
            }
        };

        let importance = match &embedding {
            Some(embedding) => {
                self.inner
                    .scorer
                    .score_or_placeholder(&user_text, embedding)
                    .await
            }
            None => None,
        };

        let (relevant, reflections) = match &embedding {
            Some(embedding) => self.memories(&request, embedding),
            None => (Vec::new(), Vec::new()),
        };

        let context = PromptContext {
            custom_prompt: self.custom_prompt(&request),
            reflections,
            relevant,
            recent: self.recent_turns(&session).await,
        };
        let prompt = build_turn_prompt(&request, &context);

        debug!(
            user_id = %request.user_id,
            session_id = %request.session_id,
            kind = %session.kind,
            importance,
            relevant = context.relevant.len(),
            reflections = context.reflections.len(),
            recent = context.recent.len(),
            "turn prompt built"
        );

        let mut chunks = self
            .inner
            .llm
            .query(prompt, Some(session.system_instruction.clone()), None);

        let engine = self.clone();
        let pending = PendingTurn {
            session,
            user_text,
            private: request.private,
            embedding,
            importance,
        };

        Ok(Box::pin(async_stream::stream! {
            let _guard = guard;
            let mut response = String::new();
            while let Some(chunk) = chunks.next().await {
                response.push_str(&chunk);
                yield chunk;
            }
            engine.complete_turn(pending, response).await;
        }))
    }

    /// Relevant past messages and reflections for the turn.
    ///
    /// Public turns only see non-private messages; private turns only see
    /// their own session.
    fn memories(
        &self,
        request: &ChatRequest,
        embedding: &[f32],
    ) -> (Vec<ScoredRecord>, Vec<ScoredRecord>) {
        let retrieval = &self.inner.config.retrieval;
        let kind = request.kind();

        let messages = RetrievalScope::messages(&request.user_id).of_kind(kind);
        let messages = if request.private {
            messages.in_session(&request.session_id)
        } else {
            messages.with_private(false)
        };
        let relevant = self
            .inner
            .retriever
            .retrieve_embedded(embedding, &messages, retrieval.top_k, None);

        let reflections = self.inner.retriever.retrieve_embedded(
            embedding,
            &RetrievalScope::reflections(&request.user_id).of_kind(kind),
            retrieval.reflection_top_k,
            None,
        );

        (relevant, reflections)
    }

    fn custom_prompt(&self, request: &ChatRequest) -> Option<String> {
        match self
            .inner
            .db
            .latest_user_prompt(&request.user_id, request.kind())
        {
            Ok(prompt) => prompt.map(|p| p.prompt_text),
            Err(e) => {
                warn!(user_id = %request.user_id, "custom prompt lookup failed: {}", e);
                None
            }
        }
    }

    /// This session's hot cache turns, rehydrated from the store on a miss
    async fn recent_turns(&self, session: &ChatSession) -> Vec<CacheEntry> {
        let (user_id, session_id) = (&session.user_id, &session.session_id);
        let since = session.created_at.timestamp_millis();
        let hot_cache = &self.inner.hot_cache;

        match hot_cache.read_since(user_id, session_id, since).await {
            Ok(entries) if !entries.is_empty() => return entries,
            Ok(_) => {}
            Err(e) => {
                warn!(user_id = %user_id, session_id = %session_id, "hot cache read failed: {}", e);
            }
        }

        let persisted: Vec<CacheEntry> =
            match self
                .inner
                .db
                .recent_messages(user_id, session_id, since, hot_cache.capacity())
            {
                Ok(messages) => messages.into_iter().map(CacheEntry::from).collect(),
                Err(e) => {
                    warn!(user_id = %user_id, session_id = %session_id, "history read failed: {}", e);
                    return Vec::new();
                }
            };

        if !persisted.is_empty() {
            debug!(session_id = %session_id, count = persisted.len(), "rehydrating hot cache");
            if let Err(e) = hot_cache.rehydrate(user_id, session_id, &persisted).await {
                warn!(session_id = %session_id, "hot cache rehydrate failed: {}", e);
            }
        }
        persisted
    }

    /// Persistence after the last chunk; every failure is logged and swallowed
    async fn complete_turn(&self, turn: PendingTurn, response: String) {
        let PendingTurn {
            session,
            user_text,
            private,
            embedding,
            importance,
        } = turn;

        if response.trim().is_empty() || response == EXHAUSTED_SENTINEL {
            warn!(session_id = %session.session_id, "no model reply, turn not stored");
            return;
        }

        let created_at = chrono::Utc::now().timestamp_millis();
        let stored = self.inner.db.insert_message(&NewMessage {
            user_id: session.user_id.clone(),
            session_id: session.session_id.clone(),
            kind: session.kind,
            user_text: user_text.clone(),
            response_text: response.clone(),
            embedding: embedding.unwrap_or_default(),
            importance_score: importance,
            private,
            created_at,
        });
        if let Err(e) = stored {
            let e = SDKError::persistence(e.to_string());
            warn!(user_id = %session.user_id, session_id = %session.session_id, "{}", e);
        }

        let entry = CacheEntry {
            user_text,
            response_text: response,
            importance_score: importance,
            created_at,
        };
        if let Err(e) = self
            .inner
            .hot_cache
            .push(&session.user_id, &session.session_id, &entry)
            .await
        {
            warn!(session_id = %session.session_id, "hot cache push failed: {}", e);
        }

        if let Err(e) = self.inner.lifecycle.record_turn(&session.session_id).await {
            warn!(session_id = %session.session_id, "session update failed: {}", e);
        }

        let Some(score) = importance else {
            return;
        };
        match self.inner.lifecycle.record_importance(&session, score).await {
            Ok(Some(result)) => info!(
                user_id = %session.user_id,
                session_id = %session.session_id,
                reflected = result.reflection.is_some(),
                planned = result.plan.is_some(),
                "memory synthesized"
            ),
            Ok(None) => {}
            Err(e) => warn!(
                user_id = %session.user_id,
                session_id = %session.session_id,
                "synthesis deferred to next turn: {}",
                e
            ),
        }
    }

    /// Close a session: reflect, plan, and discard it
    pub async fn finalize(&self, user_id: &str, session_id: &str) -> SDKResult<SessionEndResult> {
        let locks = self.inner.lifecycle.locks();
        let guard = locks.acquire(session_id).await;
        let result = self.inner.lifecycle.finalize(user_id, session_id).await;
        drop(guard);
        locks.prune(session_id).await;
        result
    }

    /// Finalize every session idle past the inactivity window
    pub async fn sweep_expired(&self) -> SDKResult<Vec<SessionEndResult>> {
        self.inner.lifecycle.sweep_expired().await
    }

    /// Run [`Self::sweep_expired`] every `interval` until shut down
    pub fn spawn_expiry_sweeper(&self, interval: Duration) -> ExpirySweeper {
        let engine = self.clone();
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        info!(interval_seconds = interval.as_secs(), "starting expiry sweeper");
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = engine.sweep_expired().await {
                            warn!("expiry sweep failed: {}", e);
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("expiry sweeper stopped");
                        break;
                    }
                }
            }
        });

        ExpirySweeper {
            shutdown_tx,
            handle,
        }
    }

    /// Rank a user's stored records against `text`
    pub async fn search(
        &self,
        text: &str,
        scope: &RetrievalScope,
        top_k: usize,
    ) -> SDKResult<Vec<ScoredRecord>> {
        let embedding = self.inner.embeddings.embed(text).await?;
        Ok(self
            .inner
            .retriever
            .retrieve_embedded(&embedding, scope, top_k, None))
    }

    /// Add labeled samples to the importance reference corpus
    pub async fn seed_reference_samples(&self, samples: &[SeedSample]) -> SDKResult<SeedReport> {
        seed_samples(&self.inner.db, &self.inner.embeddings, samples).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelSpec;
    use crate::llm::LlmRequest;
    use crate::session::MemorySessionStore;
    use crate::testing::{ScriptedProvider, StubEmbedder};
    use augury_core::{ChatKind, MemoryCache, NewPlan, SessionStatus};

    const CHAT_REPLY: &str = "I hear you. Tell me more.";

    fn reply(rating: &'static str) -> impl Fn(&LlmRequest) -> String + Send + Sync + 'static {
        move |request: &LlmRequest| {
            if request.prompt.contains("Plan for Next Conversation") {
                "Explore what keeps the user up at night".to_string()
            } else if request.prompt.contains("generate a thoughtful reflection") {
                "The user is anxious and sleeping badly".to_string()
            } else if request.prompt.contains("Rating:") {
                rating.to_string()
            } else {
                CHAT_REPLY.to_string()
            }
        }
    }

    struct Harness {
        engine: ConversationEngine,
        db: Arc<Database>,
        provider: ScriptedProvider,
    }

    fn harness(provider: ScriptedProvider) -> Harness {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let config = EngineConfig::default().with_llm(crate::config::LlmConfig {
            models: vec![ModelSpec::new("m", 10_000)],
            ..Default::default()
        });
        let engine = ConversationEngine::new(
            config,
            Collaborators {
                db: db.clone(),
                embedder: Arc::new(StubEmbedder::new(16)),
                cache: Arc::new(MemoryCache::new()),
                llm: Arc::new(provider.clone()),
                sessions: Arc::new(MemorySessionStore::new()),
            },
        )
        .unwrap();
        Harness {
            engine,
            db,
            provider,
        }
    }

    async fn turn(engine: &ConversationEngine, request: ChatRequest) -> String {
        engine
            .chat_turn(request)
            .await
            .unwrap()
            .collect::<Vec<_>>()
            .await
            .concat()
    }

    fn chat_prompts(provider: &ScriptedProvider) -> Vec<String> {
        provider
            .requests()
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.system_instruction.is_some())
            .map(|r| r.prompt.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_turn_streams_and_persists() {
        let h = harness(ScriptedProvider::new().reply_with(reply("3")));

        let text = turn(&h.engine, ChatRequest::counsellor("7", "s1", "I feel anxious")).await;
        assert_eq!(text, CHAT_REPLY);

        let messages = h.db.recent_messages("7", "s1", 0, 10).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].user_text, "I feel anxious");
        assert_eq!(messages[0].response_text, CHAT_REPLY);
        assert_eq!(messages[0].importance_score, Some(3.0));

        let cached = h.engine.hot_cache().read("7", "s1").await.unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(h.engine.hot_cache().importance("7", "s1").await.unwrap(), 3.0);
        assert_eq!(
            h.db.get_chat_session("s1").unwrap().unwrap().status,
            SessionStatus::Active
        );
    }

    #[tokio::test]
    async fn test_second_turn_sees_recent_conversation() {
        let h = harness(ScriptedProvider::new().reply_with(reply("1")));
        turn(&h.engine, ChatRequest::counsellor("7", "s1", "I feel anxious")).await;
        turn(&h.engine, ChatRequest::counsellor("7", "s1", "It is worse at night")).await;

        let prompts = chat_prompts(&h.provider);
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("Recent Conversation:\nUser: I feel anxious\nCounsellor: "));
        assert!(prompts[1].ends_with("User: It is worse at night"));
    }

    #[tokio::test]
    async fn test_ten_unit_turns_trigger_synthesis() {
        let h = harness(ScriptedProvider::new().reply_with(reply("1")));

        for i in 1..=9 {
            turn(&h.engine, ChatRequest::counsellor("7", "s1", format!("message {}", i))).await;
        }
        assert_eq!(h.engine.hot_cache().importance("7", "s1").await.unwrap(), 9.0);
        assert!(h.db.active_plan("7").unwrap().is_none());

        turn(&h.engine, ChatRequest::counsellor("7", "s1", "message 10")).await;
        assert_eq!(h.engine.hot_cache().importance("7", "s1").await.unwrap(), 0.0);

        let plan = h.db.active_plan("7").unwrap().unwrap();
        assert_eq!(plan.plan_text, "Explore what keeps the user up at night");
        let reflections = h.db.recent_reflections("7", Some(ChatKind::Counsellor), 5).unwrap();
        assert_eq!(reflections.len(), 1);
        assert_eq!(h.db.count_messages("7").unwrap(), 10);
    }

    #[tokio::test]
    async fn test_concurrent_finalize_leaves_one_active_plan() {
        let h = harness(ScriptedProvider::new().reply_with(reply("1")));
        h.db.activate_plan(&NewPlan {
            user_id: "7".into(),
            kind: ChatKind::Counsellor,
            plan_text: "Earlier plan".into(),
        })
        .unwrap();
        turn(&h.engine, ChatRequest::counsellor("7", "s1", "I feel anxious")).await;

        let (a, b) = tokio::join!(h.engine.finalize("7", "s1"), h.engine.finalize("7", "s1"));
        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);

        let active = h
            .db
            .list_plans("7", 10)
            .unwrap()
            .into_iter()
            .filter(|p| p.active)
            .count();
        assert_eq!(active, 1);
        assert_eq!(h.engine.lifecycle().locks().len().await, 0);
    }

    #[tokio::test]
    async fn test_empty_message_rejected_without_side_effects() {
        let h = harness(ScriptedProvider::new());

        let err = h
            .engine
            .chat_turn(ChatRequest::counsellor("7", "s1", "   "))
            .await
            .err()
            .unwrap();
        assert!(err.is_validation());
        assert_eq!(h.db.count_messages("7").unwrap(), 0);
        assert!(h.db.get_chat_session("s1").unwrap().is_none());
        assert!(h.provider.calls().lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_synthesis_failure_keeps_counter() {
        let provider = ScriptedProvider::new()
            .reply_with(reply("10"))
            .fail_when(|r| r.prompt.contains("generate a thoughtful reflection"));
        let h = harness(provider);

        turn(&h.engine, ChatRequest::counsellor("7", "s1", "I lost my job")).await;
        assert_eq!(h.db.count_messages("7").unwrap(), 1);
        assert_eq!(h.engine.hot_cache().importance("7", "s1").await.unwrap(), 10.0);

        turn(&h.engine, ChatRequest::counsellor("7", "s1", "And my flat")).await;
        assert_eq!(h.engine.hot_cache().importance("7", "s1").await.unwrap(), 20.0);
        assert!(h.db.active_plan("7").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dropped_stream_stores_nothing() {
        let h = harness(ScriptedProvider::new().reply_with(reply("5")));

        let mut stream = h
            .engine
            .chat_turn(ChatRequest::counsellor("7", "s1", "I feel anxious"))
            .await
            .unwrap();
        assert!(stream.next().await.is_some());
        drop(stream);

        assert_eq!(h.db.count_messages("7").unwrap(), 0);
        assert_eq!(h.engine.hot_cache().importance("7", "s1").await.unwrap(), 0.0);

        // Lock released with the stream
        turn(&h.engine, ChatRequest::counsellor("7", "s1", "Still there?")).await;
        assert_eq!(h.db.count_messages("7").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_models_store_nothing() {
        let h = harness(ScriptedProvider::new().fail_model("m"));

        let text = turn(&h.engine, ChatRequest::counsellor("7", "s1", "hello")).await;
        assert_eq!(text, EXHAUSTED_SENTINEL);
        assert_eq!(h.db.count_messages("7").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_private_messages_stay_in_their_session() {
        let h = harness(ScriptedProvider::new().reply_with(reply("2")));

        turn(
            &h.engine,
            ChatRequest::counsellor("7", "p1", "my secret diary").with_private(true),
        )
        .await;
        turn(&h.engine, ChatRequest::counsellor("7", "s2", "hello")).await;
        turn(
            &h.engine,
            ChatRequest::counsellor("7", "p1", "more secrets").with_private(true),
        )
        .await;

        let prompts = chat_prompts(&h.provider);
        assert!(!prompts[1].contains("my secret diary"));
        assert!(prompts[2].contains("my secret diary"));
        assert!(!prompts[2].contains("User: hello\n"));
    }

    #[tokio::test]
    async fn test_private_turn_never_reaches_public_memory() {
        let h = harness(ScriptedProvider::new().reply_with(reply("1")));
        turn(&h.engine, ChatRequest::counsellor("7", "s1", "hello there")).await;

        let err = h
            .engine
            .chat_turn(ChatRequest::counsellor("7", "s1", "MY PRIVATE SECRET").with_private(true))
            .await
            .err()
            .unwrap();
        assert!(err.is_validation());
        assert_eq!(h.engine.lifecycle().locks().len().await, 0);

        let end = h.engine.finalize("7", "s1").await.unwrap();
        assert!(end.synthesis.reflection.is_some());
        assert_eq!(h.db.count_messages("7").unwrap(), 1);
        let leaked = h
            .provider
            .requests()
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.prompt.contains("MY PRIVATE SECRET"));
        assert!(!leaked);
    }

    #[tokio::test]
    async fn test_rejected_turns_release_their_lock() {
        let h = harness(ScriptedProvider::new().reply_with(reply("1")));
        h.db.upsert_chat_session("s1", "8", ChatKind::Counsellor, false, None)
            .unwrap();

        for _ in 0..3 {
            let err = h
                .engine
                .chat_turn(ChatRequest::counsellor("7", "s1", "hi"))
                .await
                .err()
                .unwrap();
            assert!(err.is_validation());
        }
        assert_eq!(h.engine.lifecycle().locks().len().await, 0);
    }

    #[tokio::test]
    async fn test_reused_session_id_starts_fresh() {
        let h = harness(ScriptedProvider::new().reply_with(reply("1")));
        turn(&h.engine, ChatRequest::counsellor("7", "s1", "OLD SESSION TURN")).await;

        let store = h.engine.lifecycle().store();
        let mut stale = store.get("s1").await.unwrap().unwrap();
        stale.last_active = chrono::Utc::now() - chrono::Duration::hours(2);
        store.put(stale).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        turn(&h.engine, ChatRequest::counsellor("7", "s1", "a new start")).await;

        let prompts = chat_prompts(&h.provider);
        let last = prompts.last().unwrap();
        assert!(!last.contains("Recent Conversation:"));
        assert_eq!(h.engine.hot_cache().read("7", "s1").await.unwrap().len(), 1);
        assert_eq!(
            h.db.get_chat_session("s1").unwrap().unwrap().status,
            SessionStatus::Active
        );
    }

    #[tokio::test]
    async fn test_plan_seeds_system_instruction() {
        let h = harness(ScriptedProvider::new().reply_with(reply("1")));
        h.db.activate_plan(&NewPlan {
            user_id: "7".into(),
            kind: ChatKind::Counsellor,
            plan_text: "Ask about sleep".into(),
        })
        .unwrap();
        h.db.set_user_prompt("7", ChatKind::Counsellor, "Keep answers short.").unwrap();

        turn(&h.engine, ChatRequest::counsellor("7", "s1", "hi")).await;

        let requests = h.provider.requests();
        let requests = requests.lock().unwrap();
        let chat = requests.iter().find(|r| r.system_instruction.is_some()).unwrap();
        assert!(chat
            .system_instruction
            .as_deref()
            .unwrap()
            .ends_with("Plan for this conversation:\nAsk about sleep"));
        assert!(chat.prompt.starts_with("Keep answers short."));
    }

    #[tokio::test]
    async fn test_embedding_outage_degrades() {
        let provider = ScriptedProvider::new().reply_with(reply("4"));
        let db = Arc::new(Database::open_in_memory().unwrap());
        let engine = ConversationEngine::new(
            EngineConfig::default(),
            Collaborators {
                db: db.clone(),
                embedder: Arc::new(StubEmbedder::new(16).failing()),
                cache: Arc::new(MemoryCache::new()),
                llm: Arc::new(provider),
                sessions: Arc::new(MemorySessionStore::new()),
            },
        )
        .unwrap();

        let text = turn(&engine, ChatRequest::counsellor("7", "s1", "hello")).await;
        assert_eq!(text, CHAT_REPLY);
        let messages = db.recent_messages("7", "s1", 0, 10).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].importance_score, None);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.cache.hot_cache_size = 0;
        let result = ConversationEngine::new(
            config,
            Collaborators {
                db: Arc::new(Database::open_in_memory().unwrap()),
                embedder: Arc::new(StubEmbedder::new(16)),
                cache: Arc::new(MemoryCache::new()),
                llm: Arc::new(ScriptedProvider::new()),
                sessions: Arc::new(MemorySessionStore::new()),
            },
        );
        assert!(matches!(result, Err(SDKError::Config(_))));
    }

    #[tokio::test]
    async fn test_sweeper_starts_and_stops() {
        let h = harness(ScriptedProvider::new());
        let sweeper = h.engine.spawn_expiry_sweeper(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(30)).await;
        sweeper.shutdown().await;
    }

    #[tokio::test]
    async fn test_search_scoped_to_user() {
        let h = harness(ScriptedProvider::new().reply_with(reply("6")));
        turn(&h.engine, ChatRequest::counsellor("7", "s1", "I feel anxious")).await;
        turn(&h.engine, ChatRequest::counsellor("8", "s9", "I feel anxious")).await;

        let results = h
            .engine
            .search("anxious", &RetrievalScope::messages("7"), 5)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].user_id, "7");
        assert!(h
            .engine
            .search("", &RetrievalScope::messages("7"), 5)
            .await
            .unwrap_err()
            .is_validation());
    }
}
