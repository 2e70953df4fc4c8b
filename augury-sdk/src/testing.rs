//! In-crate fakes for the embedding and LLM collaborators.

use crate::llm::{ChunkStream, LlmProvider, LlmRequest};
use crate::memory::Embedder;
use crate::{SDKError, SDKResult};
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

/// Deterministic embedder: fixed vectors for known texts, hashed otherwise
pub struct StubEmbedder {
    dims: usize,
    fixed: HashMap<String, Vec<f32>>,
    failing: bool,
}

impl StubEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            fixed: HashMap::new(),
            failing: false,
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.fixed.insert(text.to_string(), vector);
        self
    }

    /// Every call fails as if the model were unavailable
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    fn hashed(&self, text: &str) -> Vec<f32> {
        (0..self.dims)
            .map(|i| {
                let mut hasher = DefaultHasher::new();
                text.hash(&mut hasher);
                i.hash(&mut hasher);
                (hasher.finish() % 2000) as f32 / 1000.0 - 1.0
            })
            .collect()
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, text: &str) -> SDKResult<Vec<f32>> {
        if self.failing {
            return Err(SDKError::retrieval("stub embedder offline"));
        }
        Ok(self
            .fixed
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.hashed(text)))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

type ReplyFn = Arc<dyn Fn(&LlmRequest) -> String + Send + Sync>;
type FailFn = Arc<dyn Fn(&LlmRequest) -> bool + Send + Sync>;

/// LLM provider that answers from a closure and records model calls
#[derive(Clone)]
pub struct ScriptedProvider {
    reply: ReplyFn,
    failing_models: HashSet<String>,
    fail_when: Option<FailFn>,
    calls: Arc<Mutex<Vec<String>>>,
    requests: Arc<Mutex<Vec<LlmRequest>>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            reply: Arc::new(|_| "ok".to_string()),
            failing_models: HashSet::new(),
            fail_when: None,
            calls: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn reply_with<F>(mut self, reply: F) -> Self
    where
        F: Fn(&LlmRequest) -> String + Send + Sync + 'static,
    {
        self.reply = Arc::new(reply);
        self
    }

    /// `model` fails before producing any chunk
    pub fn fail_model(mut self, model: &str) -> Self {
        self.failing_models.insert(model.to_string());
        self
    }

    /// Every model fails on requests matching `predicate`
    pub fn fail_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&LlmRequest) -> bool + Send + Sync + 'static,
    {
        self.fail_when = Some(Arc::new(predicate));
        self
    }

    /// Model names in call order
    pub fn calls(&self) -> Arc<Mutex<Vec<String>>> {
        self.calls.clone()
    }

    /// Requests in call order
    pub fn requests(&self) -> Arc<Mutex<Vec<LlmRequest>>> {
        self.requests.clone()
    }
}

/// Split a reply into small chunks on char boundaries
fn chunk(reply: &str) -> Vec<String> {
    let chars: Vec<char> = reply.chars().collect();
    chars.chunks(8).map(|c| c.iter().collect()).collect()
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, model: &str, request: &LlmRequest) -> SDKResult<ChunkStream> {
        self.calls.lock().unwrap().push(model.to_string());
        self.requests.lock().unwrap().push(request.clone());

        if self.failing_models.contains(model) {
            return Err(SDKError::llm(format!("{} unavailable", model)));
        }
        if self.fail_when.as_ref().is_some_and(|f| f(request)) {
            return Err(SDKError::llm(format!("{} refused the request", model)));
        }

        let chunks = chunk(&(self.reply)(request));
        Ok(Box::pin(futures::stream::iter(chunks.into_iter().map(Ok))))
    }
}
