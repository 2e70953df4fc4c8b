//! Model fallback chain.
//!
//! Models are tried in configured order. A model is skipped when its rolling
//! one-minute request budget is spent, and abandoned when it fails before
//! producing its first chunk. Failures after the first chunk end the reply
//! early; there is no mid-reply switch to another model.

use super::{ChunkStream, EXHAUSTED_SENTINEL, LlmProvider, LlmRequest};
use crate::config::ModelSpec;
use crate::{SDKError, SDKResult};
use futures::StreamExt;
use futures::stream::BoxStream;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Ordered, rate-limited model dispatch over one provider
#[derive(Clone)]
pub struct LlmDispatcher {
    provider: Arc<dyn LlmProvider>,
    models: Arc<Vec<ModelSpec>>,
    windows: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
}

/// A model that produced its first chunk
struct OpenStream {
    model: String,
    first: String,
    rest: ChunkStream,
}

impl LlmDispatcher {
    pub fn new(provider: Arc<dyn LlmProvider>, models: Vec<ModelSpec>) -> Self {
        Self {
            provider,
            models: Arc::new(models),
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Configured models in fallback order
    pub fn models(&self) -> &[ModelSpec] {
        &self.models
    }

    /// Stream a reply as plain text chunks.
    ///
    /// Never fails: when no model can answer, the stream yields
    /// [`EXHAUSTED_SENTINEL`] once and ends.
    pub fn query(
        &self,
        prompt: impl Into<String>,
        system_instruction: Option<String>,
        model: Option<&str>,
    ) -> BoxStream<'static, String> {
        let this = self.clone();
        let request = LlmRequest {
            prompt: prompt.into(),
            system_instruction,
        };
        let preferred = model.map(str::to_string);

        Box::pin(async_stream::stream! {
            let open = this.open(&request, preferred.as_deref()).await;
            let OpenStream { model, first, mut rest } = match open {
                Some(open) => open,
                None => {
                    yield EXHAUSTED_SENTINEL.to_string();
                    return;
                }
            };
            yield first;
            while let Some(chunk) = rest.next().await {
                match chunk {
                    Ok(text) => yield text,
                    Err(e) => {
                        warn!(model = %model, "LLM stream ended early: {}", e);
                        break;
                    }
                }
            }
        })
    }

    /// Collect a full reply, failing instead of yielding the sentinel
    pub async fn complete(
        &self,
        prompt: impl Into<String>,
        system_instruction: Option<String>,
        model: Option<&str>,
    ) -> SDKResult<String> {
        let request = LlmRequest {
            prompt: prompt.into(),
            system_instruction,
        };

        let OpenStream {
            model: used,
            mut first,
            mut rest,
        } = self
            .open(&request, model)
            .await
            .ok_or_else(|| SDKError::llm(EXHAUSTED_SENTINEL))?;

        while let Some(chunk) = rest.next().await {
            let chunk = chunk
                .map_err(|e| SDKError::llm(format!("{} stream ended early: {}", used, e)))?;
            first.push_str(&chunk);
        }
        Ok(first)
    }

    /// Walk the fallback chain until a model yields its first chunk
    async fn open(&self, request: &LlmRequest, preferred: Option<&str>) -> Option<OpenStream> {
        for spec in self.candidates(preferred) {
            if !self.try_acquire(&spec).await {
                debug!(model = %spec.name, "rate limit reached, skipping");
                continue;
            }

            let mut rest = match self.provider.stream(&spec.name, request).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(provider = self.provider.name(), model = %spec.name, "model unavailable: {}", e);
                    continue;
                }
            };

            match rest.next().await {
                Some(Ok(first)) => {
                    return Some(OpenStream {
                        model: spec.name,
                        first,
                        rest,
                    });
                }
                Some(Err(e)) => {
                    warn!(provider = self.provider.name(), model = %spec.name, "model failed: {}", e);
                }
                None => {
                    warn!(provider = self.provider.name(), model = %spec.name, "model returned an empty reply");
                }
            }
        }
        None
    }

    /// Preferred model first (when configured), then the rest in order
    fn candidates(&self, preferred: Option<&str>) -> Vec<ModelSpec> {
        let mut models: Vec<ModelSpec> = self.models.iter().cloned().collect();
        if let Some(name) = preferred {
            if let Some(pos) = models.iter().position(|m| m.name == name) {
                let spec = models.remove(pos);
                models.insert(0, spec);
            }
        }
        models
    }

    /// Record a request against the model's rolling window if budget remains
    async fn try_acquire(&self, spec: &ModelSpec) -> bool {
        let mut windows = self.windows.lock().await;
        let window = windows.entry(spec.name.clone()).or_default();
        let now = Instant::now();

        while window
            .front()
            .is_some_and(|at| now.duration_since(*at) >= RATE_WINDOW)
        {
            window.pop_front();
        }

        if window.len() >= spec.rpm as usize {
            return false;
        }
        window.push_back(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;
    use futures::StreamExt;

    fn dispatcher(provider: ScriptedProvider, models: Vec<ModelSpec>) -> LlmDispatcher {
        LlmDispatcher::new(Arc::new(provider), models)
    }

    #[tokio::test]
    async fn test_query_streams_chunks() {
        let provider = ScriptedProvider::new().reply_with(|_| "Hello there".to_string());
        let llm = dispatcher(provider, vec![ModelSpec::new("a", 10)]);

        let chunks: Vec<String> = llm.query("hi", None, None).collect().await;
        assert_eq!(chunks.concat(), "Hello there");
    }

    #[tokio::test]
    async fn test_falls_through_failed_model() {
        let provider = ScriptedProvider::new()
            .fail_model("a")
            .reply_with(|_| "from b".to_string());
        let calls = provider.calls();
        let llm = dispatcher(provider, vec![ModelSpec::new("a", 10), ModelSpec::new("b", 10)]);

        assert_eq!(llm.complete("hi", None, None).await.unwrap(), "from b");
        assert_eq!(*calls.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_sentinel_when_exhausted() {
        let provider = ScriptedProvider::new().fail_model("a").fail_model("b");
        let llm = dispatcher(provider, vec![ModelSpec::new("a", 10), ModelSpec::new("b", 10)]);

        let chunks: Vec<String> = llm.query("hi", None, None).collect().await;
        assert_eq!(chunks, vec![EXHAUSTED_SENTINEL.to_string()]);

        let err = llm.complete("hi", None, None).await.unwrap_err();
        assert!(matches!(err, SDKError::Llm { .. }));
    }

    #[tokio::test]
    async fn test_rate_limit_skips_model() {
        let provider = ScriptedProvider::new().reply_with(|_| "ok".to_string());
        let calls = provider.calls();
        let llm = dispatcher(provider, vec![ModelSpec::new("a", 1), ModelSpec::new("b", 10)]);

        llm.complete("one", None, None).await.unwrap();
        llm.complete("two", None, None).await.unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_preferred_model_first() {
        let provider = ScriptedProvider::new().reply_with(|_| "ok".to_string());
        let calls = provider.calls();
        let llm = dispatcher(provider, vec![ModelSpec::new("a", 10), ModelSpec::new("b", 10)]);

        llm.complete("hi", None, Some("b")).await.unwrap();
        llm.complete("hi", None, Some("unknown")).await.unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["b".to_string(), "a".to_string()]);
    }
}
