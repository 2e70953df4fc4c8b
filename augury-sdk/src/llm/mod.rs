//! LLM dispatch collaborator.
//!
//! - **provider**: [`LlmProvider`] streams text for one named model
//! - **gemini**: Gemini `streamGenerateContent` over server-sent events
//! - **dispatch**: ordered model fallback with per-model rate limits

pub mod dispatch;
pub mod gemini;

pub use dispatch::LlmDispatcher;
pub use gemini::GeminiProvider;

use crate::SDKResult;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Yielded by [`LlmDispatcher::query`] when every model failed or was rate limited
pub const EXHAUSTED_SENTINEL: &str =
    "Error: All models are unavailable or have exceeded their rate limits. Try again later.";

/// Stream of text chunks from one model
pub type ChunkStream = BoxStream<'static, SDKResult<String>>;

/// One generation request
#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub prompt: String,
    pub system_instruction: Option<String>,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_instruction: None,
        }
    }

    pub fn with_system(mut self, system_instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(system_instruction.into());
        self
    }
}

/// Text generation backend
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Start streaming a reply from `model`.
    ///
    /// Errors returned here, or as the first stream item, let the
    /// dispatcher fall through to the next model.
    async fn stream(&self, model: &str, request: &LlmRequest) -> SDKResult<ChunkStream>;
}
