//! Gemini provider.
//!
//! Streams replies from `models/{model}:streamGenerateContent?alt=sse`.
//! Each `data:` line carries a JSON `GenerateContentResponse`; the text of
//! the first candidate's parts is yielded as one chunk.

use super::{ChunkStream, LlmProvider, LlmRequest};
use crate::config::LlmConfig;
use crate::{SDKError, SDKResult};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> SDKResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SDKError::llm(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Build from config, reading the key from `config.api_key_env`
    pub fn from_config(config: &LlmConfig) -> SDKResult<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| SDKError::llm(format!("{} not set", config.api_key_env)))?;

        Self::new(
            api_key,
            config.base_url.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
struct GeminiStreamChunk {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
}

#[derive(Deserialize, Debug)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Deserialize, Debug)]
struct GeminiError {
    message: String,
}

impl GeminiRequest {
    fn from_request(request: &LlmRequest) -> Self {
        Self {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart {
                    text: Some(request.prompt.clone()),
                }],
            }],
            system_instruction: request.system_instruction.as_ref().map(|s| GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: Some(s.clone()),
                }],
            }),
        }
    }
}

// ============================================================================
// SSE Parsing
// ============================================================================

/// Extract the text of one SSE line; `Ok(None)` for non-data or empty lines
fn parse_sse_line(line: &str) -> SDKResult<Option<String>> {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }

    let chunk: GeminiStreamChunk = serde_json::from_str(data)?;
    if let Some(error) = chunk.error {
        return Err(SDKError::llm(format!("Gemini error: {}", error.message)));
    }

    let text: String = chunk
        .candidates
        .into_iter()
        .flatten()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    Ok((!text.is_empty()).then_some(text))
}

fn sse_chunks(response: reqwest::Response) -> ChunkStream {
    Box::pin(async_stream::stream! {
        let mut bytes = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(SDKError::llm(format!("Gemini stream interrupted: {}", e)));
                    return;
                }
            };
            buffer.extend_from_slice(&chunk);

            // Split on raw newlines so multi-byte characters never straddle a decode
            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                match parse_sse_line(&String::from_utf8_lossy(&line)) {
                    Ok(Some(text)) => yield Ok(text),
                    Ok(None) => {}
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        }

        if !buffer.is_empty() {
            match parse_sse_line(&String::from_utf8_lossy(&buffer)) {
                Ok(Some(text)) => yield Ok(text),
                Ok(None) => {}
                Err(e) => yield Err(e),
            }
        }
    })
}

// ============================================================================
// Provider Implementation
// ============================================================================

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn stream(&self, model: &str, request: &LlmRequest) -> SDKResult<ChunkStream> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&GeminiRequest::from_request(request))
            .send()
            .await
            .map_err(|e| SDKError::llm(format!("Gemini request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SDKError::llm(format!("Gemini API error: {} - {}", status, body)));
        }

        Ok(sse_chunks(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_line() {
        let line = r#"data: {"candidates":[{"content":{"role":"model","parts":[{"text":"Hello"},{"text":" there"}]}}]}"#;
        assert_eq!(parse_sse_line(line).unwrap(), Some("Hello there".to_string()));

        assert_eq!(parse_sse_line("").unwrap(), None);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), None);
        assert_eq!(
            parse_sse_line(r#"data: {"candidates":[{"finishReason":"STOP"}]}"#).unwrap(),
            None
        );
    }

    #[test]
    fn test_parse_sse_error() {
        let line = r#"data: {"error":{"code":429,"message":"quota exceeded"}}"#;
        let err = parse_sse_line(line).unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));

        assert!(parse_sse_line("data: {not json").is_err());
    }

    #[test]
    fn test_request_shape() {
        let request = LlmRequest::new("Rate this").with_system("Be terse");
        let json = serde_json::to_value(GeminiRequest::from_request(&request)).unwrap();

        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "Rate this");
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "Be terse");
        assert!(json["systemInstruction"].get("role").is_none());
    }
}
