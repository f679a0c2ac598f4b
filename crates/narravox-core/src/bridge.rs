//! Completion-service bridge.
//!
//! The pipeline treats the language model as an opaque collaborator behind
//! the `CompletionBridge` trait: request in, text content out. The bundled
//! implementation talks to OpenRouter's OpenAI-compatible chat endpoint.
//! API key: `OPENROUTER_API_KEY`.

use crate::error::{PipelineError, PipelineResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "meta-llama/llama-3.3-70b-instruct";

/// One completion call.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
    /// Ask the provider for a JSON object response.
    pub expect_json: bool,
}

/// Raw completion content; parsing is the caller's concern.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
}

/// Seam for the remote completion call, so tests can inject doubles.
#[async_trait]
pub trait CompletionBridge: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> PipelineResult<CompletionResponse>;
}

// OpenAI-compatible request/response for OpenRouter
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

/// OpenRouter-backed completion bridge.
pub struct OpenRouterBridge {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenRouterBridge {
    /// Create a bridge from `OPENROUTER_API_KEY`. Returns `None` when the
    /// key is absent or blank.
    pub fn from_env() -> Option<Self> {
        let key = std::env::var("OPENROUTER_API_KEY").ok()?.trim().to_string();
        if key.is_empty() {
            return None;
        }
        Some(Self::new(key))
    }

    /// Create a bridge with an explicit API key.
    pub fn new(api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_key: api_key.trim().to_string(),
            model: DEFAULT_MODEL.to_string(),
            client,
        }
    }

    /// Set the model (e.g. `anthropic/claude-3.5-sonnet`).
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }
}

#[async_trait]
impl CompletionBridge for OpenRouterBridge {
    async fn complete(&self, request: CompletionRequest) -> PipelineResult<CompletionResponse> {
        let url = format!("{OPENROUTER_API_BASE}/chat/completions");
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system_prompt,
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.user_prompt,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_output_tokens,
            response_format: request
                .expect_json
                .then(|| serde_json::json!({ "type": "json_object" })),
        };

        let res = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::Bridge(format!("completion request failed: {e}")))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(PipelineError::Bridge(format!(
                "completion API error {status}: {body}"
            )));
        }

        let parsed: ChatResponse = res
            .json()
            .await
            .map_err(|e| PipelineError::Bridge(format!("completion response parse failed: {e}")))?;

        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(CompletionResponse { content })
    }
}

/// One per-segment direction returned by an annotation or refinement call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectionFix {
    pub index: usize,
    #[serde(default)]
    pub audio_tags: String,
    #[serde(default)]
    pub stability: Option<f32>,
    #[serde(default)]
    pub style: Option<f32>,
    #[serde(default)]
    pub reasoning: String,
}

/// Expected JSON shape of annotation/refinement completion content.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectionPayload {
    pub directions: Vec<DirectionFix>,
}

/// Parse completion content as a direction payload. Empty or malformed
/// content is an error; tolerance is decided per call site (batch-local vs
/// dialogue-refinement hard failure).
pub fn parse_direction_payload(content: &str) -> PipelineResult<DirectionPayload> {
    let body = strip_code_fences(content);
    if body.is_empty() {
        return Err(PipelineError::Payload("empty completion content".into()));
    }
    Ok(serde_json::from_str(body)?)
}

/// Models wrap JSON in markdown fences often enough that we tolerate it.
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.trim_end_matches('`').trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_direction_payload() {
        let content = r#"{"directions":[{"index":0,"audioTags":"[excited]","stability":0.4,"style":0.6,"reasoning":"greeting"}]}"#;
        let payload = parse_direction_payload(content).expect("payload");
        assert_eq!(payload.directions.len(), 1);
        assert_eq!(payload.directions[0].index, 0);
        assert_eq!(payload.directions[0].audio_tags, "[excited]");
        assert_eq!(payload.directions[0].stability, Some(0.4));
    }

    #[test]
    fn tolerates_markdown_fences_and_missing_fields() {
        let content = "```json\n{\"directions\":[{\"index\":2}]}\n```";
        let payload = parse_direction_payload(content).expect("payload");
        assert_eq!(payload.directions[0].index, 2);
        assert!(payload.directions[0].audio_tags.is_empty());
        assert!(payload.directions[0].stability.is_none());
    }

    #[test]
    fn empty_content_is_an_error() {
        assert!(parse_direction_payload("").is_err());
        assert!(parse_direction_payload("   ").is_err());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(parse_direction_payload("not json at all").is_err());
    }
}
