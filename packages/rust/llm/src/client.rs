//! Thin messages-API client with failure classification.

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use threadline_shared::{AnthropicConfig, LlmError, Result, ThreadlineError};

const ANTHROPIC_VERSION: &str = "2023-06-01";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Debug, Serialize)]
struct ContentBlock<'a> {
    #[serde(rename = "type")]
    block_type: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the messages API. One instance is shared by the extractor
/// and segmenter adapters.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl AnthropicClient {
    /// Build a client from config and a resolved API key.
    ///
    /// The transport timeout doubles as the per-call deadline: a hanging
    /// request surfaces as a retryable failure instead of wedging its caller.
    pub fn new(config: &AnthropicConfig, api_key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| {
                ThreadlineError::Network(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    /// Send one completion request. `prefill` seeds the assistant turn so the
    /// model continues from a fixed prefix; the caller is responsible for
    /// re-attaching it to the returned text.
    #[instrument(skip_all, fields(model = %self.model))]
    pub async fn complete(
        &self,
        system: &str,
        user_text: &str,
        prefill: Option<&str>,
    ) -> std::result::Result<String, LlmError> {
        let mut messages = vec![Message {
            role: "user",
            content: vec![ContentBlock {
                block_type: "text",
                text: user_text,
            }],
        }];
        if let Some(prefix) = prefill {
            messages.push(Message {
                role: "assistant",
                content: vec![ContentBlock {
                    block_type: "text",
                    text: prefix,
                }],
            });
        }

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system,
            messages,
        };

        let response = self
            .http
            .post(format!("{}/v1/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::retryable(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| LlmError::malformed(format!("unreadable response body: {e}")))?;

        let text = parsed
            .content
            .into_iter()
            .next()
            .map(|block| block.text)
            .ok_or_else(|| LlmError::malformed("response contained no content blocks"))?;

        debug!(bytes = text.len(), "completion received");
        Ok(text)
    }
}

/// Map an HTTP failure status onto the retry taxonomy: credential rejections
/// are fatal, rate limits and server-side trouble are retryable, anything
/// else is fatal.
fn classify_status(status: StatusCode, body: &str) -> LlmError {
    let detail = serde_json::from_str::<ApiErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| format!("HTTP {status}"));

    match status.as_u16() {
        401 | 403 => LlmError::fatal(format!("authentication failed: {detail}")),
        429 => LlmError::retryable(format!("rate limit exceeded: {detail}")),
        500..=599 => LlmError::retryable(format!("server error: {detail}")),
        _ => LlmError::fatal(format!("unexpected status {status}: {detail}")),
    }
}
