//! Live segmentation verdicts over the messages API.

use async_trait::async_trait;
use tracing::{debug, instrument};

use threadline_core::{SegmentDecision, Segmenter};
use threadline_shared::LlmError;

use crate::client::AnthropicClient;
use crate::prompts;

pub struct AnthropicSegmenter {
    client: AnthropicClient,
}

impl AnthropicSegmenter {
    pub fn new(client: AnthropicClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Segmenter for AnthropicSegmenter {
    #[instrument(skip_all, fields(window_bytes = buffered_text.len()))]
    async fn evaluate_segment(&self, buffered_text: &str) -> Result<SegmentDecision, LlmError> {
        let completion = self
            .client
            .complete(prompts::SEGMENT_EVALUATION, buffered_text, None)
            .await?;

        let decision: SegmentDecision = serde_json::from_str(strip_fences(&completion))
            .map_err(|e| LlmError::malformed(format!("invalid decision JSON: {e}")))?;

        debug!(stop = decision.is_stop(), "segment evaluated");
        Ok(decision)
    }
}

/// Models occasionally wrap the object in a markdown code fence despite the
/// prompt; tolerate that.
fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadline_core::Verdict;
    use threadline_shared::{AnthropicConfig, LlmErrorKind};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn segmenter(base: &str) -> AnthropicSegmenter {
        let config = AnthropicConfig {
            api_base: base.to_string(),
            request_timeout_secs: 5,
            ..AnthropicConfig::default()
        };
        AnthropicSegmenter::new(AnthropicClient::new(&config, "sk-test".into()).unwrap())
    }

    fn completion(text: &str) -> serde_json::Value {
        serde_json::json!({ "content": [{ "type": "text", "text": text }] })
    }

    #[tokio::test]
    async fn stop_verdict_parses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                r#"{"decision":"stop","completed_segment":"done part","incomplete_segment":"tail","detected_threads":["topic a"]}"#,
            )))
            .mount(&server)
            .await;

        let decision = segmenter(&server.uri())
            .evaluate_segment("some buffered utterances")
            .await
            .unwrap();
        assert_eq!(decision.decision, Verdict::Stop);
        assert_eq!(decision.completed_segment, "done part");
        assert_eq!(decision.incomplete_segment, "tail");
    }

    #[tokio::test]
    async fn fenced_verdict_is_tolerated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                "```json\n{\"decision\":\"continue\"}\n```",
            )))
            .mount(&server)
            .await;

        let decision = segmenter(&server.uri())
            .evaluate_segment("buffer")
            .await
            .unwrap();
        assert_eq!(decision.decision, Verdict::Continue);
    }

    #[tokio::test]
    async fn prose_verdict_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion("The conversation seems to continue.")),
            )
            .mount(&server)
            .await;

        let err = segmenter(&server.uri())
            .evaluate_segment("buffer")
            .await
            .unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::Malformed);
    }

    #[test]
    fn strip_fences_handles_plain_and_fenced() {
        assert_eq!(strip_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }
}
