//! Seams between the pipeline and whichever model backend fulfils it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use threadline_shared::{LlmError, Node};

/// Turns one chunk of conversation text into graph nodes, given the nodes
/// extracted so far as context.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract_nodes(
        &self,
        chunk_text: &str,
        existing_nodes: &[Node],
    ) -> Result<Vec<Node>, LlmError>;
}

/// Judges whether a buffered run of utterances forms a complete
/// conversational segment.
#[async_trait]
pub trait Segmenter: Send + Sync {
    async fn evaluate_segment(&self, buffered_text: &str) -> Result<SegmentDecision, LlmError>;
}

/// Verdict returned by a [`Segmenter`] over a buffered transcript window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentDecision {
    /// `continue` or `stop`.
    pub decision: Verdict,
    /// The portion judged to be a finished segment. Meaningful on `stop`.
    #[serde(default)]
    pub completed_segment: String,
    /// The trailing portion still in flight. Carried into the next buffer.
    #[serde(default)]
    pub incomplete_segment: String,
    /// Thread topics the model spotted inside the window.
    #[serde(default)]
    pub detected_threads: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Continue,
    Stop,
}

impl SegmentDecision {
    pub fn is_stop(&self) -> bool {
        self.decision == Verdict::Stop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_parses_from_model_output() {
        let raw = r#"{
            "decision": "stop",
            "completed_segment": "so that's the plan for the launch",
            "incomplete_segment": "one more thing",
            "detected_threads": ["launch planning"]
        }"#;
        let decision: SegmentDecision = serde_json::from_str(raw).unwrap();
        assert!(decision.is_stop());
        assert_eq!(decision.detected_threads, vec!["launch planning"]);
    }

    #[test]
    fn missing_optional_fields_default_to_empty() {
        let decision: SegmentDecision =
            serde_json::from_str(r#"{"decision": "continue"}"#).unwrap();
        assert!(!decision.is_stop());
        assert!(decision.completed_segment.is_empty());
        assert!(decision.detected_threads.is_empty());
    }
}
