//! Node extraction over the messages API.

use async_trait::async_trait;
use tracing::{debug, instrument};

use threadline_core::Extractor;
use threadline_shared::{LlmError, Node};

use crate::client::AnthropicClient;
use crate::prompts;

/// Assistant prefill that forces the completion to open a JSON array. The
/// model returns only the remainder, so the prefix is glued back on before
/// parsing.
const ARRAY_PREFILL: &str = "[\n{";

pub struct AnthropicExtractor {
    client: AnthropicClient,
}

impl AnthropicExtractor {
    pub fn new(client: AnthropicClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Extractor for AnthropicExtractor {
    #[instrument(skip_all, fields(existing = existing_nodes.len()))]
    async fn extract_nodes(
        &self,
        chunk_text: &str,
        existing_nodes: &[Node],
    ) -> Result<Vec<Node>, LlmError> {
        let existing = serde_json::to_string(existing_nodes)
            .map_err(|e| LlmError::fatal(format!("could not serialize graph: {e}")))?;
        let input =
            format!("Existing JSON : \n {existing} \n\n Transcript Input: \n {chunk_text}");

        let completion = self
            .client
            .complete(prompts::NODE_EXTRACTION, &input, Some(ARRAY_PREFILL))
            .await?;

        let json_text = format!("{ARRAY_PREFILL}{completion}");
        let nodes: Vec<Node> = serde_json::from_str(&json_text)
            .map_err(|e| LlmError::malformed(format!("invalid node JSON: {e}")))?;

        debug!(extracted = nodes.len(), "nodes extracted");
        Ok(nodes)
    }
}
