//! Chunk-by-chunk graph construction.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument};

use threadline_shared::{Chunk, ChunkSet, Node};

use crate::extract::Extractor;
use crate::merge::merge_nodes;
use crate::retry::{call_with_retry, RetryPolicy};

/// Per-chunk progress report, serialized as one NDJSON line to streaming
/// consumers. `chunk` is 1-based; `existing_json` always carries the full
/// graph so far, even when the chunk itself failed.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkUpdate {
    pub chunk: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub existing_json: Vec<Node>,
}

/// Drives extraction over a chunk set, folding each chunk's nodes into the
/// shared graph. One pipeline is built per conversation.
pub struct ExtractionPipeline {
    extractor: Arc<dyn Extractor>,
    policy: RetryPolicy,
}

impl ExtractionPipeline {
    pub fn new(extractor: Arc<dyn Extractor>, policy: RetryPolicy) -> Self {
        Self { extractor, policy }
    }

    /// Extract nodes for one chunk and merge them into `graph`.
    ///
    /// A chunk whose extraction fails (after retries) reports the error in
    /// the update and leaves the graph untouched; processing continues with
    /// the next chunk.
    #[instrument(skip_all, fields(chunk = chunk.ordinal))]
    pub async fn process_chunk(&self, graph: &mut Vec<Node>, chunk: &Chunk) -> ChunkUpdate {
        let existing: &[Node] = graph;
        let extracted = call_with_retry(self.policy, "node extraction", || {
            self.extractor.extract_nodes(&chunk.text, existing)
        })
        .await;

        let error = match extracted {
            Some(nodes) => {
                let added = merge_nodes(graph, nodes, chunk);
                info!(added, total = graph.len(), "chunk processed");
                None
            }
            None => Some(format!(
                "extraction failed for chunk {}",
                chunk.ordinal + 1
            )),
        };

        ChunkUpdate {
            chunk: chunk.ordinal + 1,
            error,
            existing_json: graph.clone(),
        }
    }

    /// Process every chunk in order, invoking `on_update` after each one.
    /// Returns the completed graph.
    pub async fn run<F>(&self, chunks: &ChunkSet, mut on_update: F) -> Vec<Node>
    where
        F: FnMut(&ChunkUpdate),
    {
        let mut graph = Vec::new();
        for chunk in &chunks.chunks {
            let update = self.process_chunk(&mut graph, chunk).await;
            on_update(&update);
        }
        graph
    }
}
