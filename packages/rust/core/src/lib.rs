//! Conversation processing core: chunking, extraction orchestration, and
//! graph assembly.

pub mod accumulator;
pub mod chunker;
pub mod extract;
pub mod merge;
pub mod pipeline;
pub mod retry;

pub use accumulator::{Accumulator, PushOutcome, SegmentOutcome};
pub use chunker::chunk;
pub use extract::{Extractor, SegmentDecision, Segmenter, Verdict};
pub use merge::merge_nodes;
pub use pipeline::{ChunkUpdate, ExtractionPipeline};
pub use retry::{call_with_retry, RetryPolicy};
