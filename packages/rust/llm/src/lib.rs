//! Messages-API adapters implementing the extraction and segmentation seams.

pub mod client;
pub mod extractor;
pub mod prompts;
pub mod segmenter;

pub use client::AnthropicClient;
pub use extractor::AnthropicExtractor;
pub use segmenter::AnthropicSegmenter;
