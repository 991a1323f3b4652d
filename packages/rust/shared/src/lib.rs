//! Shared types, error model, and configuration for Threadline.
//!
//! This crate is the foundation depended on by all other Threadline crates.
//! It provides:
//! - [`ThreadlineError`] — the unified error type, plus [`LlmError`] for
//!   classified external-call failures
//! - Domain types ([`Node`], [`Chunk`], [`ChunkSet`], [`ConversationId`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AnthropicConfig, AppConfig, AsrConfig, DefaultsConfig, RetryConfig, ServerConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{LlmError, LlmErrorKind, Result, ThreadlineError};
pub use types::{
    Chunk, ChunkSet, ConversationArtifact, ConversationId, ConversationMeta, Node, NodeKind,
};
