//! Error types for Threadline.
//!
//! Library crates use [`ThreadlineError`] via `thiserror`.
//! App crates wrap this with `color-eyre` for rich diagnostics.
//!
//! External LLM calls additionally classify their failures with
//! [`LlmErrorKind`] so the retry combinator can decide whether an attempt
//! is worth repeating.

use std::path::PathBuf;

/// Top-level error type for all Threadline operations.
#[derive(Debug, thiserror::Error)]
pub enum ThreadlineError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network error talking to the LLM or ASR backend.
    #[error("network error: {0}")]
    Network(String),

    /// Extraction call failed after exhausting its retry budget.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// Segmentation call failed after exhausting its retry budget.
    #[error("segmentation error: {0}")]
    Segmentation(String),

    /// Database or artifact storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Live session protocol or transport error.
    #[error("session error: {0}")]
    Session(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad chunk parameters, malformed input, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ThreadlineError>;

impl ThreadlineError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a session error from any displayable message.
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// LLM error classification
// ---------------------------------------------------------------------------

/// How an external LLM call failed, from the retry combinator's point of view.
///
/// This replaces per-subtype exception handling with a single switch: the
/// adapter that makes the call decides the kind once, and every retry site
/// reacts uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// Not worth retrying: credential rejection, or anything unclassified.
    Fatal,
    /// Transient backend condition: rate limit, overload, 5xx.
    Retryable,
    /// The call succeeded at the transport level but the structured response
    /// could not be parsed. Retried, since model output is nondeterministic.
    Malformed,
}

/// A classified failure from an external LLM call.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
}

impl LlmError {
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self {
            kind: LlmErrorKind::Fatal,
            message: msg.into(),
        }
    }

    pub fn retryable(msg: impl Into<String>) -> Self {
        Self {
            kind: LlmErrorKind::Retryable,
            message: msg.into(),
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self {
            kind: LlmErrorKind::Malformed,
            message: msg.into(),
        }
    }

    /// Whether this failure should consume another retry attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            LlmErrorKind::Retryable | LlmErrorKind::Malformed
        )
    }
}
