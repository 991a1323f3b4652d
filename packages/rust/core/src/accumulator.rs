//! Adaptive utterance accumulation for live segmentation.
//!
//! Utterances buffer up until an evaluation threshold is reached; the caller
//! then asks a [`Segmenter`](crate::Segmenter) for a verdict and feeds it back
//! through [`Accumulator::apply_decision`]. A `continue` verdict widens the
//! window by one batch; at the cap the buffer is force-closed so a rambling
//! conversation cannot grow the window without bound.

use tracing::debug;

use threadline_shared::{Result, ThreadlineError};

use crate::extract::SegmentDecision;

/// Buffers utterances and tracks the moving evaluation threshold.
#[derive(Debug)]
pub struct Accumulator {
    buffer: Vec<String>,
    threshold: usize,
    batch_size: usize,
    max_batch_size: usize,
    flushed: bool,
}

/// What [`Accumulator::push`] did with an utterance.
#[derive(Debug, PartialEq, Eq)]
pub enum PushOutcome {
    /// Below threshold; nothing to evaluate yet.
    Buffered,
    /// Threshold reached; evaluate this window and feed back the decision.
    EvaluationDue(String),
}

/// Result of applying a segmentation verdict to the buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum SegmentOutcome {
    /// Verdict was `continue`; the window widened to `new_threshold`.
    Grew { new_threshold: usize },
    /// A segment closed, either by verdict or by hitting the cap. The segment
    /// is empty when a stop verdict carried no completed text.
    Completed { segment: String },
}

impl Accumulator {
    pub fn new(batch_size: usize, max_batch_size: usize) -> Self {
        Self {
            buffer: Vec::new(),
            threshold: batch_size,
            batch_size,
            max_batch_size,
            flushed: false,
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Append one finalized utterance. Returns the joined window once the
    /// buffer reaches the current threshold.
    pub fn push(&mut self, utterance: &str) -> Result<PushOutcome> {
        if self.flushed {
            return Err(ThreadlineError::session(
                "utterance received after final flush",
            ));
        }
        let trimmed = utterance.trim();
        if trimmed.is_empty() {
            return Ok(PushOutcome::Buffered);
        }
        self.buffer.push(trimmed.to_owned());
        if self.buffer.len() >= self.threshold {
            Ok(PushOutcome::EvaluationDue(self.buffer.join(" ")))
        } else {
            Ok(PushOutcome::Buffered)
        }
    }

    /// Fold a segmenter verdict back into the buffer.
    pub fn apply_decision(&mut self, decision: &SegmentDecision) -> SegmentOutcome {
        if decision.is_stop() {
            // The verdict partitions the window; an empty completed part means
            // there is nothing to extract this round.
            let segment = decision.completed_segment.trim().to_owned();
            self.buffer.clear();
            let leftover = decision.incomplete_segment.trim();
            if !leftover.is_empty() {
                self.buffer.push(leftover.to_owned());
            }
            self.threshold = self.batch_size;
            debug!(leftover = self.buffer.len(), "segment closed by verdict");
            return SegmentOutcome::Completed { segment };
        }

        if self.threshold >= self.max_batch_size {
            // Cap reached: force-close the whole buffer as one segment.
            let segment = self.buffer.join(" ");
            self.buffer.clear();
            self.threshold = self.batch_size;
            debug!(cap = self.max_batch_size, "segment force-closed at cap");
            return SegmentOutcome::Completed { segment };
        }

        self.threshold += self.batch_size;
        debug!(threshold = self.threshold, "window widened");
        SegmentOutcome::Grew {
            new_threshold: self.threshold,
        }
    }

    /// Drain whatever remains as a final segment and refuse further pushes.
    pub fn flush(&mut self) -> Option<String> {
        self.flushed = true;
        if self.buffer.is_empty() {
            return None;
        }
        let segment = self.buffer.join(" ");
        self.buffer.clear();
        Some(segment)
    }
}
