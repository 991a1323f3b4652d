//! Single-owner live session state.
//!
//! All mutable session state (graph, buffer, chunk registry) lives inside one
//! [`LiveSession`] task. The websocket handler and the ASR relay communicate
//! with it over channels only, so there is no shared-state locking anywhere
//! in the live path.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use threadline_core::{
    call_with_retry, Accumulator, ExtractionPipeline, Extractor, PushOutcome, RetryPolicy,
    SegmentOutcome, Segmenter,
};
use threadline_shared::{
    Chunk, ChunkSet, ConversationArtifact, ConversationId, DefaultsConfig, Node,
};
use threadline_storage::Storage;

use crate::frames::ServerFrame;

/// Control events from the websocket read loop.
#[derive(Debug)]
pub enum ClientEvent {
    FinalFlush,
    Disconnected,
}

/// How a session came to an end. The handler picks the websocket close code
/// from this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client flushed; everything was acknowledged.
    Flushed,
    /// The ASR backend reported an error or became unreachable.
    AsrFailed,
    /// The client went away without flushing.
    Disconnected,
}

/// Outcome of a finished session, for the handler's logging.
#[derive(Debug)]
pub struct SessionSummary {
    pub nodes: usize,
    pub segments: usize,
    pub end: SessionEnd,
}

pub struct LiveSession {
    accumulator: Accumulator,
    graph: Vec<Node>,
    chunks: ChunkSet,
    snapshots: Vec<Vec<Node>>,
    pipeline: ExtractionPipeline,
    segmenter: Arc<dyn Segmenter>,
    policy: RetryPolicy,
    storage: Option<Arc<Storage>>,
    frame_tx: mpsc::Sender<ServerFrame>,
}

impl LiveSession {
    pub fn new(
        defaults: &DefaultsConfig,
        extractor: Arc<dyn Extractor>,
        segmenter: Arc<dyn Segmenter>,
        policy: RetryPolicy,
        storage: Option<Arc<Storage>>,
        frame_tx: mpsc::Sender<ServerFrame>,
    ) -> Self {
        Self {
            accumulator: Accumulator::new(defaults.batch_size, defaults.max_batch_size),
            graph: Vec::new(),
            chunks: ChunkSet::default(),
            snapshots: Vec::new(),
            pipeline: ExtractionPipeline::new(extractor, policy),
            segmenter,
            policy,
            storage,
            frame_tx,
        }
    }

    /// Drive the session until the client flushes, disconnects, or the ASR
    /// backend fails.
    #[instrument(skip_all)]
    pub async fn run(
        mut self,
        mut asr_events: mpsc::Receiver<crate::asr::AsrEvent>,
        mut control_rx: mpsc::Receiver<ClientEvent>,
    ) -> SessionSummary {
        use crate::asr::AsrEvent;

        let mut asr_open = true;
        let end = loop {
            tokio::select! {
                // Drain pending transcripts before honoring a flush, so the
                // flush sees everything the ASR already finalized.
                biased;

                event = asr_events.recv(), if asr_open => {
                    match event {
                        Some(AsrEvent::Final { text }) => self.on_utterance(&text).await,
                        Some(AsrEvent::Partial { .. }) => {}
                        Some(AsrEvent::SessionBegins { session_id }) => {
                            debug!(session_id, "ASR session started");
                        }
                        Some(AsrEvent::Error { message }) => {
                            warn!(message, "ASR failed, ending session");
                            self.send(ServerFrame::Error { detail: message }).await;
                            break SessionEnd::AsrFailed;
                        }
                        Some(AsrEvent::Closed) | None => {
                            // A clean close still leaves the client free to
                            // flush what was already transcribed.
                            asr_open = false;
                        }
                    }
                }
                control = control_rx.recv() => {
                    match control {
                        Some(ClientEvent::FinalFlush) => {
                            self.flush().await;
                            break SessionEnd::Flushed;
                        }
                        Some(ClientEvent::Disconnected) | None => {
                            warn!("client disconnected without flush, discarding session");
                            break SessionEnd::Disconnected;
                        }
                    }
                }
            }
        };

        SessionSummary {
            nodes: self.graph.len(),
            segments: self.chunks.len(),
            end,
        }
    }

    /// Buffer one finalized utterance and run segmentation when due.
    async fn on_utterance(&mut self, text: &str) {
        let outcome = match self.accumulator.push(text) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "utterance rejected");
                return;
            }
        };
        let PushOutcome::EvaluationDue(window) = outcome else {
            return;
        };

        let decision = call_with_retry(self.policy, "segment evaluation", || {
            self.segmenter.evaluate_segment(&window)
        })
        .await;

        let Some(decision) = decision else {
            // Evaluation failed outright: keep buffering. The threshold cap
            // still bounds the window, so the next verdict (or flush)
            // recovers the text.
            self.send(ServerFrame::Error {
                detail: "segment evaluation failed, continuing to buffer".into(),
            })
            .await;
            return;
        };

        if let SegmentOutcome::Completed { segment } = self.accumulator.apply_decision(&decision) {
            self.process_segment(segment).await;
        }
    }

    /// Extract a completed segment into the graph and push both views.
    async fn process_segment(&mut self, segment: String) {
        if segment.trim().is_empty() {
            return;
        }
        let chunk = Chunk::new(segment, self.chunks.len());
        let update = self.pipeline.process_chunk(&mut self.graph, &chunk).await;
        self.chunks.chunks.push(chunk);
        self.snapshots.push(self.graph.clone());

        if let Some(detail) = update.error {
            self.send(ServerFrame::Error { detail }).await;
        }
        self.send(ServerFrame::ExistingJson {
            data: self.graph.clone(),
        })
        .await;
        self.send(ServerFrame::ChunkDict {
            data: self.chunks.chunk_dict(),
        })
        .await;
    }

    /// Drain the buffer, persist the artifact, and acknowledge the flush.
    async fn flush(&mut self) {
        if let Some(remainder) = self.accumulator.flush() {
            self.process_segment(remainder).await;
        }

        if let Some(storage) = &self.storage {
            let id = ConversationId::new();
            let artifact = ConversationArtifact {
                file_name: format!("live-{id}"),
                conversation_id: id,
                chunks: self.chunks.chunk_dict(),
                graph_data: self.snapshots.clone(),
            };
            match storage.save_conversation(&artifact).await {
                Ok(meta) => info!(id = %meta.id, nodes = meta.no_of_nodes, "live session saved"),
                Err(e) => {
                    warn!(error = %e, "failed to persist live session");
                    self.send(ServerFrame::Error {
                        detail: format!("failed to persist session: {e}"),
                    })
                    .await;
                }
            }
        }

        self.send(ServerFrame::FlushAck).await;
        info!(
            nodes = self.graph.len(),
            segments = self.chunks.len(),
            "session flushed"
        );
    }

    async fn send(&self, frame: ServerFrame) {
        if self.frame_tx.send(frame).await.is_err() {
            debug!("frame receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::asr::AsrEvent;
    use threadline_core::{SegmentDecision, Verdict};
    use threadline_shared::LlmError;

    struct OneNodePerChunk;

    #[async_trait]
    impl Extractor for OneNodePerChunk {
        async fn extract_nodes(
            &self,
            _chunk_text: &str,
            existing_nodes: &[Node],
        ) -> Result<Vec<Node>, LlmError> {
            Ok(vec![Node::thread(format!("t{}", existing_nodes.len()))])
        }
    }

    /// Stops on every evaluation, consuming the whole window.
    struct AlwaysStop;

    #[async_trait]
    impl Segmenter for AlwaysStop {
        async fn evaluate_segment(&self, buffered: &str) -> Result<SegmentDecision, LlmError> {
            Ok(SegmentDecision {
                decision: Verdict::Stop,
                completed_segment: buffered.to_string(),
                incomplete_segment: String::new(),
                detected_threads: Vec::new(),
            })
        }
    }

    struct AlwaysFail;

    #[async_trait]
    impl Segmenter for AlwaysFail {
        async fn evaluate_segment(&self, _: &str) -> Result<SegmentDecision, LlmError> {
            Err(LlmError::fatal("backend down"))
        }
    }

    fn defaults(batch: usize, max: usize) -> DefaultsConfig {
        DefaultsConfig {
            batch_size: batch,
            max_batch_size: max,
            ..DefaultsConfig::default()
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 1,
            backoff_base: 2.0,
        }
    }

    /// Queue all events, then the control event, then run the session to
    /// completion. The biased select drains the ASR side first.
    async fn drive(
        session: LiveSession,
        events: Vec<AsrEvent>,
        control: ClientEvent,
    ) -> SessionSummary {
        let (asr_tx, asr_rx) = mpsc::channel(64);
        let (control_tx, control_rx) = mpsc::channel(8);

        for event in events {
            asr_tx.send(event).await.unwrap();
        }
        drop(asr_tx);
        control_tx.send(control).await.unwrap();

        session.run(asr_rx, control_rx).await
    }

    fn collect_frames(rx: &mut mpsc::Receiver<ServerFrame>) -> Vec<ServerFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    #[tokio::test]
    async fn stop_verdicts_produce_graph_and_chunk_frames() {
        let (frame_tx, mut frame_rx) = mpsc::channel(64);
        let session = LiveSession::new(
            &defaults(2, 8),
            Arc::new(OneNodePerChunk),
            Arc::new(AlwaysStop),
            policy(),
            None,
            frame_tx,
        );

        let summary = drive(
            session,
            vec![
                AsrEvent::Final {
                    text: "hello".into(),
                },
                AsrEvent::Final {
                    text: "world".into(),
                },
            ],
            ClientEvent::FinalFlush,
        )
        .await;

        assert_eq!(summary.end, SessionEnd::Flushed);
        assert_eq!(summary.segments, 1);
        assert_eq!(summary.nodes, 1);

        let frames = collect_frames(&mut frame_rx);
        assert!(matches!(
            frames[0],
            ServerFrame::ExistingJson { ref data } if data.len() == 1
        ));
        assert!(matches!(
            frames[1],
            ServerFrame::ChunkDict { ref data } if data.len() == 1
        ));
        assert!(matches!(frames.last(), Some(ServerFrame::FlushAck)));
    }

    #[tokio::test]
    async fn flush_drains_a_partial_buffer() {
        let (frame_tx, mut frame_rx) = mpsc::channel(64);
        let session = LiveSession::new(
            &defaults(4, 8),
            Arc::new(OneNodePerChunk),
            Arc::new(AlwaysStop),
            policy(),
            None,
            frame_tx,
        );

        // One utterance, below the threshold of four: no segmentation call
        // happens until the flush.
        let summary = drive(
            session,
            vec![AsrEvent::Final {
                text: "only one utterance".into(),
            }],
            ClientEvent::FinalFlush,
        )
        .await;

        assert_eq!(summary.end, SessionEnd::Flushed);
        assert_eq!(summary.segments, 1);

        let frames = collect_frames(&mut frame_rx);
        assert!(matches!(frames[0], ServerFrame::ExistingJson { .. }));
        assert!(matches!(frames.last(), Some(ServerFrame::FlushAck)));
    }

    #[tokio::test]
    async fn flush_of_empty_buffer_still_acknowledges() {
        let (frame_tx, mut frame_rx) = mpsc::channel(64);
        let session = LiveSession::new(
            &defaults(4, 8),
            Arc::new(OneNodePerChunk),
            Arc::new(AlwaysStop),
            policy(),
            None,
            frame_tx,
        );

        let summary = drive(session, Vec::new(), ClientEvent::FinalFlush).await;

        assert_eq!(summary.end, SessionEnd::Flushed);
        assert_eq!(summary.segments, 0);

        let frames = collect_frames(&mut frame_rx);
        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], ServerFrame::FlushAck));
    }

    #[tokio::test]
    async fn failed_evaluation_keeps_buffering() {
        let (frame_tx, mut frame_rx) = mpsc::channel(64);
        let session = LiveSession::new(
            &defaults(1, 4),
            Arc::new(OneNodePerChunk),
            Arc::new(AlwaysFail),
            policy(),
            None,
            frame_tx,
        );

        let summary = drive(
            session,
            vec![AsrEvent::Final {
                text: "something".into(),
            }],
            ClientEvent::Disconnected,
        )
        .await;

        assert_eq!(summary.end, SessionEnd::Disconnected);
        assert_eq!(summary.segments, 0);

        let frames = collect_frames(&mut frame_rx);
        assert!(matches!(frames[0], ServerFrame::Error { .. }));
    }

    #[tokio::test]
    async fn asr_error_ends_the_session() {
        let (frame_tx, mut frame_rx) = mpsc::channel(64);
        let session = LiveSession::new(
            &defaults(4, 8),
            Arc::new(OneNodePerChunk),
            Arc::new(AlwaysStop),
            policy(),
            None,
            frame_tx,
        );

        // The error arrives before the flush; the biased select sees it
        // first and the session ends without acknowledging anything.
        let summary = drive(
            session,
            vec![
                AsrEvent::Final {
                    text: "hello".into(),
                },
                AsrEvent::Error {
                    message: "speech backend unavailable: handshake refused".into(),
                },
            ],
            ClientEvent::FinalFlush,
        )
        .await;

        assert_eq!(summary.end, SessionEnd::AsrFailed);

        let frames = collect_frames(&mut frame_rx);
        assert!(matches!(frames.last(), Some(ServerFrame::Error { .. })));
        assert!(!frames.iter().any(|f| matches!(f, ServerFrame::FlushAck)));
    }

    #[tokio::test]
    async fn disconnect_without_flush_discards() {
        let (frame_tx, mut frame_rx) = mpsc::channel(64);
        let session = LiveSession::new(
            &defaults(4, 8),
            Arc::new(OneNodePerChunk),
            Arc::new(AlwaysStop),
            policy(),
            None,
            frame_tx,
        );

        let summary = drive(
            session,
            vec![AsrEvent::Final {
                text: "unsaved".into(),
            }],
            ClientEvent::Disconnected,
        )
        .await;

        assert_eq!(summary.end, SessionEnd::Disconnected);
        assert!(collect_frames(&mut frame_rx).is_empty());
    }
}
