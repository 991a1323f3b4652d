//! Router assembly and the `/ws/audio` handler.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use threadline_core::{Extractor, RetryPolicy, Segmenter};
use threadline_llm::{AnthropicClient, AnthropicExtractor, AnthropicSegmenter};
use threadline_shared::{validate_api_key, AppConfig, Result, ThreadlineError};
use threadline_storage::Storage;

use crate::asr::{run_asr_relay, AsrEvent, AsrInput};
use crate::frames::{ClientControl, ServerFrame};
use crate::http;
use crate::session::{ClientEvent, LiveSession, SessionEnd};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub extractor: Arc<dyn Extractor>,
    pub segmenter: Arc<dyn Segmenter>,
    pub storage: Arc<Storage>,
    pub asr_api_key: String,
}

/// Build the router over an already-assembled state. Split out from [`serve`]
/// so tests can drive the HTTP surface with fakes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(http::health))
        .route("/ws/audio", get(ws_audio))
        .route("/chunk", post(http::chunk_transcript))
        .route("/generate-context-stream", post(http::generate_context_stream))
        .route(
            "/conversations",
            get(http::list_conversations).post(http::create_conversation),
        )
        .route("/conversations/{id}", get(http::get_conversation))
        .with_state(state)
}

/// Resolve keys, open storage, and serve until shutdown.
pub async fn serve(config: AppConfig) -> Result<()> {
    let anthropic_key = validate_api_key(&config.anthropic.api_key_env)?;
    let asr_api_key = validate_api_key(&config.asr.api_key_env)?;

    let client = AnthropicClient::new(&config.anthropic, anthropic_key)?;
    let extractor: Arc<dyn Extractor> = Arc::new(AnthropicExtractor::new(client.clone()));
    let segmenter: Arc<dyn Segmenter> = Arc::new(AnthropicSegmenter::new(client));

    let storage = Arc::new(Storage::open(&expand_home(&config.defaults.output_dir)?).await?);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| ThreadlineError::config(format!("invalid bind address: {e}")))?;

    let state = AppState {
        config: Arc::new(config),
        extractor,
        segmenter,
        storage,
        asr_api_key,
    };

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ThreadlineError::Network(format!("failed to bind {addr}: {e}")))?;
    info!(address = %addr, "starting server");

    axum::serve(listener, router(state).into_make_service())
        .await
        .map_err(|e| ThreadlineError::Network(format!("server error: {e}")))
}

/// Expand a leading `~` against the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| ThreadlineError::config("could not determine home directory"))?;
        Ok(home.join(rest))
    } else {
        Ok(PathBuf::from(path))
    }
}

async fn ws_audio(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| handle_socket(state, socket))
}

/// Pump one browser session: binary frames flow to the ASR relay, control
/// frames to the session actor, and session output back over the socket.
async fn handle_socket(state: AppState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();

    let (frame_tx, mut frame_rx) = mpsc::channel::<ServerFrame>(64);
    // Hands the sink back once the channel drains, so the close frame below
    // goes out after every queued frame.
    let send_task = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            let payload = match serde_json::to_string(&frame) {
                Ok(payload) => payload,
                Err(e) => {
                    error!(error = %e, "failed to serialize server frame");
                    continue;
                }
            };
            if sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
        sender
    });

    let (audio_tx, audio_rx) = mpsc::channel::<AsrInput>(64);
    let (asr_events_tx, asr_events_rx) = mpsc::channel::<AsrEvent>(64);
    let asr_task = tokio::spawn(run_asr_relay(
        state.config.asr.clone(),
        state.asr_api_key.clone(),
        audio_rx,
        asr_events_tx,
    ));

    let (control_tx, control_rx) = mpsc::channel::<ClientEvent>(8);
    let session = LiveSession::new(
        &state.config.defaults,
        state.extractor.clone(),
        state.segmenter.clone(),
        RetryPolicy::from(&state.config.retry),
        Some(state.storage.clone()),
        frame_tx,
    );
    let mut session_task = tokio::spawn(session.run(asr_events_rx, control_rx));

    let joined = loop {
        tokio::select! {
            // The session ending mid-read means the ASR side failed; stop
            // reading and run the close handshake below.
            joined = &mut session_task => break joined,
            message = receiver.next() => {
                let Some(Ok(message)) = message else {
                    let _ = control_tx.send(ClientEvent::Disconnected).await;
                    break (&mut session_task).await;
                };
                match message {
                    Message::Binary(data) => {
                        let _ = audio_tx.send(AsrInput::Audio(data.to_vec())).await;
                    }
                    Message::Text(text) => match serde_json::from_str::<ClientControl>(text.as_str()) {
                        Ok(control) if control.final_flush => {
                            // Finalize upstream first so the session sees every
                            // pending transcript before the flush.
                            let _ = audio_tx.send(AsrInput::Terminate).await;
                            let _ = control_tx.send(ClientEvent::FinalFlush).await;
                            break (&mut session_task).await;
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "unexpected text frame"),
                    },
                    Message::Close(_) => {
                        let _ = control_tx.send(ClientEvent::Disconnected).await;
                        break (&mut session_task).await;
                    }
                    Message::Ping(_) | Message::Pong(_) => {}
                }
            }
        }
    };

    drop(audio_tx);
    drop(control_tx);

    let end = match joined {
        Ok(summary) => {
            info!(
                nodes = summary.nodes,
                segments = summary.segments,
                end = ?summary.end,
                "live session ended"
            );
            Some(summary.end)
        }
        Err(e) => {
            error!(error = %e, "session task panicked");
            None
        }
    };
    if let Err(e) = asr_task.await {
        error!(error = %e, "ASR task join failed");
    }

    // The session dropped its frame sender when it returned, so the send
    // task has drained the channel by the time it yields the sink.
    if let Ok(mut sender) = send_task.await {
        let close = match end {
            Some(SessionEnd::Flushed) => Some((close_code::NORMAL, "flush complete")),
            Some(SessionEnd::AsrFailed) | None => Some((close_code::ERROR, "speech backend lost")),
            // Nothing to close against; the client already went away.
            Some(SessionEnd::Disconnected) => None,
        };
        if let Some((code, reason)) = close {
            let _ = sender
                .send(Message::Close(Some(CloseFrame {
                    code,
                    reason: Utf8Bytes::from_static(reason),
                })))
                .await;
        }
    }
}
