//! Upstream realtime speech-recognition relay.
//!
//! One relay task per browser session: it owns the websocket to the ASR
//! backend, forwards PCM audio upstream, and emits typed transcript events
//! downstream. An unexpected upstream close triggers a bounded reconnect;
//! audio arriving while disconnected is dropped rather than buffered.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use threadline_shared::{AsrConfig, Result, ThreadlineError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const RECONNECT_DELAY: Duration = Duration::from_millis(500);

/// Audio-side input to the relay.
#[derive(Debug)]
pub enum AsrInput {
    /// Raw 16-bit PCM bytes from the browser.
    Audio(Vec<u8>),
    /// Ask the upstream to finalize and close cleanly.
    Terminate,
}

/// Transcript-side output of the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsrEvent {
    SessionBegins { session_id: String },
    /// In-flight hypothesis; superseded by the next event.
    Partial { text: String },
    /// Finalized utterance, safe to accumulate.
    Final { text: String },
    Error { message: String },
    /// Upstream is gone and reconnection attempts are exhausted.
    Closed,
}

#[derive(Debug, Deserialize)]
struct UpstreamMessage {
    #[serde(default)]
    message_type: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

enum ConnectionEnd {
    /// Clean terminate/close; do not reconnect.
    Finished,
    /// Upstream dropped while the session was still live.
    Lost(String),
}

/// Run the relay until the audio channel closes, a terminate is processed,
/// or the reconnect budget is spent.
pub async fn run_asr_relay(
    config: AsrConfig,
    api_key: String,
    mut audio_rx: mpsc::Receiver<AsrInput>,
    events_tx: mpsc::Sender<AsrEvent>,
) -> Result<()> {
    let url = format!(
        "{}?sample_rate={}&token={}",
        config.websocket_url, config.sample_rate, api_key
    );

    let mut attempts_left = config.reconnect_attempts;
    loop {
        match run_connection(&url, &mut audio_rx, &events_tx).await {
            Ok(ConnectionEnd::Finished) => {
                let _ = events_tx.send(AsrEvent::Closed).await;
                return Ok(());
            }
            Ok(ConnectionEnd::Lost(reason)) | Err(ThreadlineError::Network(reason)) => {
                if attempts_left == 0 {
                    warn!(reason, "ASR connection lost, reconnect budget spent");
                    let _ = events_tx
                        .send(AsrEvent::Error {
                            message: format!("speech backend unavailable: {reason}"),
                        })
                        .await;
                    let _ = events_tx.send(AsrEvent::Closed).await;
                    return Err(ThreadlineError::Network(reason));
                }
                attempts_left -= 1;
                warn!(reason, attempts_left, "ASR connection lost, reconnecting");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn run_connection(
    url: &str,
    audio_rx: &mut mpsc::Receiver<AsrInput>,
    events_tx: &mpsc::Sender<AsrEvent>,
) -> Result<ConnectionEnd> {
    let (stream, _) = timeout(CONNECT_TIMEOUT, connect_async(url))
        .await
        .map_err(|_| ThreadlineError::Network("ASR connect timed out".into()))?
        .map_err(|e| ThreadlineError::Network(format!("ASR connect failed: {e}")))?;

    info!("connected to ASR backend");
    let (mut write, mut read) = stream.split();
    let mut terminating = false;

    loop {
        tokio::select! {
            input = audio_rx.recv(), if !terminating => {
                match input {
                    Some(AsrInput::Audio(bytes)) => {
                        if let Err(e) = write.send(Message::Binary(bytes.into())).await {
                            return Ok(ConnectionEnd::Lost(format!("audio send failed: {e}")));
                        }
                    }
                    Some(AsrInput::Terminate) | None => {
                        terminating = true;
                        if let Err(e) = write
                            .send(Message::Text(r#"{"terminate_session": true}"#.into()))
                            .await
                        {
                            debug!(error = %e, "terminate send failed, upstream already gone");
                            return Ok(ConnectionEnd::Finished);
                        }
                    }
                }
            }
            frame = read.next() => {
                let Some(frame) = frame else {
                    return if terminating {
                        Ok(ConnectionEnd::Finished)
                    } else {
                        Ok(ConnectionEnd::Lost("upstream stream ended".into()))
                    };
                };
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(e) => {
                        return if terminating {
                            Ok(ConnectionEnd::Finished)
                        } else {
                            Ok(ConnectionEnd::Lost(format!("read failed: {e}")))
                        };
                    }
                };

                match frame {
                    Message::Text(text) => {
                        if let Some(event) = parse_upstream(text.as_str()) {
                            let done = matches!(event, AsrEvent::Closed);
                            if done {
                                return Ok(ConnectionEnd::Finished);
                            }
                            if events_tx.send(event).await.is_err() {
                                // Session side hung up; nothing left to relay.
                                return Ok(ConnectionEnd::Finished);
                            }
                        }
                    }
                    Message::Close(_) => {
                        return if terminating {
                            Ok(ConnectionEnd::Finished)
                        } else {
                            Ok(ConnectionEnd::Lost("upstream closed".into()))
                        };
                    }
                    Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {}
                    Message::Frame(_) => {}
                }
            }
        }
    }
}

/// Map one upstream JSON payload onto a typed event. Unknown message types
/// are dropped.
fn parse_upstream(raw: &str) -> Option<AsrEvent> {
    let message: UpstreamMessage = match serde_json::from_str(raw) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "unparseable ASR payload");
            return None;
        }
    };

    if let Some(error) = message.error {
        return Some(AsrEvent::Error { message: error });
    }

    match message.message_type.as_str() {
        "SessionBegins" => Some(AsrEvent::SessionBegins {
            session_id: message.session_id.unwrap_or_default(),
        }),
        "PartialTranscript" => Some(AsrEvent::Partial {
            text: message.text.unwrap_or_default(),
        }),
        "FinalTranscript" => Some(AsrEvent::Final {
            text: message.text.unwrap_or_default(),
        }),
        "SessionTerminated" => Some(AsrEvent::Closed),
        other => {
            debug!(message_type = other, "ignoring ASR message");
            None
        }
    }
}
