//! REST surface: batch NDJSON streaming plus the conversation index.

use std::convert::Infallible;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use threadline_core::{chunk, ChunkUpdate, ExtractionPipeline, RetryPolicy};
use threadline_shared::{ConversationArtifact, ConversationId, ConversationMeta};

use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub transcript: String,
    #[serde(default)]
    pub file_name: Option<String>,
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Split a transcript into its chunk map without running extraction, so a
/// client can inspect or edit the windows first.
pub async fn chunk_transcript(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Response {
    if request.transcript.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "no valid transcript input provided");
    }
    let defaults = &state.config.defaults;
    match chunk(&request.transcript, defaults.chunk_size, defaults.chunk_overlap) {
        Ok(chunks) => Json(json!({ "chunks": chunks.chunk_dict() })).into_response(),
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

/// Process a transcript chunk by chunk, streaming one NDJSON line per chunk.
///
/// Every line carries the cumulative graph; a failed chunk reports its error
/// inline and the stream keeps going. Lines are paced so a consuming UI can
/// render incrementally. The finished conversation is persisted after the
/// last chunk.
#[instrument(skip_all, fields(transcript_bytes = request.transcript.len()))]
pub async fn generate_context_stream(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Response {
    if request.transcript.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "no valid transcript input provided");
    }

    let defaults = state.config.defaults.clone();
    let chunks = match chunk(&request.transcript, defaults.chunk_size, defaults.chunk_overlap) {
        Ok(chunks) => chunks,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };
    info!(chunks = chunks.len(), "starting batch extraction");

    let pipeline = ExtractionPipeline::new(state.extractor.clone(), RetryPolicy::from(&state.config.retry));
    let storage = state.storage.clone();
    let file_name = request
        .file_name
        .unwrap_or_else(|| "transcript.txt".to_string());
    let pacing = Duration::from_millis(defaults.push_interval_ms);

    let stream = async_stream::stream! {
        let mut graph = Vec::new();
        let mut snapshots = Vec::new();
        let total = chunks.len();

        for (i, chunk) in chunks.chunks.iter().enumerate() {
            let update = pipeline.process_chunk(&mut graph, chunk).await;
            snapshots.push(graph.clone());
            yield Ok::<_, Infallible>(ndjson_line(&update));
            if i + 1 < total {
                tokio::time::sleep(pacing).await;
            }
        }

        let artifact = ConversationArtifact {
            file_name,
            conversation_id: ConversationId::new(),
            chunks: chunks.chunk_dict(),
            graph_data: snapshots,
        };
        if let Err(e) = storage.save_conversation(&artifact).await {
            warn!(error = %e, "failed to persist batch conversation");
        }
    };

    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(stream),
    )
        .into_response()
}

fn ndjson_line(update: &ChunkUpdate) -> String {
    match serde_json::to_string(update) {
        Ok(line) => format!("{line}\n"),
        // Node content is plain JSON-safe data; this only fires on a bug.
        Err(e) => format!(
            "{}\n",
            json!({ "chunk": update.chunk, "error": format!("serialization failed: {e}"), "existing_json": [] })
        ),
    }
}

/// List saved conversations, most recent first.
pub async fn list_conversations(
    State(state): State<AppState>,
) -> Result<Json<Vec<ConversationMeta>>, Response> {
    state
        .storage
        .list_conversations()
        .await
        .map(Json)
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))
}

/// Fetch one conversation's full artifact.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationArtifact>, Response> {
    match state.storage.get_conversation(&id).await {
        Ok(Some(meta)) => state
            .storage
            .read_artifact(&meta)
            .map(Json)
            .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())),
        Ok(None) => Err(error_response(
            StatusCode::NOT_FOUND,
            &format!("conversation {id} not found"),
        )),
        Err(e) => Err(error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &e.to_string(),
        )),
    }
}

/// Import a complete conversation artifact (e.g. saved client-side).
pub async fn create_conversation(
    State(state): State<AppState>,
    Json(artifact): Json<ConversationArtifact>,
) -> Result<(StatusCode, Json<ConversationMeta>), Response> {
    state
        .storage
        .save_conversation(&artifact)
        .await
        .map(|meta| (StatusCode::CREATED, Json(meta)))
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
