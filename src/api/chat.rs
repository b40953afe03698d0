//! Chat API
//!
//! `POST /api/chat` runs one query through the engine and returns the final
//! response as JSON. `POST /api/chat/stream` does the same but streams engine
//! progress events over SSE before the final payload, terminated by a
//! `[DONE]` marker.

use crate::api::ApiContext;
use crate::engine::{ProgressSink, RunInput};
use crate::error::AppError;
use crate::session::Turn;
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::Response,
    Json,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum query length in characters
pub const MAX_QUERY_LENGTH: usize = 10_000; // 10KB

/// Chat request
#[derive(Deserialize, Debug)]
pub struct ChatRequest {
    /// The user's query
    pub message: String,
    /// Optional conversation ID for maintaining context
    #[serde(default)]
    pub session_id: Option<Uuid>,
    /// Optional user identifier (defaults to "anonymous")
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Chat response
#[derive(Serialize, Debug)]
pub struct ChatResponse {
    /// Final response text
    pub response: String,
    /// Overall confidence in [0, 1]
    pub confidence: f64,
    /// The conversation ID (same as input or newly generated)
    pub session_id: Uuid,
    /// Workers that produced a result
    pub workers_invoked: Vec<String>,
    /// Diagnosed severity, when available
    pub severity: Option<String>,
    /// Number of validated recommendations
    pub recommendations_count: usize,
    /// Requery rounds spent
    pub requery_count: u32,
    /// Workers that failed, with their error messages
    pub worker_errors: std::collections::BTreeMap<String, String>,
    /// Reasoning trace accumulated across phases
    pub reasoning: String,
    /// Wall-clock duration of the run in milliseconds
    pub execution_time_ms: u64,
}

/// Validate the chat message
fn validate_message(message: &str) -> Result<(), AppError> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidRequest(
            "Message cannot be empty".to_string(),
        ));
    }
    if trimmed.len() > MAX_QUERY_LENGTH {
        return Err(AppError::InvalidRequest(format!(
            "Message exceeds maximum length of {} characters",
            MAX_QUERY_LENGTH
        )));
    }
    Ok(())
}

/// POST /api/chat - run one query through the engine
pub async fn chat(
    State(ctx): State<ApiContext>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    validate_message(&request.message)?;

    let session_id = request.session_id.unwrap_or_else(Uuid::new_v4);
    let user_id = request.user_id.unwrap_or_else(|| "anonymous".to_string());

    tracing::info!(
        session_id = %session_id,
        user_id = %user_id,
        message_len = request.message.len(),
        "Chat request received"
    );

    let history = ctx
        .sessions
        .recent(session_id, ctx.engine.config().history_limit)
        .await;

    let outcome = ctx
        .engine
        .execute(RunInput {
            query: request.message.clone(),
            session_id: Some(session_id),
            user_id,
            history,
        })
        .await;

    ctx.sessions
        .append(session_id, Turn::user(request.message))
        .await;
    ctx.sessions
        .append(session_id, Turn::assistant(outcome.response.clone()))
        .await;

    Ok(Json(ChatResponse {
        response: outcome.response,
        confidence: outcome.confidence,
        session_id,
        workers_invoked: outcome.workers_invoked,
        severity: outcome.severity.map(|s| s.to_string()),
        recommendations_count: outcome.recommendations.len(),
        requery_count: outcome.requery_count,
        worker_errors: outcome.worker_errors,
        reasoning: outcome.reasoning.join("\n"),
        execution_time_ms: outcome.execution_time_ms as u64,
    }))
}

/// Helper function to format a stream into SSE (Server-Sent Events) format
///
/// Each item is formatted as "data: <content>\n\n".
fn format_sse_stream(
    stream: impl futures_util::Stream<Item = Result<String, axum::Error>> + Send + 'static,
) -> impl futures_util::Stream<Item = Result<String, std::io::Error>> {
    stream.map(|event_result| {
        let sse_text = match event_result {
            Ok(data) => format!("data: {}\n\n", data),
            Err(e) => format!("data: [ERROR] {}\n\n", e),
        };
        Ok::<_, std::io::Error>(sse_text)
    })
}

/// POST /api/chat/stream - run one query, streaming progress events via SSE
///
/// The stream carries one JSON object per progress event, a final payload of
/// type "final" with the response, then a `[DONE]` marker.
pub async fn chat_stream(
    State(ctx): State<ApiContext>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, AppError> {
    use async_stream::stream;

    validate_message(&request.message)?;

    let session_id = request.session_id.unwrap_or_else(Uuid::new_v4);
    let user_id = request.user_id.unwrap_or_else(|| "anonymous".to_string());
    let message = request.message;

    let history = ctx
        .sessions
        .recent(session_id, ctx.engine.config().history_limit)
        .await;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let engine = ctx.engine.clone();
    let sessions = ctx.sessions.clone();
    let run_input = RunInput {
        query: message.clone(),
        session_id: Some(session_id),
        user_id,
        history,
    };

    // The sink is dropped when the run finishes, closing the event channel
    let run = tokio::spawn(async move {
        engine
            .execute_with_progress(run_input, ProgressSink::new(tx))
            .await
    });

    let stream = stream! {
        while let Some(event) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&event) {
                yield Ok::<String, axum::Error>(json);
            }
        }

        match run.await {
            Ok(outcome) => {
                sessions.append(session_id, Turn::user(message)).await;
                sessions
                    .append(session_id, Turn::assistant(outcome.response.clone()))
                    .await;

                let final_payload = serde_json::json!({
                    "type": "final",
                    "response": outcome.response,
                    "confidence": outcome.confidence,
                    "session_id": session_id,
                    "workers_invoked": outcome.workers_invoked,
                    "requery_count": outcome.requery_count,
                });
                yield Ok::<String, axum::Error>(final_payload.to_string());
            }
            Err(e) => {
                tracing::error!(error = %e, "Engine task failed");
                let error_payload = serde_json::json!({
                    "type": "error",
                    "message": e.to_string(),
                });
                yield Ok::<String, axum::Error>(error_payload.to_string());
            }
        }

        yield Ok::<String, axum::Error>("[DONE]".to_string());
    };

    let sse_stream = format_sse_stream(stream);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(sse_stream))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build response: {}", e)))
}
