//! HTTP/WebSocket Handlers

use axum::{
    Json,
    extract::{
        Path, Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use chi_core::{
    AgentError, AgentEvent, CollectedDataRecord, ConversationId, ConversationSummary, HistoryStore, JobId,
    JobStatus,
};

use crate::state::AppState;

pub const DEFAULT_HISTORY_LIMIT: usize = 30;
pub const DEFAULT_DATA_LIMIT: usize = 50;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub response: String,
}

#[derive(Debug, Serialize)]
pub struct AskAsyncResponse {
    pub job_id: JobId,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: JobStatus,
}

/// Status-bar module output
#[derive(Debug, Serialize)]
pub struct IndicatorResponse {
    pub text: String,
    pub tooltip: &'static str,
    pub class: String,
}

/// `?limit=N`; a negative value means no limit
#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

impl LimitQuery {
    fn or_default(&self, default: usize) -> usize {
        match self.limit {
            None => default,
            Some(limit) => usize::try_from(limit).unwrap_or(usize::MAX),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub backend_connected: bool,
    pub tools: Vec<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let backend_connected = state.provider.health_check().await.unwrap_or(false);

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        backend_connected,
        tools: state
            .controller
            .agent()
            .tools()
            .names()
            .into_iter()
            .map(String::from)
            .collect(),
    })
}

/// Run one turn and answer when it is done
pub async fn ask(State(state): State<AppState>, Json(payload): Json<AskRequest>) -> Json<AskResponse> {
    let response = state.controller.ask(&payload.prompt).await;
    Json(AskResponse { response })
}

/// Queue one turn; the answer arrives as a `response_ready` event
pub async fn ask_async(
    State(state): State<AppState>,
    Json(payload): Json<AskRequest>,
) -> Json<AskAsyncResponse> {
    let job_id = state.controller.ask_async(payload.prompt);
    Json(AskAsyncResponse { job_id })
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: state.controller.status(),
    })
}

/// Colored dot for a desktop status bar
pub async fn status_indicator(State(state): State<AppState>) -> Json<IndicatorResponse> {
    Json(indicator(state.controller.status()))
}

fn indicator(status: JobStatus) -> IndicatorResponse {
    let (color, tooltip) = match status {
        JobStatus::Ready => ("#5a8a6a", "chi ready"),
        JobStatus::Thinking => ("#d4a85a", "chi thinking…"),
        JobStatus::Error => ("#c05050", "chi error"),
    };
    IndicatorResponse {
        text: format!("<span color=\"{}\">●</span>", color),
        tooltip,
        class: format!("chi-{}", status),
    }
}

/// Most recent conversations, newest first
pub async fn history(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Json<Vec<ConversationSummary>> {
    let limit = query.or_default(DEFAULT_HISTORY_LIMIT);
    match state.controller.store().list_conversations(limit) {
        Ok(conversations) => Json(conversations),
        Err(e) => {
            tracing::warn!(error = %e, "Could not read history");
            Json(Vec::new())
        }
    }
}

/// Most recent tool outputs, newest first
pub async fn collected_data(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Json<Vec<CollectedDataRecord>> {
    let limit = query.or_default(DEFAULT_DATA_LIMIT);
    match state.controller.store().list_tool_outputs(limit) {
        Ok(records) => Json(records),
        Err(e) => {
            tracing::warn!(error = %e, "Could not read collected data");
            Json(Vec::new())
        }
    }
}

pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<ConversationId>,
) -> Json<DeleteResponse> {
    let deleted = write_store(&state, move |store| store.delete_conversation(id))
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(conversation = id, error = %e, "Could not delete conversation");
            false
        });
    Json(DeleteResponse { deleted })
}

pub async fn clear_history(State(state): State<AppState>) {
    if let Err(e) = write_store(&state, |store| store.clear_all()).await {
        tracing::warn!(error = %e, "Could not clear history");
    }
}

pub async fn clear_data(State(state): State<AppState>) {
    if let Err(e) = write_store(&state, |store| store.clear_tool_outputs()).await {
        tracing::warn!(error = %e, "Could not clear collected data");
    }
}

/// Run a history write on the blocking pool; file-backed stores fsync
async fn write_store<T, F>(state: &AppState, op: F) -> chi_core::Result<T>
where
    F: FnOnce(&dyn HistoryStore) -> chi_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(state.controller.store());
    tokio::task::spawn_blocking(move || op(store.as_ref()))
        .await
        .unwrap_or_else(|e| Err(AgentError::Storage(format!("History writer failed: {}", e))))
}

/// WebSocket feed of controller events
pub async fn events_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    // Subscribe before the upgrade so nothing published in between is lost
    let events = state.controller.subscribe();
    ws.on_upgrade(move |socket| forward_events(socket, events))
}

async fn forward_events(socket: WebSocket, mut events: broadcast::Receiver<AgentEvent>) {
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!(error = %e, "Could not encode event");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event subscriber fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "WebSocket error");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }
}
