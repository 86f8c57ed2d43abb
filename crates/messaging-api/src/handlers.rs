//! Control-plane request handlers.
//!
//! Every scheduler response reports the post-action lifecycle flag, so a
//! start on an already-running scheduler (or a stop on an idle one) is an
//! ordinary `200` rather than an error.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use messaging_core::{Message, MessageStore};
use serde::Serialize;
use tracing::{error, instrument};

use crate::AppState;

/// Scheduler lifecycle flag as returned by the status endpoints.
#[derive(Debug, Serialize)]
pub struct RunningResponse {
    /// Whether the tick worker is currently running.
    pub running: bool,
}

/// Page of sent messages.
#[derive(Debug, Serialize)]
pub struct SentListResponse {
    /// Sent messages, most recent first.
    pub items: Vec<Message>,
}

/// Liveness probe.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

/// Service index.
pub async fn index() -> &'static str {
    "automatic-messaging"
}

/// Reports the scheduler lifecycle flag.
pub async fn scheduler_status(State(state): State<AppState>) -> Json<RunningResponse> {
    Json(RunningResponse { running: state.scheduler.is_running() })
}

/// Starts the scheduler. Idempotent: already-running is not an error.
#[instrument(skip(state))]
pub async fn scheduler_start(State(state): State<AppState>) -> Json<RunningResponse> {
    state.scheduler.start().await;
    Json(RunningResponse { running: state.scheduler.is_running() })
}

/// Stops the scheduler, waiting for the in-flight tick. Idempotent.
#[instrument(skip(state))]
pub async fn scheduler_stop(State(state): State<AppState>) -> Json<RunningResponse> {
    state.scheduler.stop().await;
    Json(RunningResponse { running: state.scheduler.is_running() })
}

/// Lists sent messages.
///
/// `limit` and `offset` that are absent or unparsable fall back to 50 and 0;
/// the store applies the same clamping, so operators cannot construct an
/// invalid page request.
#[instrument(skip(state, params))]
pub async fn list_sent(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let limit = params.get("limit").and_then(|raw| raw.parse().ok()).unwrap_or(50);
    let offset = params.get("offset").and_then(|raw| raw.parse().ok()).unwrap_or(0);

    match state.store.list_sent(limit, offset).await {
        Ok(items) => (StatusCode::OK, Json(SentListResponse { items })).into_response(),
        Err(store_error) => {
            error!(error = %store_error, "failed to list sent messages");
            (StatusCode::INTERNAL_SERVER_ERROR, store_error.to_string()).into_response()
        },
    }
}
