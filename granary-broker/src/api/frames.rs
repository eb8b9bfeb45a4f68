//! Protocol frame handler
//!
//! The whole worker protocol runs over `POST /`: one JSON request frame in,
//! one JSON reply out. Errors the worker can act on travel in-band as
//! `{"error": "..."}` replies with a 200 status, mirroring a request/reply
//! socket; only transport-level failures use HTTP status codes.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use granary_core::dto::broker::WorkerRequest;
use serde_json::{Value, json};

use crate::service::{self, ServiceError};
use crate::state::AppState;

/// POST /
/// Decode one request frame, dispatch it, reply.
pub async fn handle_frame(State(state): State<AppState>, body: Bytes) -> Response {
    let frame: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!("Received frame with invalid JSON: {}", e);
            return error_reply(format!("invalid JSON: {}", e));
        }
    };

    // serde's message names the missing field or the unknown request kind,
    // which is exactly what the worker needs to correct itself
    let request: WorkerRequest = match serde_json::from_value(frame) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!("Received malformed request frame: {}", e);
            return error_reply(e.to_string());
        }
    };

    match service::dispatch(&state, request).await {
        Ok(reply) => Json(reply).into_response(),
        Err(ServiceError::Database(e)) => {
            tracing::error!("Database error: {:?}", e);
            error_reply(ServiceError::Database(e).user_message())
        }
        Err(e) => {
            tracing::warn!("Rejected request: {:?}", e);
            error_reply(e.user_message())
        }
    }
}

fn error_reply(message: String) -> Response {
    Json(json!({ "error": message })).into_response()
}
