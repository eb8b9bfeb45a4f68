//! Event submission side of the bus
//!
//! Producers POST signed events to `/submit`. The receiver checks the
//! envelope shape and verifies one trusted signature, then hands the event
//! to the publisher queue. The reply is `202 Accepted` no matter what:
//! a submitter cannot distinguish a delivered event from a dropped one,
//! so rejected submissions leak nothing about the trust configuration.
//! Drops show up in the logs instead.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use serde_json::Value;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use granary_core::domain::event::{EventShapeError, event_signers, validate_event_shape};
use granary_core::signing::{VerifyError, VerifyKey, verify_json};

/// Shared state for the submission endpoints.
#[derive(Clone)]
pub struct ReceiverState {
    /// Verify keys for identities allowed to submit, keyed by signer id.
    pub trusted: Arc<HashMap<String, VerifyKey>>,
    /// Queue into the publisher.
    pub queue: mpsc::Sender<Value>,
}

/// Why a submission was dropped instead of queued.
#[derive(Debug)]
enum SubmissionDrop {
    Malformed(serde_json::Error),
    BadShape(EventShapeError),
    NoTrustedSigner,
    BadSignature(VerifyError),
}

pub fn create_router(state: ReceiverState) -> Router {
    Router::new()
        .route("/submit", post(submit))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// POST /submit
async fn submit(State(state): State<ReceiverState>, body: Bytes) -> StatusCode {
    match accept_submission(&state.trusted, &body) {
        Ok(event) => {
            let tag = event
                .get("tag")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            match state.queue.try_send(event) {
                Ok(()) => tracing::debug!(tag = %tag, "Queued event"),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(tag = %tag, "Publish queue full, dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::error!(tag = %tag, "Publish queue closed, dropping event");
                }
            }
        }
        Err(drop) => tracing::warn!(reason = ?drop, "Dropped event submission"),
    }

    StatusCode::ACCEPTED
}

/// Validate and verify one raw submission.
fn accept_submission(
    trusted: &HashMap<String, VerifyKey>,
    body: &[u8],
) -> Result<Value, SubmissionDrop> {
    let event: Value = serde_json::from_slice(body).map_err(SubmissionDrop::Malformed)?;
    validate_event_shape(&event).map_err(SubmissionDrop::BadShape)?;

    let matched = event_signers(&event)
        .into_iter()
        .find_map(|signer| trusted.get(signer).map(|key| (signer.to_string(), key)));
    let Some((signer, key)) = matched else {
        return Err(SubmissionDrop::NoTrustedSigner);
    };
    verify_json(&event, &signer, key).map_err(SubmissionDrop::BadSignature)?;

    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use granary_core::domain::event::SignedEvent;
    use granary_core::signing::{SigningKey, sign_json};
    use serde_json::json;

    fn signed_submission(key: &SigningKey) -> Vec<u8> {
        let event = SignedEvent::new("jobs.job-assigned", json!({"job_id": "j-1"}));
        let document = serde_json::to_value(event).unwrap();
        let signed = sign_json(document, key).unwrap();
        serde_json::to_vec(&signed).unwrap()
    }

    fn trust(key: &SigningKey) -> HashMap<String, VerifyKey> {
        let verify = key.verify_key();
        HashMap::from([(verify.signer().to_string(), verify)])
    }

    #[test]
    fn trusted_submissions_are_accepted() {
        let key = SigningKey::generate("scheduler-main", "0");
        let body = signed_submission(&key);

        let event = accept_submission(&trust(&key), &body).unwrap();
        assert_eq!(event["tag"], "jobs.job-assigned");
        assert_eq!(event["data"]["job_id"], "j-1");
    }

    #[test]
    fn unknown_signers_are_dropped() {
        let key = SigningKey::generate("scheduler-main", "0");
        let stranger = SigningKey::generate("stranger", "0");
        let body = signed_submission(&stranger);

        let drop = accept_submission(&trust(&key), &body).unwrap_err();
        assert!(matches!(drop, SubmissionDrop::NoTrustedSigner));
    }

    #[test]
    fn tampered_events_are_dropped() {
        let key = SigningKey::generate("scheduler-main", "0");
        let mut event: Value = serde_json::from_slice(&signed_submission(&key)).unwrap();
        event["data"]["job_id"] = json!("j-2");
        let body = serde_json::to_vec(&event).unwrap();

        let drop = accept_submission(&trust(&key), &body).unwrap_err();
        assert!(matches!(drop, SubmissionDrop::BadSignature(_)));
    }

    #[test]
    fn malformed_and_unsigned_bodies_are_dropped() {
        let key = SigningKey::generate("scheduler-main", "0");
        let trusted = trust(&key);

        let drop = accept_submission(&trusted, b"not json").unwrap_err();
        assert!(matches!(drop, SubmissionDrop::Malformed(_)));

        let unsigned = serde_json::to_vec(&json!({
            "tag": "jobs.job-assigned",
            "uuid": "0198c5a0-0000-7000-8000-000000000000",
            "format": "1.0",
            "time": "2026-08-22T10:00:00Z",
            "data": {},
        }))
        .unwrap();
        let drop = accept_submission(&trusted, &unsigned).unwrap_err();
        assert!(matches!(
            drop,
            SubmissionDrop::BadShape(EventShapeError::Unsigned)
        ));
    }
}
