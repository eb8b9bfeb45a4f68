//! Signed event envelope
//!
//! Events are JSON documents announced on the event bus. Producers fill in
//! the envelope, sign it with their Ed25519 key and submit it to an event
//! bus receiver endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Envelope format version emitted by this implementation.
pub const EVENT_FORMAT_VERSION: &str = "1.0";

/// A routable, signed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedEvent {
    /// Routing tag, e.g. `jobs.job-assigned`. Subscribers filter on prefixes.
    pub tag: String,
    /// Unique event identity; time-ordered so consumers can sort streams.
    pub uuid: Uuid,
    /// Envelope format version.
    pub format: String,
    /// Creation time at the producer.
    pub time: DateTime<Utc>,
    /// Event payload.
    pub data: Value,
    /// Detached signatures, keyed by signer id and then key id.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub signatures: Map<String, Value>,
}

impl SignedEvent {
    /// New unsigned event with a fresh time-ordered identity.
    pub fn new(tag: impl Into<String>, data: Value) -> SignedEvent {
        SignedEvent {
            tag: tag.into(),
            uuid: Uuid::now_v7(),
            format: EVENT_FORMAT_VERSION.to_string(),
            time: Utc::now(),
            data,
            signatures: Map::new(),
        }
    }
}

/// Why a raw event submission has an unacceptable shape.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventShapeError {
    #[error("event is not a JSON object")]
    NotAnObject,
    #[error("event is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("event field `{0}` has the wrong type")]
    BadField(&'static str),
    #[error("event carries no signatures")]
    Unsigned,
}

/// Structural validation for raw event submissions.
///
/// Checks the envelope shape only; signature verification is separate.
pub fn validate_event_shape(value: &Value) -> Result<(), EventShapeError> {
    let Value::Object(map) = value else {
        return Err(EventShapeError::NotAnObject);
    };
    for field in ["tag", "uuid", "format", "time"] {
        match map.get(field) {
            None => return Err(EventShapeError::MissingField(field)),
            Some(Value::String(_)) => {}
            Some(_) => return Err(EventShapeError::BadField(field)),
        }
    }
    if !map.contains_key("data") {
        return Err(EventShapeError::MissingField("data"));
    }
    match map.get("signatures") {
        Some(Value::Object(signatures)) if !signatures.is_empty() => Ok(()),
        Some(Value::Object(_)) | None => Err(EventShapeError::Unsigned),
        Some(_) => Err(EventShapeError::BadField("signatures")),
    }
}

/// Signer ids present in an event's `signatures` object.
pub fn event_signers(value: &Value) -> Vec<&str> {
    value
        .get("signatures")
        .and_then(Value::as_object)
        .map(|map| map.keys().map(String::as_str).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn well_formed() -> Value {
        json!({
            "tag": "jobs.job-assigned",
            "uuid": Uuid::now_v7().to_string(),
            "format": EVENT_FORMAT_VERSION,
            "time": Utc::now().to_rfc3339(),
            "data": {"job_id": "x"},
            "signatures": {"broker-main": {"ed25519:0": "c2ln"}},
        })
    }

    #[test]
    fn well_formed_events_pass() {
        assert_eq!(validate_event_shape(&well_formed()), Ok(()));
    }

    #[test]
    fn missing_fields_are_reported_by_name() {
        let mut event = well_formed();
        event.as_object_mut().unwrap().remove("tag");
        assert_eq!(
            validate_event_shape(&event),
            Err(EventShapeError::MissingField("tag"))
        );
    }

    #[test]
    fn unsigned_events_are_rejected() {
        let mut event = well_formed();
        event["signatures"] = json!({});
        assert_eq!(validate_event_shape(&event), Err(EventShapeError::Unsigned));

        event.as_object_mut().unwrap().remove("signatures");
        assert_eq!(validate_event_shape(&event), Err(EventShapeError::Unsigned));
    }

    #[test]
    fn non_object_submissions_are_rejected() {
        assert_eq!(
            validate_event_shape(&json!(["not", "an", "object"])),
            Err(EventShapeError::NotAnObject)
        );
    }

    #[test]
    fn signer_ids_are_listed() {
        let event = well_formed();
        assert_eq!(event_signers(&event), vec!["broker-main"]);
        assert!(event_signers(&json!({})).is_empty());
    }
}
