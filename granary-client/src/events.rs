//! Event bus submission

use granary_core::domain::event::SignedEvent;
use granary_core::signing::{SigningKey, sign_json};
use reqwest::Client;
use serde_json::Value;

use crate::error::{ClientError, Result};

/// Client for submitting signed events to an event bus receiver.
///
/// Any service that wants its state changes announced on the bus holds one
/// of these; the submitter signs each event with the service identity before
/// sending, since the receiver drops anything it cannot verify.
#[derive(Debug, Clone)]
pub struct EventSubmitter {
    /// Receiver submission endpoint (e.g., "http://localhost:5571/submit")
    submit_url: String,
    client: Client,
    key: SigningKey,
}

impl EventSubmitter {
    /// Create a new event submitter
    ///
    /// # Arguments
    /// * `submit_url` - The receiver's submission endpoint
    /// * `key` - Signing key; its signer id must be in the bus trust store
    pub fn new(submit_url: impl Into<String>, key: SigningKey) -> Self {
        Self {
            submit_url: submit_url.into(),
            client: Client::new(),
            key,
        }
    }

    /// Build, sign and submit one event
    ///
    /// # Arguments
    /// * `tag` - Routing tag (e.g., "jobs.job-assigned")
    /// * `data` - Event payload
    pub async fn submit(&self, tag: &str, data: Value) -> Result<()> {
        let document = self.sign_event(SignedEvent::new(tag, data))?;

        let response = self
            .client
            .post(&self.submit_url)
            .json(&document)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), message));
        }
        Ok(())
    }

    fn sign_event(&self, event: SignedEvent) -> Result<Value> {
        Ok(sign_json(serde_json::to_value(&event)?, &self.key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use granary_core::domain::event::validate_event_shape;
    use granary_core::signing::verify_json;
    use serde_json::json;

    #[test]
    fn submitted_events_are_well_formed_and_verifiable() {
        let key = SigningKey::generate("scheduler-main", "0");
        let submitter = EventSubmitter::new("http://localhost:5571/submit", key.clone());

        let document = submitter
            .sign_event(SignedEvent::new(
                "jobs.job-created",
                json!({"job_id": "j1", "architecture": "amd64"}),
            ))
            .unwrap();

        validate_event_shape(&document).unwrap();
        verify_json(&document, "scheduler-main", &key.verify_key()).unwrap();
    }
}
