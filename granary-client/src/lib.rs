//! Granary HTTP Client
//!
//! A type-safe client for the granary job broker and event bus.
//!
//! Every broker request body is signed with the worker's Ed25519 identity
//! and sent alongside the identity name, which the broker checks against its
//! trusted-clients directory. When a broker verify key is pinned, responses
//! are checked against the broker's counter-signature as well, so workers
//! end up with mutual authentication over plain HTTP transports.
//!
//! # Example
//!
//! ```no_run
//! use granary_client::BrokerClient;
//! use granary_core::signing::SigningKey;
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let identity = SigningKey::generate("builder-01", "0");
//!     let client = BrokerClient::new(
//!         "http://localhost:5570",
//!         identity,
//!         Uuid::new_v4(),
//!         "builder-01",
//!     );
//!
//!     if let Some(job) = client
//!         .request_job(vec!["amd64".into()], vec!["package-build".into()])
//!         .await?
//!     {
//!         println!("assigned job {}", job.uuid);
//!         client.accept_job(job.uuid).await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
mod events;
mod jobs;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use events::EventSubmitter;
pub use granary_core::dto::broker::JobAssignment;

use granary_core::dto::broker::{
    BROKER_SIGNATURE_HEADER, CLIENT_NAME_HEADER, CLIENT_SIGNATURE_HEADER,
};
use granary_core::signing::{SigningKey, VerifyKey};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// HTTP client for the granary job broker
///
/// One instance represents one worker machine identity: its signing key,
/// its self-chosen machine UUID and its human-readable name. All request
/// frames carry that identity; see [`BrokerClient::request_job`] and the
/// report methods for the protocol operations.
#[derive(Debug, Clone)]
pub struct BrokerClient {
    /// Base URL of the broker (e.g., "http://localhost:5570")
    base_url: String,
    /// HTTP client instance
    client: Client,
    /// Key the request bodies are signed with
    identity: SigningKey,
    /// Stable machine identity, chosen by the worker
    machine_id: Uuid,
    /// Human-readable machine label
    machine_name: String,
    /// Pinned broker key for response verification, if any
    broker_key: Option<VerifyKey>,
}

impl BrokerClient {
    /// Create a new broker client
    ///
    /// # Arguments
    /// * `base_url` - The broker endpoint (e.g., "http://localhost:5570")
    /// * `identity` - Signing key whose signer id is registered with the broker
    /// * `machine_id` - This machine's stable UUID
    /// * `machine_name` - Human-readable machine label
    pub fn new(
        base_url: impl Into<String>,
        identity: SigningKey,
        machine_id: Uuid,
        machine_name: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
            identity,
            machine_id,
            machine_name: machine_name.into(),
            broker_key: None,
        }
    }

    /// Pin the broker's verify key; responses without a matching
    /// counter-signature will fail with [`ClientError::ResponseVerification`].
    pub fn with_broker_key(mut self, key: VerifyKey) -> Self {
        self.broker_key = Some(key);
        self
    }

    /// Replace the HTTP client, e.g. to configure timeouts or proxies.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Get the base URL of the broker
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// This client's machine UUID
    pub fn machine_id(&self) -> Uuid {
        self.machine_id
    }

    // =============================================================================
    // Frame Transport
    // =============================================================================

    /// Send one signed request frame and return the broker's JSON reply.
    ///
    /// Handles the whole exchange: body signing, HTTP status checking,
    /// optional response verification and in-protocol `{"error": ...}`
    /// replies.
    async fn send_frame<F: Serialize>(&self, frame: &F) -> Result<Value> {
        let body = serde_json::to_vec(frame)?;
        let signature = self.identity.sign(&body);
        tracing::debug!(url = %self.base_url, bytes = body.len(), "Sending signed request frame");

        let response = self
            .client
            .post(&self.base_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(CLIENT_NAME_HEADER, self.identity.signer())
            .header(CLIENT_SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let broker_signature = response
            .headers()
            .get(BROKER_SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Err(ClientError::api_error(
                status.as_u16(),
                String::from_utf8_lossy(&bytes),
            ));
        }

        if let Some(key) = &self.broker_key {
            let signature = broker_signature.ok_or(ClientError::UnsignedResponse)?;
            key.verify(&bytes, &signature)
                .map_err(|_| ClientError::ResponseVerification)?;
        }

        let reply: Value = serde_json::from_slice(&bytes)
            .map_err(|e| ClientError::ParseError(format!("reply is not valid JSON: {}", e)))?;
        if let Some(message) = reply.get("error").and_then(Value::as_str) {
            tracing::debug!(error = %message, "Broker answered with an error document");
            return Err(ClientError::Broker(message.to_string()));
        }

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> BrokerClient {
        BrokerClient::new(
            "http://localhost:5570/",
            SigningKey::generate("builder-01", "0"),
            Uuid::new_v4(),
            "builder-01",
        )
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        assert_eq!(test_client().base_url(), "http://localhost:5570");
    }

    #[test]
    fn test_broker_key_pinning_is_off_by_default() {
        let client = test_client();
        assert!(client.broker_key.is_none());

        let pinned = client.with_broker_key(SigningKey::generate("broker", "0").verify_key());
        assert!(pinned.broker_key.is_some());
    }
}
