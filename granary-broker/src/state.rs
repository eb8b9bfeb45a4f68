//! Shared broker state
//!
//! One [`AppState`] per process, cloned into every request handler.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use granary_client::EventSubmitter;
use granary_core::signing::keyfile;
use granary_core::signing::{SigningKey, VerifyKey};
use sqlx::PgPool;
use tracing::warn;

use crate::config::Config;

/// State shared by all request handlers and the auth middleware.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    /// Verify keys of machines allowed to talk to this broker, by signer id.
    pub trusted_clients: Arc<HashMap<String, VerifyKey>>,
    /// Broker identity for response signing and event submission.
    pub identity: Option<Arc<SigningKey>>,
    /// Architecture that picks up arch:all builds.
    pub arch_affinity: String,
    /// Event bus submitter for job lifecycle events.
    pub events: Option<EventSubmitter>,
}

impl AppState {
    /// Build the process state: load the trust store and the broker identity.
    ///
    /// A missing or unreadable trust store is fatal; without it no request
    /// could ever be authenticated.
    pub fn from_config(config: &Config, pool: PgPool) -> anyhow::Result<AppState> {
        let trusted_clients = keyfile::load_trusted_keys(&config.trusted_clients_dir)
            .with_context(|| {
                format!(
                    "cannot load trusted clients from {}",
                    config.trusted_clients_dir.display()
                )
            })?;
        if trusted_clients.is_empty() {
            warn!(
                dir = %config.trusted_clients_dir.display(),
                "trusted clients directory is empty, every request will be rejected"
            );
        }

        let identity = match &config.signing_key {
            Some(path) => {
                let key = keyfile::load_signing_key(path)
                    .with_context(|| format!("cannot load signing key {}", path.display()))?;
                Some(Arc::new(key))
            }
            None => {
                warn!("no signing key configured, responses will not be signed");
                None
            }
        };

        let events = match (&config.event_submit_url, &identity) {
            (Some(url), Some(identity)) => {
                Some(EventSubmitter::new(url.clone(), (**identity).clone()))
            }
            _ => None,
        };

        Ok(AppState {
            pool,
            trusted_clients: Arc::new(trusted_clients),
            identity,
            arch_affinity: config.arch_affinity.clone(),
            events,
        })
    }
}
