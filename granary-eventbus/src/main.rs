//! Granary event bus
//!
//! Relays signed events between the other granary services. Producers POST
//! events to the submission endpoints, subscribers follow them over
//! WebSocket on the publish endpoints. The bus verifies every submission
//! against its trusted keys and re-signs what it publishes, so consumers
//! only ever need to trust the bus key.

mod config;
mod publisher;
mod receiver;

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, watch};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use granary_core::signing::keyfile;

use crate::config::Config;
use crate::publisher::{FANOUT_CAPACITY, PublisherState};
use crate::receiver::ReceiverState;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "granary_eventbus=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Granary Event Bus...");

    let config = Config::from_env().expect("Failed to load configuration");
    config.validate().expect("Invalid configuration");

    let trusted = keyfile::load_trusted_keys(&config.trusted_keys_dir)
        .expect("Failed to load trusted submitter keys");
    if trusted.is_empty() {
        tracing::warn!(
            "No trusted keys in {}, every submission will be dropped",
            config.trusted_keys_dir.display()
        );
    } else {
        tracing::info!("Trusting {} submitter key(s)", trusted.len());
    }

    let identity = config
        .signing_key
        .as_ref()
        .map(|path| keyfile::load_signing_key(path).expect("Failed to load bus signing key"));
    if identity.is_none() {
        tracing::warn!("No bus signing key configured, publishing producer signatures as-is");
    }

    let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);
    let (fanout, _) = broadcast::channel(FANOUT_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let publisher_state = PublisherState {
        fanout: fanout.clone(),
        shutdown: shutdown_rx.clone(),
    };
    let pump = tokio::spawn(publisher::run_pump(queue_rx, fanout, identity));

    let mut servers = Vec::new();

    let receiver_state = ReceiverState {
        trusted: Arc::new(trusted),
        queue: queue_tx,
    };
    for addr in &config.submit_addrs {
        let app = receiver::create_router(receiver_state.clone());
        let listener = TcpListener::bind(addr)
            .await
            .expect("Failed to bind submission address");
        tracing::info!("Accepting event submissions on {}", addr);
        servers.push(tokio::spawn(serve(listener, app, shutdown_rx.clone())));
    }
    // The only queue senders left now live in the receiver tasks, so the
    // pump stops once the last of them shuts down.
    drop(receiver_state);

    for addr in &config.publish_addrs {
        let app = publisher::create_router(publisher_state.clone());
        let listener = TcpListener::bind(addr)
            .await
            .expect("Failed to bind publish address");
        tracing::info!("Publishing events on {}", addr);
        servers.push(tokio::spawn(serve(listener, app, shutdown_rx.clone())));
    }

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    for server in servers {
        server.await.expect("Server task failed");
    }
    pump.await.expect("Publisher pump failed");

    tracing::info!("Event bus stopped");
}

async fn serve(listener: TcpListener, app: Router, mut shutdown: watch::Receiver<bool>) {
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
        .expect("Failed to start server");
}

/// Resolves when the process is told to stop (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for ctrl-c");
    };

    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to listen for SIGTERM")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, closing endpoints");
}
