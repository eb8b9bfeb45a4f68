//! Publish side of the bus
//!
//! One pump task drains the queue fed by the receivers, re-signs each event
//! under the bus identity and fans it out to WebSocket subscribers. A
//! subscriber picks the tag prefixes it cares about with
//! `{"subscribe": "<prefix>"}` commands and gets `{"tag": ..., "event": ...}`
//! frames back. An empty prefix matches every tag; with no prefixes nothing
//! is delivered. Delivery is best-effort: a slow subscriber loses events
//! rather than slowing the bus down.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc, watch};
use tower_http::trace::TraceLayer;

use granary_core::signing::{SigningKey, sign_json};

/// How far a subscriber may lag behind before it starts losing events.
pub const FANOUT_CAPACITY: usize = 256;

/// A published event, serialized once and shared by every subscriber.
#[derive(Clone)]
pub struct EventFrame {
    tag: Arc<str>,
    payload: Arc<str>,
}

/// Shared state for the publish endpoints.
#[derive(Clone)]
pub struct PublisherState {
    pub fanout: broadcast::Sender<EventFrame>,
    pub shutdown: watch::Receiver<bool>,
}

/// Commands a subscriber sends over its socket.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SubscriberCommand {
    Subscribe { subscribe: String },
    Unsubscribe { unsubscribe: String },
}

pub fn create_router(state: PublisherState) -> Router {
    Router::new()
        .route("/events", get(ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Drains the receiver queue into the subscriber fan-out.
///
/// Events are re-signed under the bus identity when one is configured, so
/// consumers can pin the bus key instead of every producer's. Without an
/// identity the producer signatures are forwarded as-is.
pub async fn run_pump(
    mut queue: mpsc::Receiver<Value>,
    fanout: broadcast::Sender<EventFrame>,
    identity: Option<SigningKey>,
) {
    while let Some(event) = queue.recv().await {
        let event = match &identity {
            Some(key) => match sign_json(event, key) {
                Ok(signed) => signed,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to re-sign event, dropping it");
                    continue;
                }
            },
            None => {
                tracing::warn!("Publishing event without a bus signature");
                event
            }
        };

        let tag: Arc<str> = Arc::from(event.get("tag").and_then(Value::as_str).unwrap_or_default());
        let wire = json!({"tag": tag.as_ref(), "event": event});
        let payload: Arc<str> = match serde_json::to_string(&wire) {
            Ok(text) => Arc::from(text),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode event frame");
                continue;
            }
        };

        let subscribers = fanout.receiver_count();
        match fanout.send(EventFrame { tag: tag.clone(), payload }) {
            Ok(_) => tracing::debug!(tag = %tag, subscribers, "Published event"),
            Err(_) => tracing::debug!(tag = %tag, "No subscribers, event went nowhere"),
        }
    }

    tracing::info!("Event queue closed, publisher pump stopping");
}

/// GET /events (WebSocket upgrade)
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<PublisherState>) -> Response {
    let feed = state.fanout.subscribe();
    ws.on_upgrade(move |socket| handle_subscriber(socket, feed, state.shutdown.clone()))
}

async fn handle_subscriber(
    mut socket: WebSocket,
    mut feed: broadcast::Receiver<EventFrame>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!("Subscriber connected");
    let mut prefixes: Vec<String> = Vec::new();

    loop {
        tokio::select! {
            frame = feed.recv() => match frame {
                Ok(frame) => {
                    if matches_any(&prefixes, &frame.tag)
                        && socket
                            .send(Message::Text(frame.payload.to_string().into()))
                            .await
                            .is_err()
                    {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Subscriber too slow, events were dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            message = socket.next() => match message {
                Some(Ok(Message::Text(text))) => apply_command(&text, &mut prefixes),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "Subscriber socket error");
                    break;
                }
            },
            _ = shutdown.changed() => break,
        }
    }

    tracing::info!("Subscriber disconnected");
}

fn apply_command(text: &str, prefixes: &mut Vec<String>) {
    match serde_json::from_str(text) {
        Ok(SubscriberCommand::Subscribe { subscribe }) => {
            tracing::info!(prefix = %subscribe, "Subscription added");
            if !prefixes.contains(&subscribe) {
                prefixes.push(subscribe);
            }
        }
        Ok(SubscriberCommand::Unsubscribe { unsubscribe }) => {
            tracing::info!(prefix = %unsubscribe, "Subscription removed");
            prefixes.retain(|prefix| prefix != &unsubscribe);
        }
        Err(e) => tracing::debug!(error = %e, "Ignoring malformed subscriber command"),
    }
}

fn matches_any(prefixes: &[String], tag: &str) -> bool {
    prefixes.iter().any(|prefix| tag.starts_with(prefix.as_str()))
}
