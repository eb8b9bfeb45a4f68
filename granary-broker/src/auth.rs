//! Request authentication and response signing
//!
//! Every protocol request must be signed by a key from the trusted-clients
//! directory; the signature covers the raw request body. Rejections are a
//! bare 403 on purpose: the reason is logged server-side only, so probing
//! clients learn nothing about which part of their request failed.
//!
//! When the broker has an identity key, every response body is signed into
//! the `x-broker-signature` header on the way out, letting workers pin the
//! broker's key instead of trusting the transport.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use granary_core::dto::broker::{
    BROKER_SIGNATURE_HEADER, CLIENT_NAME_HEADER, CLIENT_SIGNATURE_HEADER,
};
use granary_core::signing::SigningKey;
use tracing::{error, warn};

use crate::state::AppState;

/// Request bodies beyond this size are refused before verification.
const MAX_FRAME_BYTES: usize = 1024 * 1024;

#[derive(Debug)]
enum AuthError {
    MissingHeader(&'static str),
    UnreadableHeader(&'static str),
    UnknownClient(String),
    BadSignature(String),
}

/// Middleware wrapping every protocol route: verify the request signature,
/// run the handler, sign the response.
pub async fn signed_exchange(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, MAX_FRAME_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::PAYLOAD_TOO_LARGE.into_response(),
    };

    if let Err(reason) = verify_client(&state, &parts.headers, &body) {
        warn!(reason = ?reason, "rejecting unauthenticated request");
        return StatusCode::FORBIDDEN.into_response();
    }

    let request = Request::from_parts(parts, Body::from(body));
    let response = next.run(request).await;

    match &state.identity {
        Some(identity) => sign_response(identity, response).await,
        None => response,
    }
}

fn verify_client(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<(), AuthError> {
    let name = header_str(headers, CLIENT_NAME_HEADER)?;
    let signature = header_str(headers, CLIENT_SIGNATURE_HEADER)?;

    let key = state
        .trusted_clients
        .get(name)
        .ok_or_else(|| AuthError::UnknownClient(name.to_string()))?;
    key.verify(body, signature)
        .map_err(|_| AuthError::BadSignature(name.to_string()))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, AuthError> {
    headers
        .get(name)
        .ok_or(AuthError::MissingHeader(name))?
        .to_str()
        .map_err(|_| AuthError::UnreadableHeader(name))
}

async fn sign_response(identity: &SigningKey, response: Response) -> Response {
    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Cannot buffer response body for signing: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // base64 is always a valid header value
    if let Ok(value) = HeaderValue::from_str(&identity.sign(&bytes)) {
        parts.headers.insert(BROKER_SIGNATURE_HEADER, value);
    }

    Response::from_parts(parts, Body::from(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn state_with_client(key: &SigningKey) -> AppState {
        let mut trusted = HashMap::new();
        trusted.insert(key.signer().to_string(), key.verify_key());
        AppState {
            pool: PgPoolOptions::new().connect_lazy("postgres://test").unwrap(),
            trusted_clients: Arc::new(trusted),
            identity: None,
            arch_affinity: "amd64".to_string(),
            events: None,
        }
    }

    fn signed_headers(key: &SigningKey, body: &[u8]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CLIENT_NAME_HEADER, key.signer().parse().unwrap());
        headers.insert(CLIENT_SIGNATURE_HEADER, key.sign(body).parse().unwrap());
        headers
    }

    #[tokio::test]
    async fn valid_signatures_pass() {
        let key = SigningKey::generate("builder-01", "0");
        let state = state_with_client(&key);
        let body = br#"{"request": "job"}"#;

        verify_client(&state, &signed_headers(&key, body), body).unwrap();
    }

    #[tokio::test]
    async fn unknown_clients_and_bad_signatures_fail() {
        let key = SigningKey::generate("builder-01", "0");
        let state = state_with_client(&key);
        let body = br#"{"request": "job"}"#;

        let impostor = SigningKey::generate("builder-99", "0");
        assert!(matches!(
            verify_client(&state, &signed_headers(&impostor, body), body),
            Err(AuthError::UnknownClient(_))
        ));

        // right name, signature from the wrong key
        let mut headers = signed_headers(&key, body);
        headers.insert(
            CLIENT_SIGNATURE_HEADER,
            impostor.sign(body).parse().unwrap(),
        );
        assert!(matches!(
            verify_client(&state, &headers, body),
            Err(AuthError::BadSignature(_))
        ));
    }

    #[tokio::test]
    async fn tampered_bodies_fail() {
        let key = SigningKey::generate("builder-01", "0");
        let state = state_with_client(&key);
        let headers = signed_headers(&key, br#"{"request": "job"}"#);

        assert!(matches!(
            verify_client(&state, &headers, br#"{"request": "job-success"}"#),
            Err(AuthError::BadSignature(_))
        ));
    }

    #[tokio::test]
    async fn missing_headers_fail() {
        let key = SigningKey::generate("builder-01", "0");
        let state = state_with_client(&key);

        assert!(matches!(
            verify_client(&state, &HeaderMap::new(), b"{}"),
            Err(AuthError::MissingHeader(_))
        ));
    }
}
