//! Document signing and verification
//!
//! Granary signs JSON documents with Ed25519 over a canonical encoding, so
//! that any service can verify provenance regardless of field ordering or
//! whitespace. Signatures live inside the document itself:
//!
//! ```json
//! {"...": "...", "signatures": {"<signer>": {"ed25519:<version>": "<base64>"}}}
//! ```
//!
//! The `signatures` and `unsigned` fields are excluded from the signed
//! bytes, so documents can be verified, re-signed and forwarded without
//! invalidating earlier signatures.

pub mod canonical;
pub mod keyfile;
pub mod registry;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use ed25519_dalek::Signer as _;
use serde_json::{Map, Value};
use thiserror::Error;

pub use canonical::{CanonicalJsonError, canonical_json, canonical_object};

/// Algorithm name used in key ids emitted by this implementation.
pub const ED25519: &str = "ed25519";

/// A private signing identity: who is signing, with which key generation.
#[derive(Clone)]
pub struct SigningKey {
    signer: String,
    version: String,
    key: ed25519_dalek::SigningKey,
}

impl SigningKey {
    /// Generate a fresh Ed25519 key for the given signer identity.
    pub fn generate(signer: impl Into<String>, version: impl Into<String>) -> SigningKey {
        SigningKey {
            signer: signer.into(),
            version: version.into(),
            key: ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }

    pub(crate) fn from_parts(signer: String, version: String, seed: [u8; 32]) -> SigningKey {
        SigningKey {
            signer,
            version,
            key: ed25519_dalek::SigningKey::from_bytes(&seed),
        }
    }

    /// Signer identity, e.g. `broker-main`.
    pub fn signer(&self) -> &str {
        &self.signer
    }

    /// Key generation within the signer identity.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Key id in `<algorithm>:<version>` form.
    pub fn key_id(&self) -> String {
        format!("{ED25519}:{}", self.version)
    }

    /// Sign raw bytes, returning an unpadded base64 signature.
    pub fn sign(&self, message: &[u8]) -> String {
        STANDARD_NO_PAD.encode(self.key.sign(message).to_bytes())
    }

    /// The public half of this key.
    pub fn verify_key(&self) -> VerifyKey {
        VerifyKey {
            signer: self.signer.clone(),
            version: self.version.clone(),
            key: self.key.verifying_key(),
        }
    }

    pub(crate) fn seed(&self) -> [u8; 32] {
        self.key.to_bytes()
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("signer", &self.signer)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// A public verification identity.
#[derive(Debug, Clone)]
pub struct VerifyKey {
    signer: String,
    version: String,
    key: ed25519_dalek::VerifyingKey,
}

impl VerifyKey {
    pub(crate) fn from_parts(
        signer: String,
        version: String,
        key: ed25519_dalek::VerifyingKey,
    ) -> VerifyKey {
        VerifyKey { signer, version, key }
    }

    pub fn signer(&self) -> &str {
        &self.signer
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn key_id(&self) -> String {
        format!("{ED25519}:{}", self.version)
    }

    /// Raw public key bytes.
    pub fn public_bytes(&self) -> &[u8; 32] {
        self.key.as_bytes()
    }

    /// Verify an unpadded base64 signature over raw bytes.
    pub fn verify(&self, message: &[u8], signature: &str) -> Result<(), VerifyError> {
        let raw = STANDARD_NO_PAD
            .decode(signature)
            .map_err(|_| VerifyError::MalformedSignature(self.key_id()))?;
        dispatch(&self.key_id())?
            .verify(self.public_bytes(), message, &raw)
            .map_err(|_| VerifyError::BadSignature(self.signer.clone()))
    }
}

/// Errors from signing a document.
#[derive(Debug, Error)]
pub enum SignError {
    #[error("only JSON objects can be signed")]
    NotAnObject,
    #[error(transparent)]
    Canonical(#[from] CanonicalJsonError),
}

/// Errors from verifying a signed document.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("document carries no signatures")]
    Unsigned,
    #[error("document is not signed by `{0}`")]
    UnknownSigner(String),
    #[error("no signature for key `{key_id}` by `{signer}`")]
    MissingKey { signer: String, key_id: String },
    #[error("signature for key `{0}` is not valid base64")]
    MalformedSignature(String),
    #[error("unsupported signature algorithm `{0}`")]
    UnsupportedAlgorithm(String),
    #[error("signature by `{0}` does not match the document")]
    BadSignature(String),
    #[error(transparent)]
    Canonical(#[from] CanonicalJsonError),
}

/// Sign a JSON document.
///
/// Existing signatures survive: they are excluded from the signed bytes and
/// merged back together with the new one, so multiple parties can sign the
/// same document in sequence.
pub fn sign_json(document: Value, key: &SigningKey) -> Result<Value, SignError> {
    let Value::Object(mut map) = document else {
        return Err(SignError::NotAnObject);
    };

    let mut signatures = match map.remove("signatures") {
        Some(Value::Object(existing)) => existing,
        _ => Map::new(),
    };
    let unsigned = map.remove("unsigned");

    let message = canonical::canonical_object(&map)?;
    let signature = key.sign(&message);

    let by_signer = signatures
        .entry(key.signer().to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    match by_signer {
        Value::Object(keys) => {
            keys.insert(key.key_id(), Value::String(signature));
        }
        other => {
            let mut keys = Map::new();
            keys.insert(key.key_id(), Value::String(signature));
            *other = Value::Object(keys);
        }
    }

    map.insert("signatures".to_string(), Value::Object(signatures));
    if let Some(unsigned) = unsigned {
        map.insert("unsigned".to_string(), unsigned);
    }
    Ok(Value::Object(map))
}

/// Verify that `signer` has signed the document with the given key.
pub fn verify_json(document: &Value, signer: &str, key: &VerifyKey) -> Result<(), VerifyError> {
    let Value::Object(map) = document else {
        return Err(VerifyError::Unsigned);
    };
    let signatures = map
        .get("signatures")
        .and_then(Value::as_object)
        .ok_or(VerifyError::Unsigned)?;
    let by_signer = signatures
        .get(signer)
        .and_then(Value::as_object)
        .ok_or_else(|| VerifyError::UnknownSigner(signer.to_string()))?;

    let key_id = key.key_id();
    let signature = by_signer
        .get(&key_id)
        .and_then(Value::as_str)
        .ok_or_else(|| VerifyError::MissingKey {
            signer: signer.to_string(),
            key_id: key_id.clone(),
        })?;
    let raw = STANDARD_NO_PAD
        .decode(signature)
        .map_err(|_| VerifyError::MalformedSignature(key_id.clone()))?;

    let mut unsigned_view = map.clone();
    unsigned_view.remove("signatures");
    unsigned_view.remove("unsigned");
    let message = canonical::canonical_object(&unsigned_view)?;

    dispatch(&key_id)?
        .verify(key.public_bytes(), &message, &raw)
        .map_err(|_| VerifyError::BadSignature(signer.to_string()))
}

/// Resolve the algorithm named by a key id prefix.
fn dispatch(key_id: &str) -> Result<&'static dyn registry::SignatureAlgorithm, VerifyError> {
    let name = key_id.split(':').next().unwrap_or_default();
    registry::lookup(name).ok_or_else(|| VerifyError::UnsupportedAlgorithm(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sign_then_verify_round_trips() {
        let key = SigningKey::generate("test-service", "0");
        let signed = sign_json(json!({"tag": "test.ping", "data": {"n": 1}}), &key).unwrap();
        verify_json(&signed, "test-service", &key.verify_key()).unwrap();
    }

    #[test]
    fn verification_survives_re_serialization_but_not_tampering() {
        let key = SigningKey::generate("svc", "0");
        let signed = sign_json(json!({"b": 1, "a": 2}), &key).unwrap();

        let text = serde_json::to_string(&signed).unwrap();
        let reparsed: Value = serde_json::from_str(&text).unwrap();
        verify_json(&reparsed, "svc", &key.verify_key()).unwrap();

        let mut tampered = signed;
        tampered["a"] = json!(3);
        assert!(matches!(
            verify_json(&tampered, "svc", &key.verify_key()),
            Err(VerifyError::BadSignature(_))
        ));
    }

    #[test]
    fn unsigned_field_is_excluded_from_the_signature() {
        let key = SigningKey::generate("svc", "0");
        let mut signed = sign_json(json!({"x": 1}), &key).unwrap();
        signed["unsigned"] = json!({"note": "added in transit"});
        verify_json(&signed, "svc", &key.verify_key()).unwrap();
    }

    #[test]
    fn a_second_signer_preserves_the_first_signature() {
        let submitter = SigningKey::generate("submitter", "0");
        let bus = SigningKey::generate("bus", "0");

        let signed = sign_json(json!({"tag": "t", "data": {}}), &submitter).unwrap();
        let signed = sign_json(signed, &bus).unwrap();

        verify_json(&signed, "submitter", &submitter.verify_key()).unwrap();
        verify_json(&signed, "bus", &bus.verify_key()).unwrap();
    }

    #[test]
    fn wrong_key_and_wrong_signer_are_rejected() {
        let key = SigningKey::generate("svc", "0");
        let impostor = SigningKey::generate("svc", "0");
        let signed = sign_json(json!({"x": 1}), &key).unwrap();

        assert!(matches!(
            verify_json(&signed, "svc", &impostor.verify_key()),
            Err(VerifyError::BadSignature(_))
        ));
        assert!(matches!(
            verify_json(&signed, "nobody", &key.verify_key()),
            Err(VerifyError::UnknownSigner(_))
        ));
    }

    #[test]
    fn key_version_mismatch_reports_the_missing_key_id() {
        let key = SigningKey::generate("svc", "0");
        let signed = sign_json(json!({"x": 1}), &key).unwrap();
        let rotated = SigningKey::generate("svc", "1").verify_key();
        assert!(matches!(
            verify_json(&signed, "svc", &rotated),
            Err(VerifyError::MissingKey { .. })
        ));
    }

    #[test]
    fn raw_byte_signatures_verify_through_the_key_types() {
        let key = SigningKey::generate("client", "0");
        let signature = key.sign(b"frame body");
        key.verify_key().verify(b"frame body", &signature).unwrap();
        assert!(key.verify_key().verify(b"other body", &signature).is_err());
    }
}
