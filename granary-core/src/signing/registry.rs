//! Signature algorithm registry
//!
//! Key ids carry an algorithm prefix (`ed25519:0`). Verification looks the
//! algorithm up here instead of assuming Ed25519, so additional schemes can
//! be added without touching the verification paths.

use ed25519_dalek::Verifier as _;

/// A detached-signature algorithm over raw bytes.
pub trait SignatureAlgorithm: Send + Sync {
    /// Name used as the key id prefix.
    fn name(&self) -> &'static str;

    /// Verify `signature` over `message` with the given raw public key.
    fn verify(
        &self,
        public_key: &[u8],
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), SignatureRejected>;
}

/// Opaque rejection from an algorithm implementation.
#[derive(Debug)]
pub struct SignatureRejected;

struct Ed25519;

impl SignatureAlgorithm for Ed25519 {
    fn name(&self) -> &'static str {
        "ed25519"
    }

    fn verify(
        &self,
        public_key: &[u8],
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), SignatureRejected> {
        let public_key: &[u8; 32] = public_key.try_into().map_err(|_| SignatureRejected)?;
        let key =
            ed25519_dalek::VerifyingKey::from_bytes(public_key).map_err(|_| SignatureRejected)?;
        let signature =
            ed25519_dalek::Signature::from_slice(signature).map_err(|_| SignatureRejected)?;
        key.verify(message, &signature).map_err(|_| SignatureRejected)
    }
}

static ALGORITHMS: &[&dyn SignatureAlgorithm] = &[&Ed25519];

/// Find a registered algorithm by key id prefix.
pub fn lookup(name: &str) -> Option<&'static dyn SignatureAlgorithm> {
    ALGORITHMS.iter().copied().find(|a| a.name() == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ed25519_is_registered() {
        assert!(lookup("ed25519").is_some());
        assert!(lookup("rsa").is_none());
    }
}
