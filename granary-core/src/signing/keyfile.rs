//! Key files and trust stores
//!
//! Keys live in a small sectioned text format:
//!
//! ```text
//! # granary signing key for builder-01
//! metadata
//!     id = "builder-01"
//!     key-version = "0"
//! ed
//!     signing-key = "..."
//!     verify-key = "..."
//! ```
//!
//! Unindented lines open a section, indented `key = value` lines fill it.
//! A trust store is a directory of such files holding only public halves;
//! file names are advisory, the `id` field inside is what counts.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use thiserror::Error;
use tracing::warn;

use super::{SigningKey, VerifyKey};

#[derive(Debug, Error)]
pub enum KeyFileError {
    #[error("cannot read key file: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("key file has no `{0}` entry")]
    MissingEntry(&'static str),
    #[error("`{0}` entry is not a valid key: {1}")]
    BadKeyMaterial(&'static str, String),
}

#[derive(Debug, Default)]
struct KeyFileText {
    entries: HashMap<(String, String), String>,
}

impl KeyFileText {
    fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.entries
            .get(&(section.to_string(), key.to_string()))
            .map(String::as_str)
    }
}

fn parse(text: &str) -> Result<KeyFileText, KeyFileError> {
    let mut entries = HashMap::new();
    let mut section: Option<String> = None;

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim_end();
        if line.trim_start().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        if !raw_line.starts_with([' ', '\t']) {
            section = Some(line.to_string());
            continue;
        }
        let Some(section) = section.clone() else {
            return Err(KeyFileError::Parse {
                line: line_no,
                message: "entry before any section".to_string(),
            });
        };
        let Some((key, value)) = line.trim_start().split_once('=') else {
            return Err(KeyFileError::Parse {
                line: line_no,
                message: "expected `key = value`".to_string(),
            });
        };
        let key = key.trim().to_string();
        let value = value.trim().trim_matches('"').to_string();
        entries.insert((section, key), value);
    }
    Ok(KeyFileText { entries })
}

fn required<'a>(
    text: &'a KeyFileText,
    section: &str,
    key: &'static str,
) -> Result<&'a str, KeyFileError> {
    text.get(section, key).ok_or(KeyFileError::MissingEntry(key))
}

fn decode_key(name: &'static str, value: &str) -> Result<[u8; 32], KeyFileError> {
    let raw = STANDARD_NO_PAD
        .decode(value)
        .map_err(|e| KeyFileError::BadKeyMaterial(name, e.to_string()))?;
    raw.as_slice()
        .try_into()
        .map_err(|_| KeyFileError::BadKeyMaterial(name, format!("expected 32 bytes, got {}", raw.len())))
}

/// Load a private signing key from a key file.
pub fn load_signing_key(path: &Path) -> Result<SigningKey, KeyFileError> {
    let text = parse(&fs::read_to_string(path)?)?;
    let signer = required(&text, "metadata", "id")?.to_string();
    let version = required(&text, "metadata", "key-version")?.to_string();
    let seed = decode_key("signing-key", required(&text, "ed", "signing-key")?)?;
    Ok(SigningKey::from_parts(signer, version, seed))
}

/// Load the public half from a key file.
///
/// Falls back to deriving it from `signing-key` when only the private half
/// is present.
pub fn load_verify_key(path: &Path) -> Result<VerifyKey, KeyFileError> {
    let text = parse(&fs::read_to_string(path)?)?;
    let signer = required(&text, "metadata", "id")?.to_string();
    let version = required(&text, "metadata", "key-version")?.to_string();

    if let Some(value) = text.get("ed", "verify-key") {
        let raw = decode_key("verify-key", value)?;
        let key = ed25519_dalek::VerifyingKey::from_bytes(&raw)
            .map_err(|e| KeyFileError::BadKeyMaterial("verify-key", e.to_string()))?;
        return Ok(VerifyKey::from_parts(signer, version, key));
    }

    let seed = decode_key("signing-key", required(&text, "ed", "signing-key")?)?;
    Ok(SigningKey::from_parts(signer, version, seed).verify_key())
}

/// Load every readable key in a trust store directory, keyed by signer id.
///
/// Malformed entries are skipped with a warning so one broken file cannot
/// lock every client out; an unreadable directory is an error.
pub fn load_trusted_keys(dir: &Path) -> Result<HashMap<String, VerifyKey>, KeyFileError> {
    let mut keys = HashMap::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        match load_verify_key(&path) {
            Ok(key) => {
                let signer = key.signer().to_string();
                if keys.insert(signer.clone(), key).is_some() {
                    warn!(signer, "duplicate trusted key id, keeping the later file");
                }
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "skipping unusable trusted key file");
            }
        }
    }
    Ok(keys)
}

/// Serialize a private key (and its public half) to key file text.
pub fn signing_key_text(key: &SigningKey) -> String {
    format!(
        "# granary signing key for {signer}\n\
         metadata\n\
         \tid = \"{signer}\"\n\
         \tkey-version = \"{version}\"\n\
         ed\n\
         \tsigning-key = \"{seed}\"\n\
         \tverify-key = \"{public}\"\n",
        signer = key.signer(),
        version = key.version(),
        seed = STANDARD_NO_PAD.encode(key.seed()),
        public = STANDARD_NO_PAD.encode(key.verify_key().public_bytes()),
    )
}

/// Serialize only the public half, for distribution to trust stores.
pub fn verify_key_text(key: &VerifyKey) -> String {
    format!(
        "# granary verify key for {signer}\n\
         metadata\n\
         \tid = \"{signer}\"\n\
         \tkey-version = \"{version}\"\n\
         ed\n\
         \tverify-key = \"{public}\"\n",
        signer = key.signer(),
        version = key.version(),
        public = STANDARD_NO_PAD.encode(key.public_bytes()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_and_entries_parse() {
        let text = parse(
            "# comment\nmetadata\n\tid = \"svc\"\n\tkey-version = \"2\"\ned\n  verify-key = abc\n",
        )
        .unwrap();
        assert_eq!(text.get("metadata", "id"), Some("svc"));
        assert_eq!(text.get("metadata", "key-version"), Some("2"));
        assert_eq!(text.get("ed", "verify-key"), Some("abc"));
    }

    #[test]
    fn entries_before_a_section_are_rejected() {
        let err = parse("\tid = \"svc\"\n").unwrap_err();
        assert!(matches!(err, KeyFileError::Parse { line: 1, .. }));
    }

    #[test]
    fn lines_without_an_equals_sign_are_rejected() {
        let err = parse("metadata\n\tjust some words\n").unwrap_err();
        assert!(matches!(err, KeyFileError::Parse { line: 2, .. }));
    }

    #[test]
    fn serialized_keys_parse_back_to_the_same_material() {
        let key = SigningKey::generate("svc", "0");
        let text = parse(&signing_key_text(&key)).unwrap();

        assert_eq!(text.get("metadata", "id"), Some("svc"));
        let seed = decode_key("signing-key", text.get("ed", "signing-key").unwrap()).unwrap();
        assert_eq!(seed, key.seed());

        let public = decode_key("verify-key", text.get("ed", "verify-key").unwrap()).unwrap();
        assert_eq!(&public, key.verify_key().public_bytes());
    }

    #[test]
    fn public_key_files_leave_out_the_seed() {
        let key = SigningKey::generate("svc", "0").verify_key();
        let text = verify_key_text(&key);
        assert!(!text.contains("signing-key"));
        assert!(parse(&text).unwrap().get("ed", "verify-key").is_some());
    }

    #[test]
    fn truncated_key_material_is_reported() {
        let err = decode_key("verify-key", "c2hvcnQ").unwrap_err();
        assert!(matches!(err, KeyFileError::BadKeyMaterial("verify-key", _)));
    }
}
