//! Key file commands
//!
//! Handles generating key pairs, exporting public halves and inspecting
//! existing key files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;

use granary_core::signing::SigningKey;
use granary_core::signing::keyfile;

/// Top-level commands
#[derive(Subcommand)]
pub enum Commands {
    /// Generate a fresh signing key pair
    Generate {
        /// Signer identity recorded inside the key file
        #[arg(long)]
        id: String,
        /// Key generation within the identity
        #[arg(long, default_value = "0")]
        key_version: String,
        /// Directory the key files are written to
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Export the public half of an existing key
    Export {
        /// Key file to read
        key: PathBuf,
        /// File the public half is written to (stdout when omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Show what a key file contains
    Inspect {
        /// Key file to read
        key: PathBuf,
    },
}

/// Handle a CLI command
pub fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Generate {
            id,
            key_version,
            out_dir,
        } => generate(&id, &key_version, &out_dir),
        Commands::Export { key, out } => export(&key, out.as_deref()),
        Commands::Inspect { key } => inspect(&key),
    }
}

/// Generate a key pair and write both halves next to each other
fn generate(id: &str, key_version: &str, out_dir: &Path) -> Result<()> {
    let key = SigningKey::generate(id, key_version);

    let key_path = out_dir.join(format!("{id}.key"));
    let pub_path = out_dir.join(format!("{id}.pub"));
    if key_path.exists() {
        anyhow::bail!("{} already exists, not overwriting", key_path.display());
    }

    write_private(&key_path, &keyfile::signing_key_text(&key))
        .with_context(|| format!("Failed to write {}", key_path.display()))?;
    fs::write(&pub_path, keyfile::verify_key_text(&key.verify_key()))
        .with_context(|| format!("Failed to write {}", pub_path.display()))?;

    println!("{}", format!("Generated key pair for {id}").bold());
    println!("  {} {}", "Signing key:".dimmed(), key_path.display());
    println!("  {} {}", "Verify key: ".dimmed(), pub_path.display());
    Ok(())
}

/// Private keys are written 0600 and never clobber an existing file
fn write_private(path: &Path, text: &str) -> std::io::Result<()> {
    use std::io::Write as _;
    use std::os::unix::fs::OpenOptionsExt as _;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(text.as_bytes())
}

/// Export the verify key, deriving it from the private half if needed
fn export(key_path: &Path, out: Option<&Path>) -> Result<()> {
    let key = keyfile::load_verify_key(key_path)
        .with_context(|| format!("Failed to read {}", key_path.display()))?;
    let text = keyfile::verify_key_text(&key);

    match out {
        Some(path) => {
            fs::write(path, &text)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "Wrote verify key for {} to {}",
                key.signer().bold(),
                path.display()
            );
        }
        None => print!("{text}"),
    }
    Ok(())
}

/// Print a key file summary
fn inspect(path: &Path) -> Result<()> {
    let (key_id, signer, contents) = match keyfile::load_signing_key(path) {
        Ok(key) => (
            key.key_id(),
            key.signer().to_string(),
            "private signing key".yellow(),
        ),
        Err(_) => {
            let key = keyfile::load_verify_key(path)
                .with_context(|| format!("{} is not a usable key file", path.display()))?;
            (
                key.key_id(),
                key.signer().to_string(),
                "verify key only".green(),
            )
        }
    };

    println!("{} {}", "▸".cyan(), path.display().to_string().bold());
    println!("    Signer:   {}", signer);
    println!("    Key id:   {}", key_id);
    println!("    Contains: {}", contents);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_key_pairs_load_back() {
        let dir = std::env::temp_dir().join(format!("granary-keys-test-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();

        generate("unit-test", "3", &dir).unwrap();

        let key = keyfile::load_signing_key(&dir.join("unit-test.key")).unwrap();
        assert_eq!(key.signer(), "unit-test");
        assert_eq!(key.key_id(), "ed25519:3");

        let public = keyfile::load_verify_key(&dir.join("unit-test.pub")).unwrap();
        assert_eq!(public.public_bytes(), key.verify_key().public_bytes());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn generate_refuses_to_overwrite() {
        let dir = std::env::temp_dir().join(format!("granary-keys-clobber-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();

        generate("keep-me", "0", &dir).unwrap();
        let before = fs::read_to_string(dir.join("keep-me.key")).unwrap();

        assert!(generate("keep-me", "0", &dir).is_err());
        assert_eq!(fs::read_to_string(dir.join("keep-me.key")).unwrap(), before);

        fs::remove_dir_all(&dir).unwrap();
    }
}
