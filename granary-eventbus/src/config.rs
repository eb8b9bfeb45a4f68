//! Event bus configuration
//!
//! Everything comes from environment variables, matching the other granary
//! daemons. The bus can listen on several submission and publish addresses
//! at once, given as comma-separated lists.

use std::path::PathBuf;

/// Event bus configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Addresses the submission endpoint binds to
    pub submit_addrs: Vec<String>,

    /// Addresses the publish endpoint binds to
    pub publish_addrs: Vec<String>,

    /// Directory of verify-key files for identities allowed to submit events
    pub trusted_keys_dir: PathBuf,

    /// Key file for the bus identity; published events are re-signed with it
    pub signing_key: Option<PathBuf>,

    /// Capacity of the queue between the submission and publish sides
    pub queue_capacity: usize,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - EVENTBUS_TRUSTED_KEYS_DIR (required)
    /// - EVENTBUS_SUBMIT_ADDRS (optional, default: 0.0.0.0:5571)
    /// - EVENTBUS_PUBLISH_ADDRS (optional, default: 0.0.0.0:5572)
    /// - EVENTBUS_SIGNING_KEY (optional, enables re-signing)
    /// - EVENTBUS_QUEUE_CAPACITY (optional, default: 1024)
    pub fn from_env() -> anyhow::Result<Self> {
        let submit_addrs = split_addrs(
            &std::env::var("EVENTBUS_SUBMIT_ADDRS").unwrap_or_else(|_| "0.0.0.0:5571".to_string()),
        );

        let publish_addrs = split_addrs(
            &std::env::var("EVENTBUS_PUBLISH_ADDRS").unwrap_or_else(|_| "0.0.0.0:5572".to_string()),
        );

        let trusted_keys_dir = std::env::var("EVENTBUS_TRUSTED_KEYS_DIR")
            .map(PathBuf::from)
            .map_err(|_| {
                anyhow::anyhow!("EVENTBUS_TRUSTED_KEYS_DIR environment variable not set")
            })?;

        let signing_key = std::env::var("EVENTBUS_SIGNING_KEY").ok().map(PathBuf::from);

        let queue_capacity = match std::env::var("EVENTBUS_QUEUE_CAPACITY") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| anyhow::anyhow!("EVENTBUS_QUEUE_CAPACITY must be a number"))?,
            Err(_) => 1024,
        };

        Ok(Self {
            submit_addrs,
            publish_addrs,
            trusted_keys_dir,
            signing_key,
            queue_capacity,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.submit_addrs.is_empty() {
            anyhow::bail!("at least one submission address is required");
        }

        if self.publish_addrs.is_empty() {
            anyhow::bail!("at least one publish address is required");
        }

        if self.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be at least 1");
        }

        Ok(())
    }
}

fn split_addrs(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            submit_addrs: vec!["0.0.0.0:5571".to_string()],
            publish_addrs: vec!["0.0.0.0:5572".to_string()],
            trusted_keys_dir: PathBuf::from("/etc/granary/trusted-keys"),
            signing_key: None,
            queue_capacity: 1024,
        }
    }

    #[test]
    fn test_config_validation() {
        let config = base_config();
        assert!(config.validate().is_ok());

        let mut config = base_config();
        config.submit_addrs.clear();
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_addr_lists_are_comma_separated() {
        assert_eq!(
            split_addrs("0.0.0.0:5571, 127.0.0.1:6571"),
            vec!["0.0.0.0:5571".to_string(), "127.0.0.1:6571".to_string()]
        );
        assert_eq!(split_addrs(""), Vec::<String>::new());
    }
}
