//! Suite configuration

use serde::{Deserialize, Serialize};

/// A distribution suite and the architectures it carries.
///
/// The pseudo-architecture `all` must be listed explicitly for a suite to
/// receive architecture-independent builds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suite {
    pub name: String,
    pub architectures: Vec<String>,
}

impl Suite {
    pub fn has_architecture(&self, arch: &str) -> bool {
        self.architectures.iter().any(|a| a == arch)
    }
}
