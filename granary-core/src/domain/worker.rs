//! Worker domain model
//!
//! Represents an external machine that polls the broker for jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered worker machine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    /// Stable machine identifier, reported by the worker itself
    pub id: Uuid,

    /// Human-readable machine name
    pub name: String,

    /// Disabled workers keep their registration but receive no jobs
    pub enabled: bool,

    /// Job kind codes this worker accepts
    pub accepts: Vec<String>,

    /// Architectures this worker can build for
    pub architectures: Vec<String>,

    /// Last time the worker contacted the broker
    pub last_ping: DateTime<Utc>,

    /// When this worker was first seen
    pub time_registered: DateTime<Utc>,
}
