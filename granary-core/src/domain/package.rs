//! Archive package metadata
//!
//! Read-only views of the package tables maintained by the archive import
//! pipeline. The scheduler consumes these to decide what needs building.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A source package version as published in one suite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcePackage {
    /// Row identity for this (package, version, suite) entry.
    pub uuid: Uuid,
    /// Stable identity shared by all versions of the same source package.
    pub source_id: Uuid,
    pub name: String,
    pub version: String,
    pub suite: String,
    pub component: String,
    /// Architecture field as declared in the source control file; entries
    /// may be wildcards such as `any` or `linux-any`.
    pub architectures: Vec<String>,
    /// Set when the package left the index but the row is retained.
    pub deleted: bool,
}

/// A binary package built from some source package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryPackage {
    pub uuid: Uuid,
    pub name: String,
    pub source_name: String,
    pub source_version: String,
    pub architecture: String,
    pub suite: String,
}
