//! Package queries
//!
//! Read-only views over the package tables maintained by the archive import
//! pipeline. The scheduler loads whole per-suite indexes up front instead
//! of querying per package.

use granary_core::domain::package::SourcePackage;
use sqlx::PgPool;
use uuid::Uuid;

/// Current (non-deleted) source package versions published in a suite.
pub async fn sources_in_suite(
    pool: &PgPool,
    suite: &str,
) -> Result<Vec<SourcePackage>, sqlx::Error> {
    let rows = sqlx::query_as::<_, SourcePackageRow>(
        r#"
        SELECT uuid, source_id, name, version, suite, component, architectures, deleted
        FROM source_packages
        WHERE suite = $1 AND NOT deleted
        ORDER BY name ASC
        "#,
    )
    .bind(suite)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Whether a specific source package version still exists in any suite.
pub async fn version_exists(
    pool: &PgPool,
    source_id: Uuid,
    version: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM source_packages
            WHERE source_id = $1 AND version = $2 AND NOT deleted
        )
        "#,
    )
    .bind(source_id)
    .bind(version)
    .fetch_one(pool)
    .await
}

/// Resolve one row for a source package version, preferring the given suite.
pub async fn find_version(
    pool: &PgPool,
    source_id: Uuid,
    version: &str,
    suite: Option<&str>,
) -> Result<Option<SourcePackage>, sqlx::Error> {
    let row = sqlx::query_as::<_, SourcePackageRow>(
        r#"
        SELECT uuid, source_id, name, version, suite, component, architectures, deleted
        FROM source_packages
        WHERE source_id = $1 AND version = $2 AND NOT deleted
        ORDER BY CASE WHEN suite = $3 THEN 0 ELSE 1 END
        LIMIT 1
        "#,
    )
    .bind(source_id)
    .bind(version)
    .bind(suite)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Into::into))
}

/// (source name, source version, architecture) triples that already have
/// binaries in a suite.
pub async fn binary_index(
    pool: &PgPool,
    suite: &str,
) -> Result<Vec<(String, String, String)>, sqlx::Error> {
    sqlx::query_as::<_, (String, String, String)>(
        r#"
        SELECT DISTINCT source_name, source_version, architecture
        FROM binary_packages
        WHERE suite = $1
        "#,
    )
    .bind(suite)
    .fetch_all(pool)
    .await
}

#[derive(sqlx::FromRow)]
struct SourcePackageRow {
    uuid: Uuid,
    source_id: Uuid,
    name: String,
    version: String,
    suite: String,
    component: String,
    architectures: Vec<String>,
    deleted: bool,
}

impl From<SourcePackageRow> for SourcePackage {
    fn from(row: SourcePackageRow) -> Self {
        SourcePackage {
            uuid: row.uuid,
            source_id: row.source_id,
            name: row.name,
            version: row.version,
            suite: row.suite,
            component: row.component,
            architectures: row.architectures,
            deleted: row.deleted,
        }
    }
}
