//! Dependency check queries
//!
//! The debcheck import stores one row per package whose dependencies cannot
//! be satisfied. The scheduler only needs the key set per suite: a package
//! version/architecture either has issues or it does not.

use sqlx::PgPool;

/// (package name, version, architecture) keys of source packages with
/// unsatisfiable build dependencies in a suite.
pub async fn source_issue_index(
    pool: &PgPool,
    repo: &str,
    suite: &str,
) -> Result<Vec<(String, String, String)>, sqlx::Error> {
    sqlx::query_as::<_, (String, String, String)>(
        r#"
        SELECT package_name, package_version, architecture
        FROM debcheck_issues
        WHERE repo_name = $1 AND suite = $2 AND package_type = 'source'
        "#,
    )
    .bind(repo)
    .bind(suite)
    .fetch_all(pool)
    .await
}
