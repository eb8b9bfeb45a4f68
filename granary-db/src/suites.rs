//! Suite queries

use granary_core::domain::suite::Suite;
use sqlx::PgPool;

/// All configured suites.
pub async fn list(pool: &PgPool) -> Result<Vec<Suite>, sqlx::Error> {
    let rows = sqlx::query_as::<_, SuiteRow>(
        "SELECT name, architectures FROM suites ORDER BY name ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Find a suite by name
pub async fn find_by_name(pool: &PgPool, name: &str) -> Result<Option<Suite>, sqlx::Error> {
    let row = sqlx::query_as::<_, SuiteRow>(
        "SELECT name, architectures FROM suites WHERE name = $1",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Into::into))
}

#[derive(sqlx::FromRow)]
struct SuiteRow {
    name: String,
    architectures: Vec<String>,
}

impl From<SuiteRow> for Suite {
    fn from(row: SuiteRow) -> Self {
        Suite {
            name: row.name,
            architectures: row.architectures,
        }
    }
}
