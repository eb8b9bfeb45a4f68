//! Worker queries
//!
//! Handles all database operations related to worker registrations.

use chrono::{DateTime, Utc};
use granary_core::domain::worker::Worker;
use sqlx::PgPool;
use uuid::Uuid;

/// Register a worker or refresh its registration.
///
/// Every job request refreshes name, accepted kinds, architectures and the
/// ping time. The enabled flag is operator-controlled and never touched
/// from the wire.
pub async fn upsert(
    pool: &PgPool,
    id: Uuid,
    name: &str,
    accepts: &[String],
    architectures: &[String],
) -> Result<Worker, sqlx::Error> {
    let now = Utc::now();

    let row = sqlx::query_as::<_, WorkerRow>(
        r#"
        INSERT INTO workers (id, name, enabled, accepts, architectures, last_ping, time_registered)
        VALUES ($1, $2, TRUE, $3, $4, $5, $5)
        ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                accepts = EXCLUDED.accepts,
                architectures = EXCLUDED.architectures,
                last_ping = EXCLUDED.last_ping
        RETURNING id, name, enabled, accepts, architectures, last_ping, time_registered
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(accepts)
    .bind(architectures)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(row.into())
}

/// Record that a machine contacted the broker.
pub async fn ping(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE workers SET last_ping = $1 WHERE id = $2")
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Find a worker by ID
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Worker>, sqlx::Error> {
    let row = sqlx::query_as::<_, WorkerRow>(
        r#"
        SELECT id, name, enabled, accepts, architectures, last_ping, time_registered
        FROM workers
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Into::into))
}

/// Workers that have not contacted the broker since the cutoff.
pub async fn find_silent_since(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Worker>, sqlx::Error> {
    let rows = sqlx::query_as::<_, WorkerRow>(
        r#"
        SELECT id, name, enabled, accepts, architectures, last_ping, time_registered
        FROM workers
        WHERE last_ping < $1
        ORDER BY last_ping ASC
        "#,
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

#[derive(sqlx::FromRow)]
struct WorkerRow {
    id: Uuid,
    name: String,
    enabled: bool,
    accepts: Vec<String>,
    architectures: Vec<String>,
    last_ping: DateTime<Utc>,
    time_registered: DateTime<Utc>,
}

impl From<WorkerRow> for Worker {
    fn from(row: WorkerRow) -> Self {
        Worker {
            id: row.id,
            name: row.name,
            enabled: row.enabled,
            accepts: row.accepts,
            architectures: row.architectures,
            last_ping: row.last_ping,
            time_registered: row.time_registered,
        }
    }
}
