//! Job queries
//!
//! All database operations on the jobs table. Assignment runs inside a
//! transaction with `FOR UPDATE SKIP LOCKED`, so concurrent broker requests
//! never hand out the same job twice.

use chrono::{DateTime, Utc};
use granary_core::domain::job::{Job, JobKind, JobModule, JobResult, JobStatus, NewJob};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

/// Insert a job unless an equivalent actionable job already exists.
///
/// Leans on the partial unique index over (trigger, version, architecture):
/// whichever scheduler run inserts first wins, later attempts return `None`.
pub async fn create(pool: &PgPool, new: &NewJob) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query_as::<_, JobRow>(
        r#"
        INSERT INTO jobs (id, module, kind, trigger, version, architecture, suite,
                          status, result, priority, data, time_created)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'unknown', $9, $10, $11)
        ON CONFLICT (trigger, version, architecture)
            WHERE status IN ('unknown', 'waiting', 'depwait')
            DO NOTHING
        RETURNING id, module, kind, trigger, version, architecture, suite, status, result,
                  priority, data, worker, time_created, time_assigned, time_finished,
                  latest_log_excerpt
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(new.module.as_str())
    .bind(new.kind.as_str())
    .bind(new.trigger)
    .bind(&new.version)
    .bind(&new.architecture)
    .bind(&new.suite)
    .bind(new.status.as_str())
    .bind(new.priority)
    .bind(Value::Object(new.data.clone()))
    .bind(Utc::now())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Into::into))
}

/// Find a job by ID
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query_as::<_, JobRow>(
        r#"
        SELECT id, module, kind, trigger, version, architecture, suite, status, result,
               priority, data, worker, time_created, time_assigned, time_finished,
               latest_log_excerpt
        FROM jobs
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Into::into))
}

/// Atomically claim the next waiting job a worker can run.
///
/// The row is selected and moved to `scheduled` in one transaction; the
/// commit happens before the caller replies to the worker, so a job is
/// never announced without being assigned.
pub async fn claim_next(
    pool: &PgPool,
    worker: Uuid,
    architecture: &str,
    accepts: &[String],
) -> Result<Option<Job>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, JobRow>(
        r#"
        SELECT id, module, kind, trigger, version, architecture, suite, status, result,
               priority, data, worker, time_created, time_assigned, time_finished,
               latest_log_excerpt
        FROM jobs
        WHERE status = 'waiting'
          AND kind = ANY($1)
          AND (architecture = $2 OR architecture = 'any')
        ORDER BY priority ASC, time_created ASC
        LIMIT 1
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .bind(accepts)
    .bind(architecture)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        tx.rollback().await?;
        return Ok(None);
    };

    let claimed = sqlx::query_as::<_, JobRow>(
        r#"
        UPDATE jobs
        SET status = 'scheduled', worker = $1, time_assigned = $2
        WHERE id = $3
        RETURNING id, module, kind, trigger, version, architecture, suite, status, result,
                  priority, data, worker, time_created, time_assigned, time_finished,
                  latest_log_excerpt
        "#,
    )
    .bind(worker)
    .bind(Utc::now())
    .bind(row.id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some(claimed.into()))
}

/// Record that a worker confirmed its assignment.
pub async fn mark_accepted(pool: &PgPool, job: Uuid, worker: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE jobs SET status = 'running' WHERE id = $1 AND worker = $2 AND status = 'scheduled'",
    )
    .bind(job)
    .bind(worker)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Hand a rejected assignment back to the queue.
pub async fn mark_rejected(pool: &PgPool, job: Uuid, worker: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'waiting', worker = NULL, time_assigned = NULL
        WHERE id = $1 AND worker = $2 AND status IN ('scheduled', 'running')
        "#,
    )
    .bind(job)
    .bind(worker)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Store a fresh log excerpt from a progress report.
pub async fn update_log_excerpt(
    pool: &PgPool,
    job: Uuid,
    worker: Uuid,
    excerpt: &str,
) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("UPDATE jobs SET latest_log_excerpt = $3 WHERE id = $1 AND worker = $2")
            .bind(job)
            .bind(worker)
            .bind(excerpt)
            .execute(pool)
            .await?;

    Ok(result.rows_affected() > 0)
}

/// Finalize a job its worker reported as done.
pub async fn mark_finished(
    pool: &PgPool,
    job: Uuid,
    worker: Uuid,
    result: JobResult,
    excerpt: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'done', result = $3, time_finished = $4,
            latest_log_excerpt = COALESCE($5, latest_log_excerpt)
        WHERE id = $1 AND worker = $2 AND status IN ('scheduled', 'running')
        "#,
    )
    .bind(job)
    .bind(worker)
    .bind(result.as_str())
    .bind(Utc::now())
    .bind(excerpt)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Flag a job as blocked on unsatisfiable dependencies.
pub async fn mark_dependency_wait(pool: &PgPool, job: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE jobs SET status = 'depwait' WHERE id = $1")
        .bind(job)
        .execute(pool)
        .await?;

    Ok(())
}

/// Put a previously blocked or failed job back in the queue.
///
/// Also resets the result, so a failure caused by missing dependencies does
/// not stick to the retried job.
pub async fn mark_runnable(pool: &PgPool, job: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE jobs SET status = 'waiting', result = 'unknown' WHERE id = $1")
        .bind(job)
        .execute(pool)
        .await?;

    Ok(())
}

/// Jobs the scheduler may still create, retarget or delete.
pub async fn find_actionable(pool: &PgPool) -> Result<Vec<Job>, sqlx::Error> {
    let rows = sqlx::query_as::<_, JobRow>(
        r#"
        SELECT id, module, kind, trigger, version, architecture, suite, status, result,
               priority, data, worker, time_created, time_assigned, time_finished,
               latest_log_excerpt
        FROM jobs
        WHERE status IN ('unknown', 'waiting', 'depwait')
        ORDER BY time_created ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// All jobs triggered by any of the given entities, oldest first.
pub async fn find_for_triggers(pool: &PgPool, triggers: &[Uuid]) -> Result<Vec<Job>, sqlx::Error> {
    let rows = sqlx::query_as::<_, JobRow>(
        r#"
        SELECT id, module, kind, trigger, version, architecture, suite, status, result,
               priority, data, worker, time_created, time_assigned, time_finished,
               latest_log_excerpt
        FROM jobs
        WHERE trigger = ANY($1)
        ORDER BY time_created ASC
        "#,
    )
    .bind(triggers)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Assigned jobs whose workers have been silent since before the cutoff.
pub async fn find_stale(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<Vec<Job>, sqlx::Error> {
    let rows = sqlx::query_as::<_, JobRow>(
        r#"
        SELECT id, module, kind, trigger, version, architecture, suite, status, result,
               priority, data, worker, time_created, time_assigned, time_finished,
               latest_log_excerpt
        FROM jobs
        WHERE status IN ('scheduled', 'running') AND time_assigned < $1
        ORDER BY time_assigned ASC
        "#,
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Return a stuck job to the queue, clearing all worker state.
pub async fn requeue(pool: &PgPool, job: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'waiting', result = 'unknown', worker = NULL,
            time_assigned = NULL, time_finished = NULL
        WHERE id = $1
        "#,
    )
    .bind(job)
    .execute(pool)
    .await?;

    Ok(())
}

/// Delete a job by ID
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM jobs WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    module: String,
    kind: String,
    trigger: Option<Uuid>,
    version: String,
    architecture: String,
    suite: Option<String>,
    status: String,
    result: String,
    priority: i32,
    data: Value,
    worker: Option<Uuid>,
    time_created: DateTime<Utc>,
    time_assigned: Option<DateTime<Utc>>,
    time_finished: Option<DateTime<Utc>>,
    latest_log_excerpt: Option<String>,
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        let data = match row.data {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };

        Job {
            id: row.id,
            module: JobModule::parse(&row.module).unwrap_or(JobModule::Scheduler),
            kind: JobKind::parse(&row.kind).unwrap_or(JobKind::PackageBuild),
            trigger: row.trigger,
            version: row.version,
            architecture: row.architecture,
            suite: row.suite,
            status: JobStatus::parse(&row.status).unwrap_or(JobStatus::Unknown),
            result: JobResult::parse(&row.result).unwrap_or(JobResult::Unknown),
            priority: row.priority,
            data,
            worker: row.worker,
            time_created: row.time_created,
            time_assigned: row.time_assigned,
            time_finished: row.time_finished,
            latest_log_excerpt: row.latest_log_excerpt,
        }
    }
}

// These run against a disposable database provisioned from DATABASE_URL;
// the claim and uniqueness guarantees live in the SQL, not in Rust code.
#[cfg(test)]
mod tests {
    use super::*;

    fn waiting_job(architecture: &str) -> NewJob {
        NewJob {
            module: JobModule::Scheduler,
            kind: JobKind::PackageBuild,
            trigger: Some(Uuid::new_v4()),
            version: "1.0-1".to_string(),
            architecture: architecture.to_string(),
            suite: Some("unstable".to_string()),
            status: JobStatus::Waiting,
            priority: 0,
            data: serde_json::Map::new(),
        }
    }

    fn package_builds() -> Vec<String> {
        vec![JobKind::PackageBuild.as_str().to_string()]
    }

    #[sqlx::test(migrations = false)]
    async fn concurrent_claims_hand_out_a_job_once(pool: PgPool) {
        crate::run_migrations(&pool).await.unwrap();
        let job = create(&pool, &waiting_job("amd64"))
            .await
            .unwrap()
            .unwrap();

        let accepts = package_builds();
        let (first, second) = tokio::join!(
            claim_next(&pool, Uuid::new_v4(), "amd64", &accepts),
            claim_next(&pool, Uuid::new_v4(), "amd64", &accepts),
        );
        let first = first.unwrap();
        let second = second.unwrap();

        assert!(
            first.is_some() != second.is_some(),
            "exactly one claim may win"
        );
        let winner = first.or(second).unwrap();
        assert_eq!(winner.id, job.id);
        assert_eq!(winner.status, JobStatus::Scheduled);
        assert!(winner.worker.is_some());
        assert!(winner.time_assigned.is_some());

        // The claim took the job out of the queue for good
        let third = claim_next(&pool, Uuid::new_v4(), "amd64", &package_builds())
            .await
            .unwrap();
        assert!(third.is_none());
    }

    #[sqlx::test(migrations = false)]
    async fn duplicate_actionable_inserts_are_suppressed(pool: PgPool) {
        crate::run_migrations(&pool).await.unwrap();
        let new = waiting_job("arm64");

        assert!(create(&pool, &new).await.unwrap().is_some());
        assert!(create(&pool, &new).await.unwrap().is_none());
    }
}
