//! Granary database layer
//!
//! Connection pooling, schema migrations and typed queries over the archive
//! state shared by the broker and the scheduler. Query modules are plain
//! async functions over a `PgPool`, mapping row structs into the domain
//! types from `granary-core`.

pub mod debcheck;
pub mod jobs;
pub mod packages;
pub mod suites;
pub mod workers;

use std::time::Duration;

use sqlx::{PgPool, postgres::PgPoolOptions};

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create jobs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id UUID PRIMARY KEY,
            module TEXT NOT NULL,
            kind TEXT NOT NULL,
            trigger UUID,
            version TEXT NOT NULL,
            architecture TEXT NOT NULL DEFAULT 'any',
            suite TEXT,
            status TEXT NOT NULL DEFAULT 'unknown',
            result TEXT NOT NULL DEFAULT 'unknown',
            priority INTEGER NOT NULL DEFAULT 0,
            data JSONB NOT NULL DEFAULT '{}',
            worker UUID,
            time_created TIMESTAMPTZ NOT NULL,
            time_assigned TIMESTAMPTZ,
            time_finished TIMESTAMPTZ,
            latest_log_excerpt TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Indexes backing assignment and reconciliation queries
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_jobs_claim ON jobs(status, architecture, priority, time_created)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_trigger ON jobs(trigger, version, architecture)")
        .execute(pool)
        .await?;

    // One actionable job per (trigger, version, architecture); lets the
    // scheduler insert blindly with ON CONFLICT DO NOTHING.
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS uniq_jobs_actionable
        ON jobs(trigger, version, architecture)
        WHERE status IN ('unknown', 'waiting', 'depwait')
        "#,
    )
    .execute(pool)
    .await?;

    // Create workers table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workers (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL,
            enabled BOOLEAN NOT NULL DEFAULT TRUE,
            accepts TEXT[] NOT NULL DEFAULT '{}',
            architectures TEXT[] NOT NULL DEFAULT '{}',
            last_ping TIMESTAMPTZ NOT NULL,
            time_registered TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_workers_last_ping ON workers(last_ping)")
        .execute(pool)
        .await?;

    // Create suites table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS suites (
            name TEXT PRIMARY KEY,
            architectures TEXT[] NOT NULL DEFAULT '{}'
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Package tables written by the archive import pipeline, read here
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS source_packages (
            uuid UUID PRIMARY KEY,
            source_id UUID NOT NULL,
            name TEXT NOT NULL,
            version TEXT NOT NULL,
            suite TEXT NOT NULL,
            component TEXT NOT NULL DEFAULT 'main',
            architectures TEXT[] NOT NULL DEFAULT '{}',
            deleted BOOLEAN NOT NULL DEFAULT FALSE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_source_packages_suite ON source_packages(suite)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_source_packages_identity ON source_packages(source_id, version)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS binary_packages (
            uuid UUID PRIMARY KEY,
            name TEXT NOT NULL,
            source_name TEXT NOT NULL,
            source_version TEXT NOT NULL,
            architecture TEXT NOT NULL,
            suite TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_binary_packages_source ON binary_packages(suite, source_name, source_version)",
    )
    .execute(pool)
    .await?;

    // Dependency check results, one row per broken package
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS debcheck_issues (
            uuid UUID PRIMARY KEY,
            package_type TEXT NOT NULL,
            repo_name TEXT NOT NULL,
            suite TEXT NOT NULL,
            package_name TEXT NOT NULL,
            package_version TEXT NOT NULL,
            architecture TEXT NOT NULL,
            missing JSONB NOT NULL DEFAULT '[]',
            conflicts JSONB NOT NULL DEFAULT '[]',
            time_created TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_debcheck_issues_scope ON debcheck_issues(repo_name, suite, package_type)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
