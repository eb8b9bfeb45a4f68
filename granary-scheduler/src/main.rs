//! Granary Scheduler
//!
//! One-shot archive scan that keeps the build queue in sync with the package
//! archive.
//!
//! Each run:
//! - Scans every configured suite and plans jobs for source versions that
//!   still need builds
//! - Reconciles dependency-wait state against the latest installability data
//! - Deletes jobs whose trigger package vanished and requeues stale
//!   assignments
//!
//! The scheduler owns all queue writes except assignment itself, which is the
//! broker's job. Run it from cron or a systemd timer.

mod config;
mod gc;
mod scan;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::scan::ScanStats;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "granary_scheduler=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Granary Scheduler");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    info!(
        "Loaded configuration: repo_name={}, arch_affinity={}",
        config.repo_name, config.arch_affinity
    );
    if config.simulate {
        info!("Simulation mode: planned actions are logged but not applied");
    }

    // Create database connection pool
    let pool = granary_db::create_pool(&config.database_url)
        .await
        .context("Failed to create database pool")?;

    info!("Database connection pool created");

    // Run migrations
    granary_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let totals = run_scans(&pool, &config).await?;
    let maintenance = gc::run(&pool, &config)
        .await
        .context("Queue maintenance failed")?;

    info!(
        created = totals.created,
        blocked = totals.blocked,
        unblocked = totals.unblocked,
        orphans_deleted = maintenance.orphans_deleted,
        requeued = maintenance.requeued,
        "Scheduler run complete"
    );

    Ok(())
}

/// Scan every suite the configuration selects and sum up the results.
async fn run_scans(pool: &PgPool, config: &Config) -> Result<ScanStats> {
    let mut totals = ScanStats::default();

    let suites = granary_db::suites::list(pool)
        .await
        .context("Failed to load suite list")?;
    if suites.is_empty() {
        info!("No suites registered, nothing to scan");
        return Ok(totals);
    }

    for suite in suites {
        if let Some(filter) = &config.suites {
            if !filter.contains(&suite.name) {
                continue;
            }
        }

        let name = suite.name.clone();
        let stats = scan::scan_suite(pool, suite, config)
            .await
            .with_context(|| format!("Scan failed for suite {name}"))?;
        info!(
            suite = %name,
            created = stats.created,
            blocked = stats.blocked,
            unblocked = stats.unblocked,
            "Suite scan complete"
        );

        totals.created += stats.created;
        totals.blocked += stats.blocked;
        totals.unblocked += stats.unblocked;
    }

    Ok(totals)
}
