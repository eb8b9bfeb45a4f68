//! Queue maintenance
//!
//! Runs after the suite scans: drops jobs whose trigger vanished from the
//! archive, requeues assignments stuck on dead workers and reports workers
//! that have gone silent.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use granary_core::domain::job::JobKind;
use sqlx::PgPool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;

/// Assignments older than this are considered abandoned.
const STALE_ASSIGNMENT_DAYS: i64 = 14;

/// Workers silent for longer than this get reported.
const SILENT_WORKER_DAYS: i64 = 3;

/// Totals from one maintenance pass.
#[derive(Debug, Default)]
pub struct GcStats {
    pub orphans_deleted: usize,
    pub requeued: usize,
}

/// One full maintenance pass.
pub async fn run(pool: &PgPool, config: &Config) -> Result<GcStats, sqlx::Error> {
    let mut stats = GcStats::default();
    delete_orphans(pool, config, &mut stats).await?;
    requeue_stale(pool, config, &mut stats).await?;
    report_silent_workers(pool).await?;
    Ok(stats)
}

/// Delete pending build jobs whose source package version left the archive
/// entirely, along with their stored logs.
async fn delete_orphans(
    pool: &PgPool,
    config: &Config,
    stats: &mut GcStats,
) -> Result<(), sqlx::Error> {
    for job in granary_db::jobs::find_actionable(pool).await? {
        // only build jobs are triggered by source packages
        if job.kind != JobKind::PackageBuild {
            continue;
        }
        let Some(trigger) = job.trigger else {
            continue;
        };
        if granary_db::packages::version_exists(pool, trigger, &job.version).await? {
            continue;
        }

        info!(
            job = %job.id,
            version = %job.version,
            architecture = %job.architecture,
            "trigger package vanished from all suites, deleting job"
        );
        stats.orphans_deleted += 1;
        if config.simulate {
            continue;
        }
        if granary_db::jobs::delete(pool, job.id).await? {
            if let Some(log_root) = &config.log_root {
                remove_job_log(log_root, job.id);
            }
        } else {
            stats.orphans_deleted -= 1;
        }
    }
    Ok(())
}

/// Job logs are sharded by the first two characters of the job id.
fn job_log_path(log_root: &Path, job: Uuid) -> PathBuf {
    let id = job.to_string();
    log_root.join(&id[..2]).join(format!("{id}.log"))
}

fn remove_job_log(log_root: &Path, job: Uuid) {
    let path = job_log_path(log_root, job);
    match std::fs::remove_file(&path) {
        Ok(()) => debug!(path = %path.display(), "removed orphaned job log"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "cannot remove orphaned job log"),
    }
}

/// Assignments made before this point count as abandoned.
fn stale_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(STALE_ASSIGNMENT_DAYS)
}

/// Return jobs with long-stale assignments to the queue.
async fn requeue_stale(
    pool: &PgPool,
    config: &Config,
    stats: &mut GcStats,
) -> Result<(), sqlx::Error> {
    let cutoff = stale_cutoff(Utc::now());
    for job in granary_db::jobs::find_stale(pool, cutoff).await? {
        info!(
            job = %job.id,
            worker = ?job.worker,
            assigned = ?job.time_assigned,
            "assignment went stale, returning job to the queue"
        );
        stats.requeued += 1;
        if !config.simulate {
            granary_db::jobs::requeue(pool, job.id).await?;
        }
    }
    Ok(())
}

async fn report_silent_workers(pool: &PgPool) -> Result<(), sqlx::Error> {
    let cutoff = Utc::now() - Duration::days(SILENT_WORKER_DAYS);
    for worker in granary_db::workers::find_silent_since(pool, cutoff).await? {
        info!(
            worker = %worker.name,
            last_ping = %worker.last_ping,
            "worker has gone silent"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_week_old_assignments_fall_behind_the_cutoff() {
        let now = Utc::now();
        let cutoff = stale_cutoff(now);
        assert!(now - Duration::days(15) < cutoff);
        assert!(now - Duration::days(13) > cutoff);
        assert!(now - Duration::hours(1) > cutoff);
    }

    #[test]
    fn job_logs_are_sharded_by_id_prefix() {
        let id = Uuid::parse_str("a5e0f7a4-93a5-4d39-8c57-6a771e1995a9").unwrap();
        let path = job_log_path(Path::new("/var/lib/granary/logs"), id);
        assert_eq!(
            path,
            Path::new("/var/lib/granary/logs/a5/a5e0f7a4-93a5-4d39-8c57-6a771e1995a9.log")
        );
    }
}
