//! Job assignment
//!
//! The correctness-critical path: register the requesting machine, work out
//! which architectures it may claim for, and atomically hand it at most one
//! job.

use granary_core::domain::job::{Job, JobKind};
use granary_core::dto::broker::{JobAssignment, JobQuery};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::service::{ServiceError, emit_event};
use crate::state::AppState;

/// Serve a `job` request: upsert the worker, claim a job, enrich the reply.
///
/// Returns `None` when no matching job is pending or the machine may not
/// receive work.
pub async fn assign_job(
    state: &AppState,
    query: JobQuery,
) -> Result<Option<JobAssignment>, ServiceError> {
    let worker = granary_db::workers::upsert(
        &state.pool,
        query.machine_id,
        &query.machine_name,
        &query.accepts,
        &query.architectures,
    )
    .await?;

    if !worker.enabled {
        info!(
            machine = %query.machine_name,
            "refusing job request from disabled machine"
        );
        return Ok(None);
    }
    if query.accepts.is_empty() {
        debug!(machine = %query.machine_name, "machine accepts no job kinds");
        return Ok(None);
    }

    for architecture in candidate_architectures(&query.architectures, &state.arch_affinity) {
        let claimed = granary_db::jobs::claim_next(
            &state.pool,
            query.machine_id,
            &architecture,
            &query.accepts,
        )
        .await?;

        if let Some(job) = claimed {
            info!(
                job = %job.id,
                machine = %query.machine_name,
                architecture = %job.architecture,
                kind = %job.kind,
                "assigned job"
            );
            return Ok(Some(build_assignment(state, &query, job).await?));
        }
    }

    Ok(None)
}

/// Architectures to try claiming for, most preferred first.
///
/// A machine reporting the affinity architecture tries `all` jobs before its
/// own architectures, so arch-independent packages get built exactly once,
/// on the designated machine class. `all` is never claimable by
/// self-report alone.
fn candidate_architectures(reported: &[String], affinity: &str) -> Vec<String> {
    let mut candidates = Vec::new();
    if reported.iter().any(|arch| arch == affinity) {
        candidates.push("all".to_string());
    }
    for arch in reported {
        if arch != "all" && !candidates.iter().any(|c| c == arch) {
            candidates.push(arch.clone());
        }
    }
    candidates
}

/// Turn a claimed job row into the reply document, resolving the source
/// package name the worker needs to fetch the right sources.
async fn build_assignment(
    state: &AppState,
    query: &JobQuery,
    job: Job,
) -> Result<JobAssignment, ServiceError> {
    let job_id = job.id;
    let kind = job.kind;
    let trigger = job.trigger;
    let version = job.version.clone();
    let suite = job.suite.clone();

    let mut assignment = JobAssignment::from(job);

    if kind == JobKind::PackageBuild {
        if let Some(trigger) = trigger {
            let package =
                granary_db::packages::find_version(&state.pool, trigger, &version, suite.as_deref())
                    .await?;
            match package {
                Some(package) => {
                    assignment
                        .data
                        .insert("package_name".to_string(), Value::String(package.name));
                    assignment.data.insert(
                        "package_version".to_string(),
                        Value::String(package.version),
                    );
                }
                None => warn!(
                    job = %job_id,
                    version = %version,
                    "source package for assigned job not found, sending without package details"
                ),
            }
        }
    }

    emit_event(
        state,
        "jobs.job-assigned",
        json!({
            "job_id": job_id,
            "kind": kind.as_str(),
            "version": assignment.version,
            "architecture": assignment.architecture,
            "machine_id": query.machine_id,
            "machine_name": query.machine_name,
        }),
    );

    Ok(assignment)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn archs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn affinity_machines_try_all_jobs_first() {
        assert_eq!(
            candidate_architectures(&archs(&["amd64"]), "amd64"),
            archs(&["all", "amd64"])
        );
    }

    #[test]
    fn other_machines_never_see_all_jobs() {
        assert_eq!(
            candidate_architectures(&archs(&["arm64", "armhf"]), "amd64"),
            archs(&["arm64", "armhf"])
        );
    }

    #[test]
    fn self_reported_all_is_ignored() {
        // claiming `all` is a property of the affinity architecture, not
        // something a machine can request
        assert_eq!(
            candidate_architectures(&archs(&["all", "arm64"]), "amd64"),
            archs(&["arm64"])
        );
    }

    #[test]
    fn duplicates_are_dropped_and_order_kept() {
        assert_eq!(
            candidate_architectures(&archs(&["amd64", "i386", "amd64"]), "amd64"),
            archs(&["all", "amd64", "i386"])
        );
    }

    #[test]
    fn no_reported_architectures_means_no_candidates() {
        assert!(candidate_architectures(&[], "amd64").is_empty());
    }
}
