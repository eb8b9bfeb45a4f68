//! Worker status reports
//!
//! Everything a worker tells us about a job it holds: confirmation,
//! rejection, progress pings and final results. Every report doubles as a
//! liveness ping for the reporting machine.

use granary_core::domain::job::{Job, JobResult, JobStatus};
use granary_core::dto::broker::{JobAck, JobReport};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::service::{ServiceError, emit_event};
use crate::state::AppState;

/// `job-accepted`: the machine confirmed its assignment, mark it running.
///
/// A duplicate acceptance (worker retry after a lost reply) is silently
/// fine; the job is already running for the same machine.
pub async fn job_accepted(state: &AppState, ack: JobAck) -> Result<(), ServiceError> {
    let job = require_assigned(state, ack.uuid, ack.machine_id).await?;
    granary_db::workers::ping(&state.pool, ack.machine_id).await?;

    if granary_db::jobs::mark_accepted(&state.pool, ack.uuid, ack.machine_id).await? {
        info!(job = %ack.uuid, machine = %ack.machine_id, "job confirmed by its machine");
        emit_event(
            state,
            "jobs.job-accepted",
            json!({ "job_id": ack.uuid, "machine_id": ack.machine_id }),
        );
    } else if job.status != JobStatus::Running {
        warn!(
            job = %ack.uuid,
            status = %job.status,
            "acceptance for a job that is not awaiting confirmation"
        );
    }
    Ok(())
}

/// `job-rejected`: hand the job back so another machine can claim it.
pub async fn job_rejected(state: &AppState, ack: JobAck) -> Result<(), ServiceError> {
    let job = require_assigned(state, ack.uuid, ack.machine_id).await?;
    granary_db::workers::ping(&state.pool, ack.machine_id).await?;

    if granary_db::jobs::mark_rejected(&state.pool, ack.uuid, ack.machine_id).await? {
        info!(job = %ack.uuid, machine = %ack.machine_id, "job returned to the queue");
        if job.status == JobStatus::Running {
            // gave up mid-build; the next machine starts from scratch
            warn!(job = %ack.uuid, "job was rejected while already running");
        }
        emit_event(
            state,
            "jobs.job-rejected",
            json!({ "job_id": ack.uuid, "machine_id": ack.machine_id }),
        );
    } else {
        warn!(
            job = %ack.uuid,
            status = %job.status,
            "rejection for a job that is not assigned"
        );
    }
    Ok(())
}

/// `job-status`: progress ping; only refreshes the stored log excerpt.
pub async fn job_status(state: &AppState, report: JobReport) -> Result<(), ServiceError> {
    require_assigned(state, report.uuid, report.machine_id).await?;
    granary_db::workers::ping(&state.pool, report.machine_id).await?;

    if let Some(excerpt) = report.log_excerpt.as_deref() {
        granary_db::jobs::update_log_excerpt(&state.pool, report.uuid, report.machine_id, excerpt)
            .await?;
    }
    Ok(())
}

/// `job-success` / `job-failed`: close the job out with its result.
pub async fn job_finished(
    state: &AppState,
    report: JobReport,
    result: JobResult,
) -> Result<(), ServiceError> {
    let job = require_assigned(state, report.uuid, report.machine_id).await?;
    granary_db::workers::ping(&state.pool, report.machine_id).await?;

    let updated = granary_db::jobs::mark_finished(
        &state.pool,
        report.uuid,
        report.machine_id,
        result,
        report.log_excerpt.as_deref(),
    )
    .await?;

    if updated {
        info!(
            job = %report.uuid,
            machine = %report.machine_id,
            result = %result,
            "job finished"
        );
        emit_event(
            state,
            "jobs.job-finished",
            json!({
                "job_id": report.uuid,
                "machine_id": report.machine_id,
                "result": result.as_str(),
            }),
        );
    } else {
        warn!(
            job = %report.uuid,
            status = %job.status,
            "completion report for a job that is not in progress"
        );
    }
    Ok(())
}

/// Load a job and check it is held by the reporting machine.
async fn require_assigned(
    state: &AppState,
    job: Uuid,
    machine: Uuid,
) -> Result<Job, ServiceError> {
    let job = granary_db::jobs::find_by_id(&state.pool, job)
        .await?
        .ok_or(ServiceError::UnknownJob(job))?;
    if job.worker != Some(machine) {
        return Err(ServiceError::NotAssigned(job.id));
    }
    Ok(job)
}
