//! Job protocol operations

use granary_core::dto::broker::{JobAck, JobAssignment, JobQuery, JobReport, WorkerRequest};
use uuid::Uuid;

use crate::BrokerClient;
use crate::error::{ClientError, Result};

impl BrokerClient {
    // =============================================================================
    // Job Lifecycle
    // =============================================================================

    /// Ask the broker for a job assignment
    ///
    /// # Arguments
    /// * `architectures` - Architectures this machine builds for, most preferred first
    /// * `accepts` - Job kind codes this machine is willing to run
    ///
    /// # Returns
    /// The assigned job, or `None` when no matching job is pending
    pub async fn request_job(
        &self,
        architectures: Vec<String>,
        accepts: Vec<String>,
    ) -> Result<Option<JobAssignment>> {
        let reply = self
            .send_frame(&WorkerRequest::Job(JobQuery {
                machine_name: self.machine_name.clone(),
                machine_id: self.machine_id,
                architectures,
                accepts,
            }))
            .await?;

        if reply.is_null() {
            return Ok(None);
        }
        let assignment = serde_json::from_value(reply)
            .map_err(|e| ClientError::ParseError(format!("job assignment: {}", e)))?;
        Ok(Some(assignment))
    }

    /// Confirm an assignment; the broker moves the job to running
    pub async fn accept_job(&self, job: Uuid) -> Result<()> {
        self.send_frame(&WorkerRequest::JobAccepted(JobAck {
            uuid: job,
            machine_id: self.machine_id,
        }))
        .await?;
        Ok(())
    }

    /// Hand an assignment back so another machine can claim it
    pub async fn reject_job(&self, job: Uuid) -> Result<()> {
        self.send_frame(&WorkerRequest::JobRejected(JobAck {
            uuid: job,
            machine_id: self.machine_id,
        }))
        .await?;
        Ok(())
    }

    // =============================================================================
    // Progress And Completion Reports
    // =============================================================================

    /// Report progress on a running job with a fresh log excerpt
    pub async fn report_status(&self, job: Uuid, log_excerpt: impl Into<String>) -> Result<()> {
        self.send_frame(&WorkerRequest::JobStatus(JobReport {
            uuid: job,
            machine_id: self.machine_id,
            log_excerpt: Some(log_excerpt.into()),
        }))
        .await?;
        Ok(())
    }

    /// Report a job as finished successfully
    pub async fn report_success(&self, job: Uuid, log_excerpt: Option<String>) -> Result<()> {
        self.send_frame(&WorkerRequest::JobSuccess(JobReport {
            uuid: job,
            machine_id: self.machine_id,
            log_excerpt,
        }))
        .await?;
        Ok(())
    }

    /// Report a job as failed
    pub async fn report_failure(&self, job: Uuid, log_excerpt: Option<String>) -> Result<()> {
        self.send_frame(&WorkerRequest::JobFailed(JobReport {
            uuid: job,
            machine_id: self.machine_id,
            log_excerpt,
        }))
        .await?;
        Ok(())
    }
}
