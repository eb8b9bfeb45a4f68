//! Service Module
//!
//! Business logic behind the protocol frames. Handlers decode, services
//! decide and mutate.

pub mod assignment;
pub mod report;

use granary_core::domain::job::JobResult;
use granary_core::dto::broker::WorkerRequest;
use serde_json::Value;
use uuid::Uuid;

use crate::state::AppState;

/// Service error type
#[derive(Debug)]
pub enum ServiceError {
    UnknownJob(Uuid),
    NotAssigned(Uuid),
    Internal(String),
    Database(sqlx::Error),
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        ServiceError::Database(err)
    }
}

impl ServiceError {
    /// Message sent back to the worker. Storage details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::UnknownJob(id) => format!("no such job: {}", id),
            ServiceError::NotAssigned(id) => {
                format!("job {} is not assigned to this machine", id)
            }
            ServiceError::Internal(_) | ServiceError::Database(_) => {
                "internal error, try again later".to_string()
            }
        }
    }
}

/// Route one decoded frame to its service and produce the JSON reply.
pub async fn dispatch(state: &AppState, request: WorkerRequest) -> Result<Value, ServiceError> {
    match request {
        WorkerRequest::Job(query) => match assignment::assign_job(state, query).await? {
            Some(assignment) => serde_json::to_value(assignment)
                .map_err(|e| ServiceError::Internal(e.to_string())),
            None => Ok(Value::Null),
        },
        WorkerRequest::JobAccepted(ack) => {
            report::job_accepted(state, ack).await?;
            Ok(Value::Null)
        }
        WorkerRequest::JobRejected(ack) => {
            report::job_rejected(state, ack).await?;
            Ok(Value::Null)
        }
        WorkerRequest::JobStatus(rep) => {
            report::job_status(state, rep).await?;
            Ok(Value::Null)
        }
        WorkerRequest::JobSuccess(rep) => {
            report::job_finished(state, rep, JobResult::Success).await?;
            Ok(Value::Null)
        }
        WorkerRequest::JobFailed(rep) => {
            report::job_finished(state, rep, JobResult::Failure).await?;
            Ok(Value::Null)
        }
    }
}

/// Submit a bus event without blocking or failing the worker reply.
pub(crate) fn emit_event(state: &AppState, tag: &'static str, data: Value) {
    let Some(events) = state.events.clone() else {
        return;
    };
    tokio::spawn(async move {
        if let Err(error) = events.submit(tag, data).await {
            tracing::warn!(tag, %error, "event submission failed");
        }
    });
}
