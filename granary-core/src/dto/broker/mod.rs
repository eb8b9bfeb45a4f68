//! Broker protocol frames
//!
//! A worker request is a single JSON object with a `request` discriminator;
//! the broker answers with a job document, `null`, or `{"error": "..."}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::job::{Job, JobKind, JobModule};

/// Header naming the client identity a request is signed as.
pub const CLIENT_NAME_HEADER: &str = "x-client-name";
/// Header carrying the client's Ed25519 signature over the raw request body.
pub const CLIENT_SIGNATURE_HEADER: &str = "x-client-signature";
/// Header carrying the broker's Ed25519 signature over the raw response body.
pub const BROKER_SIGNATURE_HEADER: &str = "x-broker-signature";

/// A request frame sent by a worker, discriminated by the `request` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "kebab-case")]
pub enum WorkerRequest {
    /// Ask for a new job assignment.
    Job(JobQuery),
    /// Confirm a previously assigned job.
    JobAccepted(JobAck),
    /// Hand a previously assigned job back.
    JobRejected(JobAck),
    /// Progress report with a fresh log excerpt.
    JobStatus(JobReport),
    /// Final report for a successful job.
    JobSuccess(JobReport),
    /// Final report for a failed job.
    JobFailed(JobReport),
}

/// Payload of a `job` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobQuery {
    pub machine_name: String,
    pub machine_id: Uuid,
    /// Architectures this machine can build for, most preferred first.
    #[serde(default)]
    pub architectures: Vec<String>,
    /// Job kind codes this machine accepts.
    #[serde(default)]
    pub accepts: Vec<String>,
}

/// Accept/reject payload referencing an assigned job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAck {
    /// The job being acknowledged.
    pub uuid: Uuid,
    pub machine_id: Uuid,
}

/// Progress or completion payload for an assigned job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    /// The job being reported on.
    pub uuid: Uuid,
    pub machine_id: Uuid,
    /// Tail of the build log at the time of the report.
    #[serde(default)]
    pub log_excerpt: Option<String>,
}

/// Job document handed to a worker on assignment.
///
/// Serialized as the reply to a `job` request; `null` means nothing to do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAssignment {
    pub uuid: Uuid,
    pub module: JobModule,
    pub kind: JobKind,
    pub version: String,
    /// Architecture the job was matched on; `all` jobs carry `all` here and
    /// the worker builds them on its affinity architecture.
    pub architecture: String,
    #[serde(default)]
    pub suite: Option<String>,
    pub time_created: chrono::DateTime<chrono::Utc>,
    pub data: Map<String, Value>,
}

impl From<Job> for JobAssignment {
    fn from(job: Job) -> JobAssignment {
        JobAssignment {
            uuid: job.id,
            module: job.module,
            kind: job.kind,
            version: job.version,
            architecture: job.architecture,
            suite: job.suite,
            time_created: job.time_created,
            data: job.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_request_frame_parses() {
        let frame = json!({
            "request": "job",
            "machine_name": "builder-01",
            "machine_id": "a5e0f7a4-93a5-4d39-8c57-6a771e1995a9",
            "architectures": ["amd64"],
            "accepts": ["package-build"],
        });
        let request: WorkerRequest = serde_json::from_value(frame).unwrap();
        match request {
            WorkerRequest::Job(query) => {
                assert_eq!(query.machine_name, "builder-01");
                assert_eq!(query.architectures, vec!["amd64"]);
            }
            other => panic!("parsed as {other:?}"),
        }
    }

    #[test]
    fn report_frames_share_a_payload_shape() {
        let frame = json!({
            "request": "job-success",
            "uuid": "07c62ba4-0433-4a8d-8f63-8eac1f4a22d7",
            "machine_id": "a5e0f7a4-93a5-4d39-8c57-6a771e1995a9",
            "log_excerpt": "done",
        });
        let request: WorkerRequest = serde_json::from_value(frame).unwrap();
        assert!(matches!(request, WorkerRequest::JobSuccess(_)));
    }

    #[test]
    fn unknown_request_kinds_fail_to_parse() {
        let frame = json!({"request": "make-coffee"});
        assert!(serde_json::from_value::<WorkerRequest>(frame).is_err());
    }

    #[test]
    fn malformed_job_ids_fail_to_parse() {
        let frame = json!({
            "request": "job-accepted",
            "uuid": "not-a-uuid",
            "machine_id": "a5e0f7a4-93a5-4d39-8c57-6a771e1995a9",
        });
        assert!(serde_json::from_value::<WorkerRequest>(frame).is_err());
    }
}
