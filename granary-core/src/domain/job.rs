//! Job domain types

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A unit of work dispatched to an external worker machine.
///
/// Structure shared between the broker (persists and assigns) and the
/// scheduler (creates and reconciles).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub module: JobModule,
    pub kind: JobKind,
    /// Entity that caused this job, e.g. the source package being built.
    pub trigger: Option<Uuid>,
    /// Version of the triggering entity, in Debian version syntax.
    pub version: String,
    /// Architecture this job must run on, or `any` for no constraint.
    pub architecture: String,
    pub suite: Option<String>,
    pub status: JobStatus,
    pub result: JobResult,
    /// Lower values are assigned first.
    pub priority: i32,
    /// Kind-specific payload forwarded verbatim to the worker.
    pub data: Map<String, Value>,
    /// Worker the job is assigned to, once scheduled.
    pub worker: Option<Uuid>,
    pub time_created: DateTime<Utc>,
    pub time_assigned: Option<DateTime<Utc>>,
    pub time_finished: Option<DateTime<Utc>>,
    pub latest_log_excerpt: Option<String>,
}

/// Everything needed to enqueue a job; identity and timestamps are assigned
/// at insert time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
    pub module: JobModule,
    pub kind: JobKind,
    pub trigger: Option<Uuid>,
    pub version: String,
    pub architecture: String,
    pub suite: Option<String>,
    pub status: JobStatus,
    pub priority: i32,
    pub data: Map<String, Value>,
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Not yet triaged.
    Unknown,
    /// Ready to be handed to a worker.
    Waiting,
    /// Blocked on unsatisfiable build dependencies.
    Depwait,
    /// Assigned to a worker, not yet confirmed.
    Scheduled,
    /// Confirmed and executing on a worker.
    Running,
    /// Finished; see the result for the outcome.
    Done,
    /// Aborted by an administrator.
    Terminated,
}

impl JobStatus {
    /// Stable string code, used on the wire and in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Unknown => "unknown",
            JobStatus::Waiting => "waiting",
            JobStatus::Depwait => "depwait",
            JobStatus::Scheduled => "scheduled",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Terminated => "terminated",
        }
    }

    pub fn parse(s: &str) -> Option<JobStatus> {
        match s {
            "unknown" => Some(JobStatus::Unknown),
            "waiting" => Some(JobStatus::Waiting),
            "depwait" => Some(JobStatus::Depwait),
            "scheduled" => Some(JobStatus::Scheduled),
            "running" => Some(JobStatus::Running),
            "done" => Some(JobStatus::Done),
            "terminated" => Some(JobStatus::Terminated),
            _ => None,
        }
    }

    /// Whether the scheduler may still create, retarget or delete this job.
    ///
    /// Jobs handed to a worker or already finished are left alone.
    pub fn is_actionable(self) -> bool {
        matches!(
            self,
            JobStatus::Unknown | JobStatus::Waiting | JobStatus::Depwait
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a finished job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobResult {
    Unknown,
    Success,
    Failure,
}

impl JobResult {
    pub fn as_str(self) -> &'static str {
        match self {
            JobResult::Unknown => "unknown",
            JobResult::Success => "success",
            JobResult::Failure => "failure",
        }
    }

    pub fn parse(s: &str) -> Option<JobResult> {
        match s {
            "unknown" => Some(JobResult::Unknown),
            "success" => Some(JobResult::Success),
            "failure" => Some(JobResult::Failure),
            _ => None,
        }
    }
}

impl fmt::Display for JobResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a job actually does; workers advertise the kinds they accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    PackageBuild,
    OsImageBuild,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::PackageBuild => "package-build",
            JobKind::OsImageBuild => "os-image-build",
        }
    }

    pub fn parse(s: &str) -> Option<JobKind> {
        match s {
            "package-build" => Some(JobKind::PackageBuild),
            "os-image-build" => Some(JobKind::OsImageBuild),
            _ => None,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subsystem a job belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobModule {
    Scheduler,
    ImageBuild,
}

impl JobModule {
    pub fn as_str(self) -> &'static str {
        match self {
            JobModule::Scheduler => "scheduler",
            JobModule::ImageBuild => "imagebuild",
        }
    }

    pub fn parse(s: &str) -> Option<JobModule> {
        match s {
            "scheduler" => Some(JobModule::Scheduler),
            "imagebuild" => Some(JobModule::ImageBuild),
            _ => None,
        }
    }
}

impl fmt::Display for JobModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
