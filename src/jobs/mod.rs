//! Job lifecycle types

pub mod store;

pub use store::JobStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::GenerationOutput;
use crate::payload::ResolvedPayload;

/// What kind of generation a job performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Plain text-to-image
    Text,
    /// Image-conditioned (img2img)
    Image,
    /// Structure-conditioned (control image)
    Structure,
    /// Regional-prompted text-to-image
    Regional,
}

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// State transitions are monotonic: forward only, terminal states final
    pub fn can_transition(self, to: JobState) -> bool {
        matches!(
            (self, to),
            (JobState::Queued, JobState::Processing)
                | (JobState::Queued, JobState::Failed)
                | (JobState::Processing, JobState::Completed)
                | (JobState::Processing, JobState::Failed)
        )
    }
}

/// A single generation job
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub caller_id: String,
    pub kind: JobKind,
    pub payload: ResolvedPayload,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
}

impl Job {
    pub fn new(caller_id: impl Into<String>, kind: JobKind, payload: ResolvedPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            caller_id: caller_id.into(),
            kind,
            payload,
            state: JobState::Queued,
            created_at: Utc::now(),
            completed_at: None,
            message: None,
        }
    }
}

/// Caller-visible view of a job's lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: Uuid,
    pub status: JobState,
    pub kind: JobKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Job> for JobStatus {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            status: job.state,
            kind: job.kind,
            message: job.message.clone(),
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

/// Terminal outcome of a job, written exactly once
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: Uuid,
    pub status: JobState,
    /// Base64-encoded output images, as returned by the downstream service
    #[serde(default)]
    pub images: Vec<String>,
    /// Downstream metadata document, opaque to the pipeline
    #[serde(default)]
    pub info: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl JobResult {
    pub fn completed(job_id: Uuid, output: GenerationOutput, at: DateTime<Utc>) -> Self {
        Self {
            job_id,
            status: JobState::Completed,
            images: output.images,
            info: output.info,
            error: None,
            completed_at: at,
        }
    }

    pub fn failed(job_id: Uuid, error: String, at: DateTime<Utc>) -> Self {
        Self {
            job_id,
            status: JobState::Failed,
            images: Vec::new(),
            info: serde_json::Value::Null,
            error: Some(error),
            completed_at: at,
        }
    }
}
