use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::models::job::{
    AspectRatio, Job, JobMode, JobStage, JobStatus, QualityTier, StageTiming,
};

/// Response after submitting or retrying a job.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobCreateResponse {
    pub id: Uuid,
    pub status: JobStatus,
    pub stage: JobStage,
}

impl From<&Job> for JobCreateResponse {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            status: job.status,
            stage: job.stage,
        }
    }
}

/// Full job view for status queries.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub id: Uuid,
    pub mode: JobMode,
    pub quality: QualityTier,
    pub enable_4k: bool,
    pub aspect_ratio: AspectRatio,
    pub status: JobStatus,
    pub stage: JobStage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub request_id: Option<String>,
    pub remote_handle: Option<String>,
    pub error_message: Option<String>,
    pub stage_timings: BTreeMap<JobStage, StageTiming>,
    pub output_url: Option<String>,
}

impl JobStatusResponse {
    pub fn from_job(job: &Job, output_url: Option<String>) -> Self {
        Self {
            id: job.id,
            mode: job.mode,
            quality: job.quality,
            enable_4k: job.enable_4k,
            aspect_ratio: job.aspect_ratio,
            status: job.status,
            stage: job.stage,
            created_at: job.created_at,
            updated_at: job.updated_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            request_id: job.request_id.clone(),
            remote_handle: job.remote_handle.clone(),
            error_message: job.error_message.clone(),
            stage_timings: job.stage_timings.clone(),
            output_url,
        }
    }
}

/// Acknowledgement returned to the compute backend for a callback.
#[derive(Debug, Serialize, Deserialize)]
pub struct CallbackAck {
    pub job_id: Uuid,
    pub status: JobStatus,
}
