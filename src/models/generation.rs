use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::job::{Job, JobErrorCode, JobStatus};

/// Response after submitting a generation request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub message: String,
    /// Upper bound on generation time, in seconds.
    pub estimated_time: u64,
}

#[derive(Debug, Serialize)]
pub struct JobErrorBody {
    pub code: JobErrorCode,
    pub message: String,
}

/// Response for querying job status.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobErrorBody>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        let message = match job.status {
            JobStatus::Pending => "Job is queued for submission",
            JobStatus::Processing => "Model is being generated",
            JobStatus::Completed => "Model generation completed",
            JobStatus::Failed => "Model generation failed",
        };

        Self {
            job_id: job.id,
            status: job.status,
            progress: job.progress,
            message: message.to_string(),
            result_url: job.result_url,
            error: job.error.map(|e| JobErrorBody {
                code: e.code,
                message: e.message,
            }),
            created_at: job.created_at,
            updated_at: job.updated_at,
            completed_at: job.completed_at,
        }
    }
}

/// Diagnostic listing of all tracked jobs.
#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub total: usize,
    pub jobs: Vec<JobStatusResponse>,
}
