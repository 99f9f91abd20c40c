use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumString};
use uuid::Uuid;

/// Status of a model generation job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Failure causes recorded on a failed job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobErrorCode {
    /// Network or 5xx errors persisted through every retry.
    ProviderUnavailable,
    /// Provider refused the request (4xx or non-zero API code).
    ProviderRejected,
    AuthenticationFailed,
    /// A single provider call exceeded its timeout.
    ProviderTimeout,
    /// Provider reported the generation task as failed.
    GenerationFailed,
    /// Job deadline or poll attempt budget exceeded.
    GenerationTimeout,
    /// Provider reported success without a result location.
    MissingResult,
    DownloadFailed,
    UploadFailed,
}

/// Structured failure cause.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorInfo {
    pub code: JobErrorCode,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorInfo {
    pub fn new(code: JobErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InputKind {
    Text,
    Image,
}

/// Caller-supplied generation payload. Immutable once accepted.
#[derive(Clone, PartialEq)]
pub enum GenerationInput {
    Text {
        text: String,
    },
    Image {
        bytes: Vec<u8>,
        mime_type: String,
        filename: String,
    },
}

impl GenerationInput {
    pub fn kind(&self) -> InputKind {
        match self {
            GenerationInput::Text { .. } => InputKind::Text,
            GenerationInput::Image { .. } => InputKind::Image,
        }
    }
}

// Image bytes are elided from debug output.
impl fmt::Debug for GenerationInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationInput::Text { text } => f.debug_struct("Text").field("text", text).finish(),
            GenerationInput::Image {
                bytes,
                mime_type,
                filename,
            } => f
                .debug_struct("Image")
                .field("len", &bytes.len())
                .field("mime_type", mime_type)
                .field("filename", filename)
                .finish(),
        }
    }
}

/// Opaque caller credential forwarded verbatim to the provider as a bearer token.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderCredential(String);

impl ProviderCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ProviderCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProviderCredential(***)")
    }
}

/// A model generation job and its lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    pub progress: u8,
    pub input_kind: InputKind,
    pub provider_job_id: Option<String>,
    pub result_url: Option<String>,
    pub error: Option<ErrorInfo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TransitionError {
    #[error("job {id} cannot move from {from} to {to}")]
    Invalid {
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },
}

impl Job {
    pub fn new(input_kind: InputKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            progress: 0,
            input_kind,
            provider_job_id: None,
            result_url: None,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Provider accepted the task: `pending -> processing`.
    pub fn start_processing(
        &mut self,
        provider_job_id: String,
        progress: u8,
    ) -> Result<(), TransitionError> {
        self.guard(JobStatus::Pending, JobStatus::Processing)?;
        self.status = JobStatus::Processing;
        self.provider_job_id = Some(provider_job_id);
        self.raise_progress(progress);
        Ok(())
    }

    /// Record provider-reported progress. Never decreases and never reaches 100
    /// before completion.
    pub fn record_progress(&mut self, progress: u8) -> Result<(), TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError::Invalid {
                id: self.id,
                from: self.status,
                to: self.status,
            });
        }
        self.raise_progress(progress);
        Ok(())
    }

    /// `processing -> completed`
    pub fn complete(&mut self, result_url: String) -> Result<(), TransitionError> {
        self.guard(JobStatus::Processing, JobStatus::Completed)?;
        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.result_url = Some(result_url);
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Any non-terminal state `-> failed`.
    pub fn fail(&mut self, error: ErrorInfo) -> Result<(), TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError::Invalid {
                id: self.id,
                from: self.status,
                to: JobStatus::Failed,
            });
        }
        self.status = JobStatus::Failed;
        self.error = Some(error);
        self.updated_at = Utc::now();
        Ok(())
    }

    fn guard(&self, expected: JobStatus, to: JobStatus) -> Result<(), TransitionError> {
        if self.status != expected {
            return Err(TransitionError::Invalid {
                id: self.id,
                from: self.status,
                to,
            });
        }
        Ok(())
    }

    fn raise_progress(&mut self, progress: u8) {
        self.progress = self.progress.max(progress.min(99));
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processing_job() -> Job {
        let mut job = Job::new(InputKind::Text);
        job.start_processing("task-1".to_string(), 20).unwrap();
        job
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = Job::new(InputKind::Image);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert!(job.provider_job_id.is_none());
        assert!(job.result_url.is_none());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_full_success_lifecycle() {
        let mut job = processing_job();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.provider_job_id.as_deref(), Some("task-1"));

        job.complete("https://cdn.example.com/models/a.glb".to_string())
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.completed_at.is_some());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut job = processing_job();
        job.record_progress(50).unwrap();
        job.record_progress(30).unwrap();
        assert_eq!(job.progress, 50);
    }

    #[test]
    fn test_progress_capped_below_100_until_complete() {
        let mut job = processing_job();
        job.record_progress(100).unwrap();
        assert_eq!(job.progress, 99);
    }

    #[test]
    fn test_complete_requires_processing() {
        let mut job = Job::new(InputKind::Text);
        let err = job.complete("url".to_string()).unwrap_err();
        assert_eq!(
            err,
            TransitionError::Invalid {
                id: job.id,
                from: JobStatus::Pending,
                to: JobStatus::Completed,
            }
        );
    }

    #[test]
    fn test_pending_job_can_fail() {
        let mut job = Job::new(InputKind::Text);
        job.fail(ErrorInfo::new(JobErrorCode::ProviderUnavailable, "503"))
            .unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.result_url.is_none());
        assert_eq!(job.error.as_ref().unwrap().code, JobErrorCode::ProviderUnavailable);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut completed = processing_job();
        completed.complete("url".to_string()).unwrap();
        assert!(completed
            .fail(ErrorInfo::new(JobErrorCode::UploadFailed, "late"))
            .is_err());
        assert!(completed.record_progress(10).is_err());
        assert!(completed.error.is_none());

        let mut failed = processing_job();
        failed
            .fail(ErrorInfo::new(JobErrorCode::GenerationFailed, "boom"))
            .unwrap();
        assert!(failed.complete("url".to_string()).is_err());
        assert!(failed.result_url.is_none());
    }

    #[test]
    fn test_error_code_serialization() {
        assert_eq!(JobErrorCode::GenerationTimeout.to_string(), "GENERATION_TIMEOUT");
        let json = serde_json::to_string(&JobErrorCode::ProviderUnavailable).unwrap();
        assert_eq!(json, "\"PROVIDER_UNAVAILABLE\"");
        assert_eq!(JobStatus::Processing.to_string(), "processing");
    }

    #[test]
    fn test_credential_redacted_in_debug() {
        let credential = ProviderCredential::new("tsk_secret_value");
        assert_eq!(format!("{:?}", credential), "ProviderCredential(***)");
        assert_eq!(credential.expose(), "tsk_secret_value");
    }
}
