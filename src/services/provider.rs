//! Tripo AI generation provider client.
//!
//! Talks to the Tripo v2 OpenAPI task endpoints: create a task, query its
//! status, and download the finished model. Submit and poll go through the
//! network [`RetryPolicy`]; downloads are single attempts with a longer
//! timeout.

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::job::{GenerationInput, JobErrorCode, ProviderCredential};
use crate::services::retry::{RetryError, RetryPolicy, Transient};

/// Provider-side task state, normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl ProviderState {
    /// Map a raw provider state string. Unknown states count as still running.
    pub fn from_provider(raw: &str) -> Self {
        match raw {
            "queued" => ProviderState::Queued,
            "running" => ProviderState::Running,
            "success" | "succeeded" => ProviderState::Succeeded,
            "failed" | "cancelled" | "banned" | "expired" => ProviderState::Failed,
            other => {
                tracing::debug!(state = other, "Unrecognized provider state, treating as running");
                ProviderState::Running
            }
        }
    }
}

/// Result of a status query.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderStatus {
    pub state: ProviderState,
    /// Provider-reported progress, 0-100.
    pub progress: u8,
    pub result_location: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider request timed out")]
    Timeout,

    #[error("provider connection failed: {0}")]
    Connection(String),

    #[error("provider rejected credential (HTTP {status}): {message}")]
    AuthRejected { status: u16, message: String },

    #[error("provider error {code}: {message}")]
    Provider {
        status: Option<u16>,
        code: String,
        message: String,
    },

    #[error("malformed provider response: {0}")]
    Malformed(String),

    #[error("provider client configuration error: {0}")]
    Config(String),

    #[error("provider unavailable after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<ProviderError>,
    },
}

impl Transient for ProviderError {
    fn is_transient(&self) -> bool {
        match self {
            ProviderError::Timeout | ProviderError::Connection(_) => true,
            ProviderError::Provider {
                status: Some(status),
                ..
            } => *status >= 500,
            _ => false,
        }
    }
}

impl ProviderError {
    /// Errors that will not improve by asking again later.
    pub fn is_permanent(&self) -> bool {
        match self {
            ProviderError::AuthRejected { .. } | ProviderError::Config(_) => true,
            ProviderError::Provider { status, .. } => !matches!(status, Some(s) if *s >= 500),
            _ => false,
        }
    }

    /// Job-level error code for a failure surfaced by this client.
    pub fn job_error_code(&self) -> JobErrorCode {
        match self {
            ProviderError::Timeout => JobErrorCode::ProviderTimeout,
            ProviderError::AuthRejected { .. } => JobErrorCode::AuthenticationFailed,
            ProviderError::RetriesExhausted { last, .. }
                if matches!(**last, ProviderError::Timeout) =>
            {
                JobErrorCode::ProviderTimeout
            }
            ProviderError::RetriesExhausted { .. } | ProviderError::Connection(_) => {
                JobErrorCode::ProviderUnavailable
            }
            ProviderError::Provider { .. } if self.is_transient() => {
                JobErrorCode::ProviderUnavailable
            }
            _ => JobErrorCode::ProviderRejected,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else if e.is_decode() {
            ProviderError::Malformed(e.to_string())
        } else if e.is_builder() {
            ProviderError::Config(e.to_string())
        } else {
            // connect, DNS, reset and body transfer errors
            ProviderError::Connection(e.to_string())
        }
    }
}

impl From<RetryError<ProviderError>> for ProviderError {
    fn from(e: RetryError<ProviderError>) -> Self {
        match e {
            RetryError::Permanent(e) => e,
            RetryError::Exhausted { attempts, last } => ProviderError::RetriesExhausted {
                attempts,
                last: Box::new(last),
            },
        }
    }
}

/// Remote generation provider.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Create a generation task, returning the provider's task ID.
    async fn submit(
        &self,
        input: &GenerationInput,
        credential: &ProviderCredential,
    ) -> Result<String, ProviderError>;

    async fn poll(
        &self,
        provider_job_id: &str,
        credential: &ProviderCredential,
    ) -> Result<ProviderStatus, ProviderError>;

    /// Fetch the finished asset bytes.
    async fn download(&self, result_location: &str) -> Result<Vec<u8>, ProviderError>;
}

/// Response envelope shared by all Tripo endpoints.
#[derive(Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    suggestion: Option<String>,
    data: Option<T>,
}

#[derive(Deserialize)]
struct TaskCreated {
    task_id: String,
}

#[derive(Deserialize)]
struct TaskInfo {
    status: String,
    #[serde(default)]
    progress: u32,
    #[serde(default)]
    output: Option<TaskOutput>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct TaskOutput {
    #[serde(default)]
    pbr_model: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TaskRequest<'a> {
    TextToModel { prompt: &'a str },
    ImageToModel { file: ImageFile },
}

#[derive(Debug, Serialize, PartialEq)]
struct ImageFile {
    #[serde(rename = "type")]
    file_type: String,
    file_token: String,
}

impl<'a> TaskRequest<'a> {
    fn from_input(input: &'a GenerationInput) -> Self {
        match input {
            GenerationInput::Text { text } => TaskRequest::TextToModel { prompt: text },
            GenerationInput::Image {
                bytes, mime_type, ..
            } => TaskRequest::ImageToModel {
                file: ImageFile {
                    file_type: image_file_type(mime_type).to_string(),
                    file_token: base64::engine::general_purpose::STANDARD.encode(bytes),
                },
            },
        }
    }
}

fn image_file_type(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        _ => "png",
    }
}

impl From<TaskInfo> for ProviderStatus {
    fn from(info: TaskInfo) -> Self {
        let state = ProviderState::from_provider(&info.status);
        let result_location = info
            .output
            .and_then(|o| o.pbr_model.filter(|s| !s.is_empty()).or(o.model))
            .filter(|s| !s.is_empty());

        Self {
            state,
            progress: info.progress.min(100) as u8,
            result_location,
            error_message: info.error_message,
        }
    }
}

/// HTTP client for the Tripo v2 OpenAPI.
pub struct TripoClient {
    http: Client,
    download_http: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl TripoClient {
    pub fn new(
        base_url: &str,
        call_timeout: Duration,
        download_timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, ProviderError> {
        let user_agent = concat!("model-gen-proxy/", env!("CARGO_PKG_VERSION"));

        let http = Client::builder()
            .user_agent(user_agent)
            .timeout(call_timeout)
            .build()
            .map_err(|e| ProviderError::Config(e.to_string()))?;

        let download_http = Client::builder()
            .user_agent(user_agent)
            .timeout(download_timeout)
            .build()
            .map_err(|e| ProviderError::Config(e.to_string()))?;

        Ok(Self {
            http,
            download_http,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    /// Send a request and unwrap the `{code, message, data}` envelope.
    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ProviderError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        let envelope: Option<Envelope<T>> = serde_json::from_str(&body).ok();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let message = envelope
                .and_then(|e| e.message)
                .unwrap_or_else(|| status.to_string());
            return Err(ProviderError::AuthRejected {
                status: status.as_u16(),
                message,
            });
        }

        let envelope = match envelope {
            Some(envelope) => envelope,
            None if !status.is_success() => {
                return Err(ProviderError::Provider {
                    status: Some(status.as_u16()),
                    code: status.as_u16().to_string(),
                    message: truncate(&body, 200),
                });
            }
            None => {
                return Err(ProviderError::Malformed(format!(
                    "unexpected body: {}",
                    truncate(&body, 200)
                )));
            }
        };

        if !status.is_success() || envelope.code != 0 {
            let mut message = envelope.message.unwrap_or_else(|| "request failed".to_string());
            if let Some(suggestion) = envelope.suggestion {
                message = format!("{} ({})", message, suggestion);
            }
            return Err(ProviderError::Provider {
                status: Some(status.as_u16()),
                code: envelope.code.to_string(),
                message,
            });
        }

        envelope
            .data
            .ok_or_else(|| ProviderError::Malformed("response envelope has no data".to_string()))
    }

    fn resolve(&self, location: &str) -> String {
        if location.starts_with('/') {
            format!("{}{}", self.base_url, location)
        } else {
            location.to_string()
        }
    }
}

#[async_trait]
impl GenerationClient for TripoClient {
    async fn submit(
        &self,
        input: &GenerationInput,
        credential: &ProviderCredential,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/v2/openapi/task", self.base_url);
        let payload = TaskRequest::from_input(input);

        let created: TaskCreated = self
            .retry
            .run("submit", || {
                self.execute(
                    self.http
                        .post(&url)
                        .bearer_auth(credential.expose())
                        .json(&payload),
                )
            })
            .await?;

        tracing::info!(task_id = %created.task_id, kind = %input.kind(), "Tripo task created");
        Ok(created.task_id)
    }

    async fn poll(
        &self,
        provider_job_id: &str,
        credential: &ProviderCredential,
    ) -> Result<ProviderStatus, ProviderError> {
        let url = format!("{}/v2/openapi/task/{}", self.base_url, provider_job_id);

        let info: TaskInfo = self
            .retry
            .run("poll", || {
                self.execute(self.http.get(&url).bearer_auth(credential.expose()))
            })
            .await?;

        Ok(info.into())
    }

    async fn download(&self, result_location: &str) -> Result<Vec<u8>, ProviderError> {
        let url = self.resolve(result_location);
        let response = self.download_http.get(&url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Provider {
                status: Some(status.as_u16()),
                code: status.as_u16().to_string(),
                message: format!("model download failed: {}", truncate(&body, 200)),
            });
        }

        let bytes = response.bytes().await?;
        tracing::debug!(size = bytes.len(), "Model downloaded from provider");
        Ok(bytes.to_vec())
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
