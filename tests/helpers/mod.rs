//! HTTP helpers for live end-to-end runs.

#![allow(dead_code)]

use reqwest::multipart;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

/// Response from POST /api/v1/models
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub status: String,
    pub estimated_time: u64,
}

#[derive(Debug, Deserialize)]
pub struct JobError {
    pub code: String,
    pub message: String,
}

/// Response from GET /api/v1/models/{job_id}/status
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: String,
    pub progress: u8,
    pub result_url: Option<String>,
    pub error: Option<JobError>,
}

/// Error envelope returned for rejected requests.
#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: JobError,
}

pub fn provider_token() -> String {
    std::env::var("TRIPO_API_KEY").unwrap_or_else(|_| "tsk_missing_test_token".to_string())
}

/// Submit a text prompt; returns the raw response so callers can check rejections.
pub async fn submit_text(
    client: &reqwest::Client,
    base_url: &str,
    prompt: &str,
    token: &str,
) -> Result<reqwest::Response, reqwest::Error> {
    let form = multipart::Form::new()
        .text("type", "text")
        .text("input", prompt.to_string());

    client
        .post(format!("{}/api/v1/models", base_url))
        .bearer_auth(token)
        .multipart(form)
        .send()
        .await
}

pub async fn submit_image(
    client: &reqwest::Client,
    base_url: &str,
    image: &[u8],
    mime_type: &str,
    token: &str,
) -> Result<reqwest::Response, Box<dyn std::error::Error>> {
    let form = multipart::Form::new()
        .text("type", "image")
        .text("token", token.to_string())
        .part(
            "image",
            multipart::Part::bytes(image.to_vec())
                .file_name("input.png")
                .mime_str(mime_type)?,
        );

    let response = client
        .post(format!("{}/api/v1/models", base_url))
        .multipart(form)
        .send()
        .await?;
    Ok(response)
}

pub async fn get_status(
    client: &reqwest::Client,
    base_url: &str,
    job_id: Uuid,
) -> Result<JobStatusResponse, Box<dyn std::error::Error>> {
    let response = client
        .get(format!("{}/api/v1/models/{}/status", base_url, job_id))
        .send()
        .await?;

    if !response.status().is_success() {
        let error_text = response.text().await?;
        return Err(format!("Status check failed: {}", error_text).into());
    }
    Ok(response.json::<JobStatusResponse>().await?)
}

/// Poll job status until completed or failed (with timeout)
pub async fn wait_for_terminal(
    client: &reqwest::Client,
    base_url: &str,
    job_id: Uuid,
    timeout_secs: u64,
) -> Result<JobStatusResponse, Box<dyn std::error::Error>> {
    let max_attempts = timeout_secs / 2;
    let mut last_progress = 0u8;

    for attempt in 0..max_attempts {
        let status = get_status(client, base_url, job_id).await?;

        if status.progress < last_progress {
            return Err(format!(
                "progress went backwards: {} -> {}",
                last_progress, status.progress
            )
            .into());
        }
        last_progress = status.progress;

        match status.status.as_str() {
            "completed" | "failed" => return Ok(status),
            "pending" | "processing" => {
                if attempt % 10 == 0 && attempt > 0 {
                    println!("  ... {}% (attempt {}/{})", status.progress, attempt, max_attempts);
                }
                sleep(Duration::from_secs(2)).await;
            }
            other => return Err(format!("Unknown job status: {}", other).into()),
        }
    }

    Err(format!("Job did not finish within {} seconds", timeout_secs).into())
}

/// Exactly one of resultUrl / error once a job is terminal.
pub fn assert_terminal_shape(status: &JobStatusResponse) {
    match status.status.as_str() {
        "completed" => {
            assert!(status.result_url.is_some(), "completed job without resultUrl");
            assert!(status.error.is_none());
            assert_eq!(status.progress, 100);
        }
        "failed" => {
            assert!(status.error.is_some(), "failed job without error");
            assert!(status.result_url.is_none());
        }
        other => panic!("job is not terminal: {}", other),
    }
}
