use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::generation::{JobListResponse, JobStatusResponse, SubmitResponse};
use crate::models::job::{GenerationInput, JobStatus};
use crate::routes::error::ApiError;
use crate::services::validation::validate_credential;

/// Form fields of a generation request, before validation.
#[derive(Debug, Default)]
struct GenerationForm {
    kind: Option<String>,
    text: Option<String>,
    image: Option<UploadedFile>,
    token: Option<String>,
}

#[derive(Debug)]
struct UploadedFile {
    bytes: Vec<u8>,
    mime_type: String,
    filename: String,
}

async fn read_form(mut multipart: Multipart) -> Result<GenerationForm, ApiError> {
    let mut form = GenerationForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);

        // `input` carries either the prompt or the image, depending on `type`.
        if name == "image" || (name == "input" && filename.is_some()) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("failed to read image: {}", e)))?;
            form.image = Some(UploadedFile {
                bytes: bytes.to_vec(),
                mime_type: content_type.unwrap_or_else(|| "application/octet-stream".to_string()),
                filename: filename.unwrap_or_else(|| "upload".to_string()),
            });
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read field '{}': {}", name, e)))?;
        match name.as_str() {
            "type" => form.kind = Some(value),
            "input" | "prompt" => form.text = Some(value),
            "token" => form.token = Some(value),
            _ => tracing::debug!(field = %name, "Ignoring unknown form field"),
        }
    }

    Ok(form)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn into_input(form: GenerationForm) -> Result<GenerationInput, ApiError> {
    let kind = form
        .kind
        .ok_or_else(|| ApiError::BadRequest("missing 'type' field".to_string()))?;

    match kind.trim() {
        "text" => {
            if form.image.is_some() {
                return Err(ApiError::BadRequest(
                    "text requests must not include an image".to_string(),
                ));
            }
            let text = form
                .text
                .ok_or_else(|| ApiError::BadRequest("missing 'input' field".to_string()))?;
            Ok(GenerationInput::Text { text })
        }
        "image" => {
            let file = form
                .image
                .ok_or_else(|| ApiError::BadRequest("missing image file".to_string()))?;
            Ok(GenerationInput::Image {
                bytes: file.bytes,
                mime_type: file.mime_type,
                filename: file.filename,
            })
        }
        other => Err(ApiError::BadRequest(format!(
            "unsupported type '{}'; expected 'text' or 'image'",
            other
        ))),
    }
}

/// POST /api/v1/models: submit a text or image generation request.
pub async fn submit_generation(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let form = read_form(multipart).await?;

    let token = bearer_token(&headers)
        .or_else(|| form.token.clone())
        .ok_or(ApiError::MissingCredential)?;
    let credential = validate_credential(&token)?;
    let input = into_input(form)?;

    let job_id = state.orchestrator.submit(input, credential).await?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            job_id,
            status: JobStatus::Pending,
            message: "Generation job accepted".to_string(),
            estimated_time: state.orchestrator.settings().job_timeout.as_secs(),
        }),
    ))
}

/// GET /api/v1/models/{job_id}/status: current state of a job.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let job_id = Uuid::parse_str(&job_id)
        .map_err(|_| ApiError::BadRequest(format!("invalid job id '{}'", job_id)))?;

    let job = state
        .orchestrator
        .status(job_id)
        .await
        .ok_or(ApiError::JobNotFound(job_id))?;

    Ok(Json(job.into()))
}

/// GET /api/v1/models: every job still held in memory.
pub async fn list_jobs(State(state): State<AppState>) -> Json<JobListResponse> {
    let jobs: Vec<JobStatusResponse> = state
        .orchestrator
        .list_jobs()
        .await
        .into_iter()
        .map(JobStatusResponse::from)
        .collect();

    Json(JobListResponse {
        total: jobs.len(),
        jobs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer tsk_abcdef123"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("tsk_abcdef123"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_text_form_into_input() {
        let form = GenerationForm {
            kind: Some("text".to_string()),
            text: Some("a red chair".to_string()),
            ..Default::default()
        };
        let input = into_input(form).unwrap();
        assert!(matches!(input, GenerationInput::Text { ref text } if text == "a red chair"));
    }

    #[test]
    fn test_form_shape_errors() {
        assert!(matches!(
            into_input(GenerationForm::default()),
            Err(ApiError::BadRequest(_))
        ));

        let form = GenerationForm {
            kind: Some("image".to_string()),
            ..Default::default()
        };
        assert!(matches!(into_input(form), Err(ApiError::BadRequest(_))));

        let form = GenerationForm {
            kind: Some("video".to_string()),
            text: Some("x".to_string()),
            ..Default::default()
        };
        assert!(matches!(into_input(form), Err(ApiError::BadRequest(_))));

        let form = GenerationForm {
            kind: Some("text".to_string()),
            text: Some("chair".to_string()),
            image: Some(UploadedFile {
                bytes: vec![1],
                mime_type: "image/png".to_string(),
                filename: "a.png".to_string(),
            }),
            ..Default::default()
        };
        assert!(matches!(into_input(form), Err(ApiError::BadRequest(_))));
    }
}
