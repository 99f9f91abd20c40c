use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use uuid::Uuid;

use crate::services::orchestrator::SubmitError;
use crate::services::validation::ValidationError;

/// Errors surfaced to API callers as `{"error": {"code", "message"}}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    BadRequest(String),

    #[error("missing provider credential")]
    MissingCredential,

    #[error("job {0} not found")]
    JobNotFound(Uuid),

    #[error("service is shutting down")]
    ShuttingDown,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Validation(ValidationError::ImageTooLarge { .. }) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "FILE_TOO_LARGE")
            }
            ApiError::Validation(ValidationError::UnsupportedImageType(_))
            | ApiError::Validation(ValidationError::ImageTypeMismatch { .. }) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "INVALID_FILE_TYPE")
            }
            ApiError::Validation(ValidationError::InvalidCredential(_)) => {
                (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIAL")
            }
            ApiError::Validation(_) | ApiError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
            }
            ApiError::MissingCredential => (StatusCode::UNAUTHORIZED, "MISSING_CREDENTIAL"),
            ApiError::JobNotFound(_) => (StatusCode::NOT_FOUND, "JOB_NOT_FOUND"),
            ApiError::ShuttingDown => (StatusCode::SERVICE_UNAVAILABLE, "SHUTTING_DOWN"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Validation(e) => ApiError::Validation(e),
            SubmitError::ShuttingDown => ApiError::ShuttingDown,
            SubmitError::Registry(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(code, error = %self, "Request failed");
        } else {
            tracing::debug!(code, error = %self, "Request rejected");
        }

        let body = json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::Validation(ValidationError::EmptyText), StatusCode::BAD_REQUEST),
            (
                ApiError::Validation(ValidationError::ImageTooLarge { size: 2, max: 1 }),
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                ApiError::Validation(ValidationError::UnsupportedImageType("image/gif".into())),
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
            (ApiError::MissingCredential, StatusCode::UNAUTHORIZED),
            (ApiError::JobNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (ApiError::ShuttingDown, StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_submit_error_conversion() {
        let err: ApiError = SubmitError::ShuttingDown.into();
        assert!(matches!(err, ApiError::ShuttingDown));
        let err: ApiError = SubmitError::Validation(ValidationError::EmptyText).into();
        assert!(matches!(err, ApiError::Validation(ValidationError::EmptyText)));
    }
}
