//! Input validation performed before a job is accepted.

use garde::Validate;
use image::ImageFormat;

use crate::models::job::{GenerationInput, ProviderCredential};

#[derive(Debug, Clone)]
pub struct InputLimits {
    pub max_file_size: usize,
    pub max_text_length: usize,
    /// Lowercased MIME types.
    pub allowed_image_types: Vec<String>,
}

impl Default for InputLimits {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
            max_text_length: 1_000,
            allowed_image_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/webp".to_string(),
            ],
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("text input must not be empty")]
    EmptyText,

    #[error("text input exceeds {max} characters")]
    TextTooLong { max: usize },

    #[error("text input contains disallowed markup")]
    UnsafeText,

    #[error("image file must not be empty")]
    EmptyImage,

    #[error("image is {size} bytes; maximum is {max} bytes")]
    ImageTooLarge { size: usize, max: usize },

    #[error("unsupported image type '{0}'")]
    UnsupportedImageType(String),

    #[error("image content does not match declared type '{declared}'")]
    ImageTypeMismatch { declared: String },

    #[error("invalid credential: {0}")]
    InvalidCredential(String),
}

/// Check the shape of a generation payload against `limits`.
pub fn validate_input(input: &GenerationInput, limits: &InputLimits) -> Result<(), ValidationError> {
    match input {
        GenerationInput::Text { text } => validate_text(text, limits),
        GenerationInput::Image {
            bytes, mime_type, ..
        } => validate_image(bytes, mime_type, limits),
    }
}

fn validate_text(text: &str, limits: &InputLimits) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::EmptyText);
    }
    if text.chars().count() > limits.max_text_length {
        return Err(ValidationError::TextTooLong {
            max: limits.max_text_length,
        });
    }
    if contains_markup(text) {
        return Err(ValidationError::UnsafeText);
    }
    Ok(())
}

/// Script tags, `javascript:` URLs and inline `on*=` handlers.
fn contains_markup(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    if lower.contains("<script") || lower.contains("javascript:") {
        return true;
    }

    let bytes = lower.as_bytes();
    let mut i = 0;
    while let Some(pos) = lower[i..].find("on") {
        let start = i + pos;
        let preceded_by_word = start > 0 && bytes[start - 1].is_ascii_alphanumeric();
        let mut j = start + 2;
        while j < bytes.len() && bytes[j].is_ascii_alphabetic() {
            j += 1;
        }
        let name_len = j - start - 2;
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        if !preceded_by_word && name_len > 0 && j < bytes.len() && bytes[j] == b'=' {
            return true;
        }
        i = start + 2;
    }
    false
}

fn validate_image(bytes: &[u8], mime_type: &str, limits: &InputLimits) -> Result<(), ValidationError> {
    if bytes.is_empty() {
        return Err(ValidationError::EmptyImage);
    }
    if bytes.len() > limits.max_file_size {
        return Err(ValidationError::ImageTooLarge {
            size: bytes.len(),
            max: limits.max_file_size,
        });
    }

    let declared = mime_type.to_ascii_lowercase();
    let declared = if declared == "image/jpg" {
        "image/jpeg".to_string()
    } else {
        declared
    };
    if !limits.allowed_image_types.iter().any(|t| *t == declared) {
        return Err(ValidationError::UnsupportedImageType(mime_type.to_string()));
    }

    let sniffed = image::guess_format(bytes).map_err(|_| ValidationError::ImageTypeMismatch {
        declared: mime_type.to_string(),
    })?;
    if format_mime(sniffed) != Some(declared.as_str()) {
        return Err(ValidationError::ImageTypeMismatch {
            declared: mime_type.to_string(),
        });
    }
    Ok(())
}

fn format_mime(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Png => Some("image/png"),
        ImageFormat::WebP => Some("image/webp"),
        _ => None,
    }
}

#[derive(Debug, Validate)]
struct CredentialCheck {
    #[garde(length(min = 10, max = 500), custom(token_charset))]
    token: String,
}

fn token_charset(value: &str, _: &()) -> garde::Result {
    if value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        Ok(())
    } else {
        Err(garde::Error::new(
            "may only contain letters, digits, '.', '_' and '-'",
        ))
    }
}

/// Validate a caller-supplied bearer token before accepting it.
pub fn validate_credential(token: &str) -> Result<ProviderCredential, ValidationError> {
    let check = CredentialCheck {
        token: token.to_string(),
    };
    check
        .validate()
        .map_err(|report| ValidationError::InvalidCredential(report.to_string()))?;
    Ok(ProviderCredential::new(check.token))
}
