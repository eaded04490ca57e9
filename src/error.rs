//! Error types for image intake and transformation.

use std::time::Duration;

/// Longest remote error body kept in an error message.
const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Errors that can occur while preparing or transforming an image.
#[derive(Debug, thiserror::Error)]
pub enum PlushyError {
    /// The declared content type of the selected file is not an image type.
    #[error("Please upload a valid image file")]
    InvalidFileType {
        /// The content type the file was declared with.
        content_type: String,
    },

    /// The selected file could not be read.
    #[error("Failed to read file")]
    ReadFile(#[source] std::io::Error),

    /// The file contents could not be decoded as an image.
    #[error("Failed to load image")]
    LoadImage(#[source] image::ImageError),

    /// The normalization surface could not be allocated or encoded.
    #[error("Canvas context not available")]
    Canvas(String),

    /// The response held no candidate content parts.
    #[error("No content generated")]
    NoContentGenerated,

    /// The response held parts, but none with inline image data.
    #[error("No image data found in response")]
    NoImageData,

    /// API key missing or rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Sanitized error message from the response body.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("rate limited{}", format_retry_after(*retry_after))]
    RateLimited {
        /// Server-suggested delay, if any.
        retry_after: Option<Duration>,
    },

    /// Content was blocked by safety filters.
    #[error("content blocked: {0}")]
    ContentBlocked(String),

    /// Network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Failed to decode base64 data.
    #[error("failed to decode: {0}")]
    Decode(String),

    /// I/O error (e.g., saving the result).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PlushyError {
    /// Returns true if this error came from intake of a source image.
    ///
    /// Intake errors leave the previously selected image in place.
    pub fn is_intake(&self) -> bool {
        matches!(
            self,
            Self::InvalidFileType { .. } | Self::ReadFile(_) | Self::LoadImage(_) | Self::Canvas(_)
        )
    }

    /// Returns true if this error came from the remote transformation call.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::NoContentGenerated
                | Self::NoImageData
                | Self::Auth(_)
                | Self::Api { .. }
                | Self::RateLimited { .. }
                | Self::ContentBlocked(_)
                | Self::Network(_)
        )
    }
}

/// Result type alias for plushy operations.
pub type Result<T> = std::result::Result<T, PlushyError>;

/// Extracts a readable message from a remote error body.
///
/// Google APIs answer with `{"error": {"message": "..."}}`; that message is
/// preferred over the raw body. Long bodies are truncated.
pub(crate) fn sanitize_error_message(body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());

    if message.chars().count() > MAX_ERROR_MESSAGE_LEN {
        let truncated: String = message.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
        format!("{truncated}...")
    } else {
        message
    }
}

fn format_retry_after(retry_after: Option<Duration>) -> String {
    retry_after
        .map(|d| format!(", retry after {}s", d.as_secs()))
        .unwrap_or_default()
}

/// Reads a `Retry-After` header given in seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

    #[test]
    fn test_user_facing_messages() {
        assert_eq!(
            PlushyError::NoContentGenerated.to_string(),
            "No content generated"
        );
        assert_eq!(
            PlushyError::NoImageData.to_string(),
            "No image data found in response"
        );
        assert_eq!(
            PlushyError::InvalidFileType {
                content_type: "text/plain".into()
            }
            .to_string(),
            "Please upload a valid image file"
        );
        assert_eq!(
            PlushyError::Canvas("zero-sized".into()).to_string(),
            "Canvas context not available"
        );
    }

    #[test]
    fn test_error_display() {
        let err = PlushyError::Api {
            status: 500,
            message: "Internal error".into(),
        };
        assert_eq!(err.to_string(), "API error: 500 - Internal error");

        let err = PlushyError::ContentBlocked("SAFETY".into());
        assert_eq!(err.to_string(), "content blocked: SAFETY");
    }

    #[test]
    fn test_rate_limited_display() {
        let err = PlushyError::RateLimited {
            retry_after: Some(Duration::from_secs(12)),
        };
        assert_eq!(err.to_string(), "rate limited, retry after 12s");

        let err = PlushyError::RateLimited { retry_after: None };
        assert_eq!(err.to_string(), "rate limited");
    }

    #[test]
    fn test_classification() {
        assert!(PlushyError::ReadFile(std::io::Error::other("gone")).is_intake());
        assert!(PlushyError::Canvas("x".into()).is_intake());
        assert!(!PlushyError::NoImageData.is_intake());

        assert!(PlushyError::NoContentGenerated.is_remote());
        assert!(PlushyError::RateLimited { retry_after: None }.is_remote());
        assert!(!PlushyError::Decode("bad".into()).is_remote());
    }

    #[test]
    fn test_sanitize_google_error_body() {
        let body = r#"{"error": {"code": 400, "message": "Image too large", "status": "INVALID_ARGUMENT"}}"#;
        assert_eq!(sanitize_error_message(body), "Image too large");
    }

    #[test]
    fn test_sanitize_plain_body() {
        assert_eq!(sanitize_error_message("  upstream failure \n"), "upstream failure");

        let long = "x".repeat(MAX_ERROR_MESSAGE_LEN + 20);
        let sanitized = sanitize_error_message(&long);
        assert!(sanitized.ends_with("..."));
        assert_eq!(sanitized.len(), MAX_ERROR_MESSAGE_LEN + 3);
    }

    #[test]
    fn test_parse_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("30"));
        assert_eq!(parse_retry_after(&headers), Some(30));

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }
}
