use serde::Deserialize;
use thiserror::Error;

use crate::auth::RefreshError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("{message}")]
    Validation { status: u16, message: String },

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Network error - check your connection: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<RefreshError> for ApiError {
    fn from(e: RefreshError) -> Self {
        ApiError::AuthenticationRequired(e.to_string())
    }
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// `{message}` or `{error}` carried by backend error bodies
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    /// The server's own message, if the body carries one.
    fn server_message(body: &str) -> Option<String> {
        let parsed: ErrorBody = serde_json::from_str(body).ok()?;
        parsed
            .message
            .or(parsed.error)
            .filter(|m| !m.trim().is_empty())
    }

    fn generic_message(status: u16) -> &'static str {
        match status {
            400 => "The request was invalid",
            401 => "Your session has expired, please log in again",
            403 => "You do not have permission to perform this action",
            404 => "The requested resource was not found",
            409 => "The request conflicts with the current state of the resource",
            413 => "The uploaded file is too large",
            422 => "Some of the submitted fields are invalid",
            429 => "Too many requests, please wait and try again",
            500..=599 => "The server encountered an error, please try again later",
            _ => "The request could not be completed",
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let code = status.as_u16();
        let message = Self::server_message(body)
            .unwrap_or_else(|| Self::generic_message(code).to_string());
        match code {
            401 => ApiError::AuthenticationRequired(message),
            403 => ApiError::AccessDenied(message),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::Server {
                status: code,
                message: Self::server_message(body)
                    .unwrap_or_else(|| Self::truncate_body(body)),
            },
            _ => ApiError::Validation { status: code, message },
        }
    }

    pub fn is_auth_required(&self) -> bool {
        matches!(self, ApiError::AuthenticationRequired(_))
    }

    /// Connection failures and timeouts, which are safe to retry for GETs.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Network(e) if e.is_connect() || e.is_timeout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_validation_uses_server_message() {
        let err = ApiError::from_status(StatusCode::BAD_REQUEST, r#"{"message": "Due date is required"}"#);
        match err {
            ApiError::Validation { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Due date is required");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_error_field_is_fallback() {
        let err = ApiError::from_status(StatusCode::CONFLICT, r#"{"error": "Email already registered"}"#);
        assert_eq!(err.to_string(), "Email already registered");
    }

    #[test]
    fn test_generic_message_per_status() {
        let err = ApiError::from_status(StatusCode::NOT_FOUND, "<html>nope</html>");
        assert_eq!(err.to_string(), "The requested resource was not found");

        let err = ApiError::from_status(StatusCode::UNPROCESSABLE_ENTITY, "");
        assert_eq!(err.to_string(), "Some of the submitted fields are invalid");
    }

    #[test]
    fn test_status_categories() {
        assert!(ApiError::from_status(StatusCode::UNAUTHORIZED, "").is_auth_required());
        assert!(matches!(ApiError::from_status(StatusCode::FORBIDDEN, ""), ApiError::AccessDenied(_)));
        assert!(matches!(ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""), ApiError::RateLimited));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, "upstream down"),
            ApiError::Server { status: 502, .. }
        ));
    }

    #[test]
    fn test_truncate_body_respects_char_boundaries() {
        let body = "é".repeat(400);
        let truncated = ApiError::truncate_body(&body);
        assert!(truncated.contains("truncated, 800 total bytes"));
    }

    #[test]
    fn test_refresh_error_maps_to_auth_required() {
        let err: ApiError = RefreshError::MissingRefreshToken.into();
        assert!(err.is_auth_required());
    }
}
