//! Error types for the APIS client
//!
//! Every failure a request can produce is an [`ApiError`]. Branching on
//! retry/logout/notify is done on [`ErrorKind`], never on the variant payload.

use crate::auth::types::AuthError;
use reqwest::StatusCode;
use serde::Deserialize;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ApiError>;

/// Error body returned by the APIS server
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default)]
    pub code: Option<u16>,
}

/// Classification tag for [`ApiError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transport failure, no response received
    Network,
    /// Login rejected
    InvalidCredentials,
    /// HTTP 429
    RateLimited,
    /// HTTP 401 after the retry budget was spent
    SessionExpired,
    /// HTTP 403
    Forbidden,
    /// HTTP 409
    Conflict,
    /// Any other non-2xx response
    Server,
    /// Bounded wait elapsed
    Timeout,
    /// Superseded or aborted by the caller
    Cancelled,
    /// Local failure before or after the exchange
    Client,
}

/// Client error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Too many requests. Please wait before trying again.")]
    RateLimited,

    #[error("Your session has expired. Please log in again.")]
    SessionExpired,

    #[error("Access denied: {message}")]
    Forbidden { message: String },

    #[error("{message}")]
    Conflict { message: String },

    #[error("Login failed: {message}")]
    Login { message: String },

    #[error("Request failed with status {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Authentication mode is not available")]
    ModeUnavailable,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl ApiError {
    /// Classification used by the retry/logout/notify branches
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Network(e) if e.is_timeout() => ErrorKind::Timeout,
            ApiError::Network(_) => ErrorKind::Network,
            ApiError::InvalidCredentials => ErrorKind::InvalidCredentials,
            ApiError::RateLimited => ErrorKind::RateLimited,
            ApiError::SessionExpired => ErrorKind::SessionExpired,
            ApiError::Forbidden { .. } => ErrorKind::Forbidden,
            ApiError::Conflict { .. } => ErrorKind::Conflict,
            ApiError::Login { .. } | ApiError::Server { .. } => ErrorKind::Server,
            ApiError::Timeout => ErrorKind::Timeout,
            ApiError::Cancelled => ErrorKind::Cancelled,
            ApiError::ModeUnavailable
            | ApiError::InvalidRequest(_)
            | ApiError::Decode(_)
            | ApiError::Auth(_) => ErrorKind::Client,
        }
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::RateLimited => Some(429),
            ApiError::SessionExpired => Some(401),
            ApiError::Forbidden { .. } => Some(403),
            ApiError::Conflict { .. } => Some(409),
            ApiError::Server { status, .. } => Some(*status),
            ApiError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Authentication-class errors never reach the notification channel
    pub fn is_auth_failure(&self) -> bool {
        self.kind() == ErrorKind::SessionExpired
    }

    /// Map a non-success response to an error. 401 is classified here as
    /// [`ApiError::SessionExpired`]; the pipeline only calls this once its
    /// own 401 handling is exhausted.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorResponse>(body)
            .map(|e| e.error)
            .unwrap_or_else(|_| {
                if body.trim().is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("Unknown error")
                        .to_string()
                } else {
                    body.trim().to_string()
                }
            });

        match status {
            StatusCode::UNAUTHORIZED => ApiError::SessionExpired,
            StatusCode::FORBIDDEN => ApiError::Forbidden { message },
            StatusCode::CONFLICT => ApiError::Conflict { message },
            StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited,
            _ => ApiError::Server {
                status: status.as_u16(),
                message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let err = ApiError::from_status(StatusCode::FORBIDDEN, r#"{"error":"Access denied","code":403}"#);
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(err.to_string(), "Access denied: Access denied");

        let err = ApiError::from_status(StatusCode::CONFLICT, r#"{"error":"Hive name already exists","code":409}"#);
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.to_string(), "Hive name already exists");

        assert_eq!(
            ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, "").kind(),
            ErrorKind::RateLimited
        );
        assert!(ApiError::from_status(StatusCode::UNAUTHORIZED, "").is_auth_failure());
    }

    #[test]
    fn test_unparseable_body_is_kept_as_message() {
        let err = ApiError::from_status(StatusCode::BAD_GATEWAY, "upstream down\n");
        assert_eq!(err.status(), Some(502));
        assert_eq!(err.to_string(), "Request failed with status 502: upstream down");

        let err = ApiError::from_status(StatusCode::NOT_FOUND, "");
        assert_eq!(err.to_string(), "Request failed with status 404: Not Found");
    }
}
