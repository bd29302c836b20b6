//! Realtime service error types with HTTP status code mapping.
//!
//! [`RealtimeError`] is the central error type of the service. Notification
//! failures degrade a single delivery and are logged by the caller; the
//! HTTP layer maps each variant to a status code and a structured JSON body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::UserId;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "no live channel for user u1",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Service error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status               |
/// |-----------|-----------------|---------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request           |
/// | 2000–2999 | Not Found       | 404 Not Found             |
/// | 3000–3999 | Server          | 500 Internal Server Error |
/// | 5000–5999 | Delivery        | 502 Bad Gateway           |
#[derive(Debug, Clone, thiserror::Error)]
pub enum RealtimeError {
    /// No live or rehydratable channel exists for the user.
    #[error("no live channel for user {0}")]
    NotFound(UserId),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A payload or a stored channel descriptor could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Writing to a client channel failed (closed, full, or timed out).
    #[error("transport write to {user_id} failed: {reason}")]
    TransportWrite {
        /// Recipient of the failed write.
        user_id: UserId,
        /// Why the write failed.
        reason: String,
    },

    /// The row counter backing `newblog` failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The shared handle store or peer relay failed.
    #[error("store error: {0}")]
    Store(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RealtimeError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::Serialization(_) => 1002,
            Self::NotFound(_) => 2001,
            Self::Internal(_) => 3000,
            Self::Persistence(_) => 3001,
            Self::Store(_) => 3002,
            Self::TransportWrite { .. } => 5001,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::Serialization(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::TransportWrite { .. } => StatusCode::BAD_GATEWAY,
            Self::Persistence(_) | Self::Store(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns `true` if the error means the recipient is unreachable,
    /// as opposed to the message itself being bad.
    #[must_use]
    pub const fn is_delivery_failure(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::TransportWrite { .. })
    }
}

impl From<serde_json::Error> for RealtimeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<redis::RedisError> for RealtimeError {
    fn from(err: redis::RedisError) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<sqlx::Error> for RealtimeError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl IntoResponse for RealtimeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let details = match &self {
            Self::TransportWrite { user_id, .. } => Some(format!("recipient: {user_id}")),
            _ => None,
        };
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn user(raw: &str) -> UserId {
        let Ok(id) = UserId::parse(raw) else {
            panic!("valid user id");
        };
        id
    }

    #[test]
    fn not_found_maps_to_404() {
        let err = RealtimeError::NotFound(user("ghost"));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.error_code(), 2001);
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn transport_write_maps_to_bad_gateway() {
        let err = RealtimeError::TransportWrite {
            user_id: user("u1"),
            reason: "channel closed".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert!(err.is_delivery_failure());
    }

    #[test]
    fn serialization_is_not_a_delivery_failure() {
        let err = RealtimeError::Serialization("bad payload".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_delivery_failure());
    }

    #[test]
    fn serde_json_error_converts_to_serialization() {
        let parsed = serde_json::from_str::<serde_json::Value>("{not json");
        let Err(e) = parsed else {
            panic!("expected parse failure");
        };
        let err = RealtimeError::from(e);
        assert!(matches!(err, RealtimeError::Serialization(_)));
    }

    #[test]
    fn into_response_sets_status() {
        let response = RealtimeError::Store("redis down".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
