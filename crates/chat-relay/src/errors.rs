//! Relay error types.
//!
//! All errors map to HTTP responses via the `IntoResponse` impl. Messages
//! returned to clients are generic; the underlying detail is logged
//! server-side.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Relay error type.
///
/// Maps to HTTP status codes:
/// - `AuthRequired`: 302 Found (redirect to the external login flow)
/// - `Provision`: 503 Service Unavailable
/// - `Storage`, `Internal`: 500 Internal Server Error
/// - `Delivery`: 502 Bad Gateway
/// - `InvalidChannelToken`: 403 Forbidden
#[derive(Debug, Error)]
pub enum RelayError {
    /// No identified principal. Handled by redirecting, not a failure.
    #[error("Authentication required")]
    AuthRequired { login_url: String },

    /// Channel allocation failed.
    #[error("Channel provisioning error: {0}")]
    Provision(String),

    /// Presence registry read or write failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Push to a single recipient failed.
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// Channel token is unknown, superseded, expired or already opened.
    #[error("Invalid channel token")]
    InvalidChannelToken,

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::AuthRequired { .. } => StatusCode::FOUND,
            RelayError::Provision(_) => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::Storage(_) | RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::Delivery(_) => StatusCode::BAD_GATEWAY,
            RelayError::InvalidChannelToken => StatusCode::FORBIDDEN,
        }
    }

    /// Returns a client-safe error message (no internal details).
    pub fn client_message(&self) -> String {
        match self {
            RelayError::AuthRequired { .. } => "Login required".to_string(),
            RelayError::Provision(_) => "Could not open a chat channel, please retry".to_string(),
            RelayError::Storage(_) | RelayError::Internal(_) => {
                "An internal error occurred".to_string()
            }
            RelayError::Delivery(_) => "Message delivery failed".to_string(),
            RelayError::InvalidChannelToken => "Invalid or expired channel token".to_string(),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            RelayError::AuthRequired { .. } => "AUTH_REQUIRED",
            RelayError::Provision(_) => "PROVISION_FAILED",
            RelayError::Storage(_) => "STORAGE_ERROR",
            RelayError::Delivery(_) => "DELIVERY_FAILED",
            RelayError::InvalidChannelToken => "INVALID_CHANNEL_TOKEN",
            RelayError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        if let RelayError::AuthRequired { login_url } = &self {
            return (StatusCode::FOUND, [(header::LOCATION, login_url.clone())]).into_response();
        }

        match &self {
            RelayError::Storage(err) => {
                tracing::error!(target: "relay.errors", error = %err, "Presence storage failed");
            }
            RelayError::Provision(err) => {
                tracing::warn!(target: "relay.errors", error = %err, "Channel provisioning failed");
            }
            RelayError::Internal(err) => {
                tracing::error!(target: "relay.errors", error = %err, "Internal error");
            }
            _ => {}
        }

        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.client_message(),
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(
            RelayError::AuthRequired {
                login_url: "/login".to_string()
            }
            .status_code(),
            StatusCode::FOUND
        );
        assert_eq!(
            RelayError::Provision("down".to_string()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            RelayError::Storage("timeout".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            RelayError::Delivery("closed".to_string()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            RelayError::InvalidChannelToken.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            RelayError::Internal("oops".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_client_messages_hide_internal_details() {
        let err = RelayError::Storage("connection refused at 10.0.0.7:6379".to_string());
        assert!(!err.client_message().contains("10.0.0.7"));
        assert_eq!(err.client_message(), "An internal error occurred");

        let err = RelayError::Provision("platform quota exhausted for tenant 42".to_string());
        assert!(!err.client_message().contains("tenant"));
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            RelayError::Storage("timeout".to_string()).to_string(),
            "Storage error: timeout"
        );
        assert_eq!(
            RelayError::Delivery("no live channel for u1".to_string()).to_string(),
            "Delivery error: no live channel for u1"
        );
        assert_eq!(
            RelayError::InvalidChannelToken.to_string(),
            "Invalid channel token"
        );
    }

    #[tokio::test]
    async fn test_auth_required_redirects() {
        let response = RelayError::AuthRequired {
            login_url: "https://id.example.com/login?continue=/".to_string(),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "https://id.example.com/login?continue=/"
        );
    }

    #[tokio::test]
    async fn test_storage_error_response_body() {
        let response = RelayError::Storage("WRONGTYPE".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "STORAGE_ERROR");
        assert_eq!(body["error"]["message"], "An internal error occurred");
    }

    #[tokio::test]
    async fn test_internal_error_response_body() {
        let response = RelayError::Internal("serialization failed".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(body["error"]["message"], "An internal error occurred");
    }
}
