//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::backend::{AuthError, StoreError, StoreErrorCode};
use crate::clinic::ClinicError;
use crate::core_state::CoreError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
    /// Set for failures the client should offer to retry.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub connection_issue: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,
    #[error("Sign-in failed: {0}")]
    SignInFailed(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Connection issue: {0}")]
    ConnectionIssue(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "AUTH_REQUIRED",
                "Authentication required".to_string(),
            ),
            ApiError::SignInFailed(detail) => {
                (StatusCode::UNAUTHORIZED, "AUTH_FAILED", detail.clone())
            }
            ApiError::Forbidden(detail) => (StatusCode::FORBIDDEN, "FORBIDDEN", detail.clone()),
            ApiError::RateLimited(detail) => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                detail.clone(),
            ),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail.clone()),
            ApiError::Conflict(detail) => (StatusCode::CONFLICT, "CONFLICT", detail.clone()),
            ApiError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone())
            }
            ApiError::ConnectionIssue(detail) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "CONNECTION_ISSUE",
                detail.clone(),
            ),
            ApiError::Storage(detail) => {
                tracing::warn!(detail, "API storage error");
                (StatusCode::BAD_GATEWAY, "STORAGE_ERROR", detail.clone())
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let connection_issue = matches!(self, ApiError::ConnectionIssue(_));
        let body = ErrorBody {
            error: ErrorDetail {
                code,
                message,
                retryable: connection_issue,
            },
            connection_issue,
        };

        let mut response = (status, Json(body)).into_response();
        if matches!(self, ApiError::RateLimited(_)) {
            response.headers_mut().insert(
                "Retry-After",
                axum::http::HeaderValue::from_static("60"),
            );
        }
        response
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Store(e) => e.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err.code {
            // Transient in the retry loop, so retryable for the client too.
            None
            | Some(
                StoreErrorCode::Unavailable
                | StoreErrorCode::ResourceExhausted
                | StoreErrorCode::DeadlineExceeded
                | StoreErrorCode::Aborted,
            ) => ApiError::ConnectionIssue(err.message),
            Some(StoreErrorCode::NotFound) => ApiError::NotFound(err.message),
            Some(StoreErrorCode::AlreadyExists) => ApiError::Conflict(err.message),
            Some(StoreErrorCode::InvalidArgument) => ApiError::BadRequest(err.message),
            Some(StoreErrorCode::PermissionDenied) => ApiError::Forbidden(err.message),
            Some(StoreErrorCode::Internal) => ApiError::Internal(err.message),
        }
    }
}

impl From<ClinicError> for ApiError {
    fn from(err: ClinicError) -> Self {
        match err {
            ClinicError::PatientNotFound(_)
            | ClinicError::NoVisitData(_)
            | ClinicError::VisitNotFound(_) => ApiError::NotFound(err.to_string()),
            ClinicError::Validation(msg) => ApiError::BadRequest(msg),
            ClinicError::Store(e) => e.into(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let message = err.user_message();
        match err {
            AuthError::InvalidEmail(_) | AuthError::WeakPassword => ApiError::BadRequest(message),
            AuthError::EmailAlreadyInUse(_) => ApiError::Conflict(message),
            AuthError::UserNotFound(_) | AuthError::WrongPassword => {
                ApiError::SignInFailed(message)
            }
            AuthError::TooManyRequests(_) => ApiError::RateLimited(message),
            AuthError::NetworkRequestFailed(_) => ApiError::ConnectionIssue(message),
            AuthError::InvalidSession => ApiError::Unauthorized,
            AuthError::Store(detail) => ApiError::Internal(detail),
        }
    }
}
