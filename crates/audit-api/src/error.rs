//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps domain errors from audit-state and audit-testing to HTTP status
//! codes with a JSON body `{"error": {"code", "message", "details?"}}`.
//! Form validation failures carry per-field detail; internal errors are
//! logged and never echoed.

use audit_core::FormErrors;
use audit_state::{ControlError, EngagementError, MatrixError};
use audit_testing::TestingError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "VALIDATION_ERROR").
    pub code: String,
    pub message: String,
    /// Per-field errors for rejected forms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Business-rule rejection of otherwise well-formed input (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Creation form rejected; every field error is returned (422).
    #[error("validation error: {0}")]
    Form(FormErrors),

    /// Request body could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Operation not allowed in the current state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) | Self::Form(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR")
            }
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        if matches!(&self, Self::Internal(_)) {
            tracing::error!(error = %self, "internal server error");
        }

        let details = match &self {
            Self::Form(errors) => serde_json::to_value(errors).ok(),
            _ => None,
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<FormErrors> for AppError {
    fn from(errors: FormErrors) -> Self {
        Self::Form(errors)
    }
}

impl From<ControlError> for AppError {
    fn from(err: ControlError) -> Self {
        match &err {
            ControlError::InvalidTransition { .. } | ControlError::TestingBlocked(_) => {
                Self::Conflict(err.to_string())
            }
            ControlError::NotAllSamplesTested { .. } | ControlError::MissingRejectionReason => {
                Self::Validation(err.to_string())
            }
        }
    }
}

impl From<EngagementError> for AppError {
    fn from(err: EngagementError) -> Self {
        match err {
            EngagementError::Control(inner) => inner.into(),
            EngagementError::UnknownControl(_) => Self::NotFound(err.to_string()),
            EngagementError::Closed(_) | EngagementError::NotClosed(_) => {
                Self::Conflict(err.to_string())
            }
        }
    }
}

impl From<MatrixError> for AppError {
    fn from(err: MatrixError) -> Self {
        match &err {
            MatrixError::NotValidated { .. } | MatrixError::Locked(_) => {
                Self::Conflict(err.to_string())
            }
            MatrixError::EmptySelection => Self::Validation(err.to_string()),
            MatrixError::UnknownRow(_) => Self::NotFound(err.to_string()),
        }
    }
}

impl From<TestingError> for AppError {
    fn from(err: TestingError) -> Self {
        match &err {
            TestingError::UnknownSample(_) | TestingError::UnknownRule(_) => {
                Self::NotFound(err.to_string())
            }
            TestingError::SessionLocked { .. } | TestingError::Blocked(_) => {
                Self::Conflict(err.to_string())
            }
            TestingError::NotAllSamplesTested { .. } | TestingError::Evidence(_) => {
                Self::Validation(err.to_string())
            }
        }
    }
}

impl From<audit_core::AuditError> for AppError {
    fn from(err: audit_core::AuditError) -> Self {
        match err {
            audit_core::AuditError::NotFound(msg) => Self::NotFound(msg),
            audit_core::AuditError::Form(errors) => Self::Form(errors),
            audit_core::AuditError::Validation(msg) => Self::BadRequest(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}
