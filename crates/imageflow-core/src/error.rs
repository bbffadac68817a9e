//! Unified pipeline error type.
//!
//! Every handler returns `Result<T, PipelineError>`, which implements
//! [`axum::response::IntoResponse`] so errors are automatically converted
//! to a JSON-body HTTP response with the status code prescribed by the
//! error taxonomy.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// One field-level problem found by the Request Validator.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

/// All errors that can occur while handling a pipeline request.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing/malformed fields, unsupported MIME, oversize file or
    /// aggregate, invalid aspect ratio. Surfaced as 400 with the documented
    /// `{"message": ..., "issues": [...]}` body. `issues` is empty for
    /// validation failures that have no natural per-field breakdown (a
    /// malformed multipart body, an unauthorized proxy request, and so on).
    #[error("{message}")]
    Validation {
        message: String,
        issues: Vec<ValidationIssue>,
    },

    /// The vision/text model declined, or returned an empty or too-short
    /// reply. Surfaced as 502 with partial pipeline state attached by the
    /// caller.
    #[error("{0}")]
    Refusal(String),

    /// Non-2xx from a model, missing inline image data in a synthesis
    /// reply, network error, or a JSON parse error on a JSON-mode path.
    /// Surfaced as 502.
    #[error("{0}")]
    Transport(String),

    /// Upload failures on the blob store. Surfaced as 500.
    #[error("storage error: {0}")]
    Storage(String),

    /// The fallback synthesis provider has no API key configured, so a
    /// primary-quota-exhausted condition cannot be recovered from.
    #[error("fallback unavailable: {0}")]
    FallbackUnavailable(String),

    /// The caller referenced a storage URL outside the configured public
    /// base URL. Surfaced as 403 by the proxy route.
    #[error("unauthorized source: {0}")]
    UnauthorizedSource(String),

    /// Missing required env var or unreadable credentials file. Fatal at
    /// startup; never returned from a request handler.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl PipelineError {
    /// Build a [`PipelineError::Validation`] with no per-field breakdown.
    pub fn validation(message: impl Into<String>) -> Self {
        PipelineError::Validation {
            message: message.into(),
            issues: Vec::new(),
        }
    }

    /// Build a [`PipelineError::Validation`] from one or more per-field issues.
    pub fn validation_issues(issues: Vec<ValidationIssue>) -> Self {
        let message = issues
            .iter()
            .map(|i| format!("{}: {}", i.field, i.message))
            .collect::<Vec<_>>()
            .join("; ");
        PipelineError::Validation { message, issues }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        match self {
            PipelineError::Validation { message, issues } => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "message": message, "issues": issues })),
            )
                .into_response(),
            PipelineError::Refusal(m) => {
                (StatusCode::BAD_GATEWAY, Json(json!({ "message": m }))).into_response()
            }
            PipelineError::Transport(m) => {
                (StatusCode::BAD_GATEWAY, Json(json!({ "message": m }))).into_response()
            }
            PipelineError::Storage(m) => {
                (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "message": m }))).into_response()
            }
            PipelineError::FallbackUnavailable(m) => {
                (StatusCode::BAD_GATEWAY, Json(json!({ "message": m }))).into_response()
            }
            PipelineError::UnauthorizedSource(m) => {
                (StatusCode::FORBIDDEN, Json(json!({ "message": m }))).into_response()
            }
            PipelineError::Configuration(m) => {
                (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "message": m }))).into_response()
            }
        }
    }
}
