//! Error types for vault-cm
//!
//! `ReconcileError` classifies per-record outcomes of a reconciliation run;
//! `ApiError` is what HTTP handlers return.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Per-record reconciliation failure
///
/// None of these halt a run except `Aborted`. Whether the record is marked
/// processed afterwards depends on the kind, see [`ReconcileError::marks_processed`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ReconcileError {
    /// Catalog lookup returned no candidates
    #[error("No catalog candidates for \"{query}\"")]
    NotFound { query: String },

    /// Candidates found but none cleared the acceptance threshold
    #[error("No candidate reached the acceptance threshold (best score {best_score:.3})")]
    NoMatch { best_score: f64 },

    /// The record's expansion has no catalog slug
    #[error("No catalog slug for expansion {}", .code.as_deref().unwrap_or("<unknown>"))]
    UnmappedExpansion { code: Option<String> },

    /// Catalog unreachable or returned a retryable failure
    #[error("Catalog request failed: {0}")]
    TransientNetwork(String),

    /// Write-back or checkpoint could not be persisted
    #[error("Persistence failed: {0}")]
    Persistence(String),

    /// Unrecoverable failure; the run stops
    #[error("Run aborted: {0}")]
    Aborted(String),
}

impl ReconcileError {
    /// Machine-readable code used in reports and events
    pub fn code(&self) -> &'static str {
        match self {
            ReconcileError::NotFound { .. } => "NOT_FOUND",
            ReconcileError::NoMatch { .. } => "NO_MATCH",
            ReconcileError::UnmappedExpansion { .. } => "UNMAPPED_EXPANSION",
            ReconcileError::TransientNetwork(_) => "TRANSIENT_NETWORK",
            ReconcileError::Persistence(_) => "PERSISTENCE",
            ReconcileError::Aborted(_) => "ABORTED",
        }
    }

    /// Counted as skipped rather than errored
    pub fn is_skip(&self) -> bool {
        matches!(self, ReconcileError::NotFound { .. } | ReconcileError::NoMatch { .. })
    }

    /// Whether the record joins the processed set
    ///
    /// Transient and persistence failures leave the record eligible for a
    /// later run.
    pub fn marks_processed(&self) -> bool {
        matches!(
            self,
            ReconcileError::NotFound { .. }
                | ReconcileError::NoMatch { .. }
                | ReconcileError::UnmappedExpansion { .. }
        )
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409), e.g. a run is already active for the key
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Upstream catalog failure (502)
    #[error("Catalog error: {0}")]
    Upstream(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// vault-common error
    #[error("Common error: {0}")]
    Common(#[from] vault_common::Error),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Database(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                err.to_string(),
            ),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
            ApiError::Other(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processed_classification() {
        assert!(ReconcileError::NotFound { query: "x".into() }.marks_processed());
        assert!(ReconcileError::NoMatch { best_score: 0.1 }.marks_processed());
        assert!(ReconcileError::UnmappedExpansion { code: None }.marks_processed());
        assert!(!ReconcileError::TransientNetwork("timeout".into()).marks_processed());
        assert!(!ReconcileError::Persistence("locked".into()).marks_processed());
    }

    #[test]
    fn test_skip_classification() {
        assert!(ReconcileError::NotFound { query: "x".into() }.is_skip());
        assert!(ReconcileError::NoMatch { best_score: 0.0 }.is_skip());
        assert!(!ReconcileError::UnmappedExpansion { code: Some("sv99".into()) }.is_skip());
    }

    #[test]
    fn test_unmapped_message_names_code() {
        let err = ReconcileError::UnmappedExpansion { code: Some("sv99".into()) };
        assert!(err.to_string().contains("sv99"));
        assert_eq!(err.code(), "UNMAPPED_EXPANSION");
    }
}
