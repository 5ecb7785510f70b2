//! Error types for lexi-curator
//!
//! `ApiError` is what HTTP handlers return. `CurationError` classifies
//! pipeline failures; only initialization and store failures ever leave a
//! batch, everything else becomes a per-word `WordFailure`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409) - e.g., batch not in a state that allows the action
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A collaborator needed to start work is unavailable (503)
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// lexi-common error
    #[error("Common error: {0}")]
    Common(#[from] lexi_common::Error),
}

impl From<CurationError> for ApiError {
    fn from(err: CurationError) -> Self {
        match err {
            CurationError::InitializationFailure(msg) => ApiError::Unavailable(msg),
            CurationError::Store(e) => ApiError::Common(e),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Unavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE", msg)
            }
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
            ),
            ApiError::Common(lexi_common::Error::NotFound(msg)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", msg)
            }
            ApiError::Common(lexi_common::Error::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
            }
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
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

/// Curation pipeline failures
#[derive(Debug, Error)]
pub enum CurationError {
    /// One provider call failed; failover moves on to the next provider
    #[error("Provider {provider} failed: {message}")]
    TransientProvider { provider: String, message: String },

    /// Every provider and every fallback query came back empty
    #[error("No candidates found for '{0}'")]
    ExhaustedSearch(String),

    /// Scoring skipped (throttled or disabled); candidates get the neutral score
    #[error("Scoring unavailable: {0}")]
    ScoringUnavailable(String),

    /// A collaborator could not be reached when the batch was about to start
    #[error("Initialization failed: {0}")]
    InitializationFailure(String),

    /// Asset fetch or write failed after the selection was persisted
    #[error("Download failed: {0}")]
    DownloadFailure(String),

    /// Unrecoverable persistence failure
    #[error("Store failure: {0}")]
    Store(#[from] lexi_common::Error),
}

impl CurationError {
    /// Whether this failure is confined to a single word
    pub fn is_word_local(&self) -> bool {
        !matches!(
            self,
            CurationError::InitializationFailure(_) | CurationError::Store(_)
        )
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            CurationError::TransientProvider { .. } => FailureKind::Provider,
            CurationError::ExhaustedSearch(_) => FailureKind::NoCandidates,
            CurationError::ScoringUnavailable(_) => FailureKind::Scoring,
            CurationError::InitializationFailure(_) => FailureKind::Initialization,
            CurationError::DownloadFailure(_) => FailureKind::Download,
            CurationError::Store(_) => FailureKind::Store,
        }
    }
}

/// Classification of a per-word outcome in the batch summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Provider,
    NoCandidates,
    /// Candidates were found but none passed both thresholds
    BelowThreshold,
    Scoring,
    Initialization,
    Download,
    Store,
}

/// A recoverable failure recorded against one word
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordFailure {
    pub word: String,
    pub kind: FailureKind,
    pub message: String,
}

impl WordFailure {
    pub fn new(word: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn from_error(word: impl Into<String>, err: &CurationError) -> Self {
        Self::new(word, err.kind(), err.to_string())
    }
}
