use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use thiserror::Error;

use crate::models::GenerationStatus;

/// What went wrong while obtaining the LLM's structured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Network,
    Timeout,
    Parse,
    Schema,
}

impl FailureKind {
    /// Transient kinds are eligible for the edge layer's bounded auto-retry.
    pub fn is_transient(self) -> bool {
        matches!(self, FailureKind::Network | FailureKind::Timeout)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::Network => "network",
            FailureKind::Timeout => "timeout",
            FailureKind::Parse => "parse",
            FailureKind::Schema => "schema",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("generation failed ({kind}): {cause}")]
    Generation { kind: FailureKind, cause: String },

    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: GenerationStatus, to: GenerationStatus },

    #[error("{0} not found")]
    NotFound(&'static str),
}

impl Error {
    pub fn generation(kind: FailureKind, cause: impl Into<String>) -> Self {
        Error::Generation { kind, cause: cause.into() }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Error::Generation { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Generation { .. } => StatusCode::BAD_GATEWAY,
            Error::InvalidTransition { .. } => StatusCode::CONFLICT,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
