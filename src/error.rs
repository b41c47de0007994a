//! Per-subsystem error taxonomy and the axum `IntoResponse` mapping for it.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Configuration load/validation failure. Fatal on startup: the binary prints
/// the offending field path and exits with code 1.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("unknown configuration key `{key}`{suggestion}")]
    UnknownKey { key: String, suggestion: String },
    #[error("invalid value for `{field}`: {reason}")]
    InvalidField { field: String, reason: String },
}

/// Errors raised while ingesting flags (C6).
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("storage error: {0}")]
    Store(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("malformed request: {0}")]
    BadRequest(String),
    #[error("unknown webhook")]
    UnknownWebhook,
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Serialization(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::UnknownWebhook => StatusCode::NOT_FOUND,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Errors raised by the submission scheduler (C8). Never propagated to a
/// caller as a panic — logged and swallowed at the tick boundary.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("no submitter module configured")]
    NoSubmitter,
    #[error("failed to spawn submitter process: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("submitter produced malformed output: {0}")]
    MalformedResponse(String),
}

/// Errors raised within an Exploit Session (C3). Always caught and logged;
/// never escape the session that produced them.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{exploit} took longer than {timeout}s for host {target}")]
    Timeout {
        exploit: String,
        target: String,
        timeout: u64,
    },
    #[error("{exploit} failed for target {target}: {source}")]
    WorkerFailed {
        exploit: String,
        target: String,
        source: std::io::Error,
    },
}

/// Errors raised by the client-side Fallback Store (C5).
#[derive(Debug, thiserror::Error)]
pub enum FallbackError {
    #[error("storage error: {0}")]
    Store(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Top-level error wrapper used by HTTP handlers that need a uniform
/// `IntoResponse`, mirroring the teacher's `api`-layer `AppError`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error(transparent)]
    Search(#[from] crate::server::search::SearchError),
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::Ingest(e) => e.into_response(),
            Self::Submit(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response(),
            Self::Search(e) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response()
            }
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "unauthorized" })),
            )
                .into_response(),
            Self::NotFound => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" }))).into_response()
            }
            Self::Internal(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response(),
        }
    }
}
