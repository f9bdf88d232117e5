use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the batch pipeline stages (integration, training,
/// evaluation) and by the fitted model itself.
///
/// Batch errors are terminal for the run that raised them: no partial
/// master table or artifact is ever written once one of these surfaces.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required source table or artifact file does not exist.
    #[error("missing input file: {}", .0.display())]
    MissingInput(PathBuf),

    /// A required column (join key, label, fitted feature) is absent or
    /// has an unusable type.
    #[error("schema error: {0}")]
    Schema(String),

    /// After dropping the identifier, the label and all non-numeric
    /// columns, no feature columns remain to fit on.
    #[error("no numeric feature columns remain after filtering")]
    EmptyFeatureSet,

    /// The persisted model bundle is unreadable, corrupt, or fails its
    /// integrity check.
    #[error("artifact error: {0}")]
    Artifact(String),

    /// Per-request failure inside feature reconciliation or inference.
    #[error("scoring error: {0}")]
    Scoring(String),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Application-specific error types for the HTTP layer.
#[derive(Debug, Clone)]
pub enum AppError {
    /// Scoring was requested while no trained artifact is loaded.
    ModelUnavailable,
    /// A per-request scoring computation failed.
    ScoringFailed(String),
    /// Bad request error (invalid input).
    BadRequest(String),
}

impl fmt::Display for AppError {
    /// Formats the error for display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::ModelUnavailable => write!(f, "Model unavailable"),
            AppError::ScoringFailed(msg) => write!(f, "Scoring failed: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
        }
    }
}

impl IntoResponse for AppError {
    /// Converts the error into an HTTP response.
    ///
    /// Maps each error variant to an appropriate HTTP status code and JSON body.
    /// Per-request detail goes to the log; response bodies stay uniform.
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::ModelUnavailable => {
                tracing::warn!("Scoring request received but no model is loaded");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Model unavailable".to_string(),
                )
            }
            AppError::ScoringFailed(msg) => {
                tracing::error!("Scoring failed: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Scoring failed".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<PipelineError> for AppError {
    /// Converts a batch-layer error into an HTTP-layer error.
    fn from(err: PipelineError) -> Self {
        AppError::ScoringFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_error_display() {
        let err = PipelineError::MissingInput(PathBuf::from("data/bureau.parquet"));
        assert!(format!("{}", err).contains("bureau.parquet"));

        let err = PipelineError::Schema("column TARGET not found".to_string());
        assert!(format!("{}", err).contains("TARGET"));

        let err = PipelineError::EmptyFeatureSet;
        assert!(format!("{}", err).contains("no numeric feature columns"));
    }

    #[test]
    fn app_error_from_pipeline_error() {
        let err: AppError = PipelineError::EmptyFeatureSet.into();
        match err {
            AppError::ScoringFailed(msg) => assert!(msg.contains("numeric")),
            other => panic!("unexpected variant: {}", other),
        }
    }
}
