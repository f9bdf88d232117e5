use crate::config::Config;
use crate::errors::AppError;
use crate::models::{ModelInfo, ScoringRequest, ScoringResponse};
use crate::scoring::ScoringService;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    Json,
};
use serde_json::json;
use std::sync::Arc;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Loaded scoring model (None until a model has been trained).
    pub scorer: Option<Arc<ScoringService>>,
}

/// Health check endpoint.
///
/// Returns the service status and whether a model is loaded. The service
/// is healthy even without a model; scoring endpoints report 503 until
/// one is trained.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-risk-api",
            "version": "0.1.0",
            "model_loaded": state.scorer.is_some()
        })),
    )
}

/// POST /evaluate_risk
///
/// Scores a loan application and maps the default probability onto an
/// approve / manual review / reject decision.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `request` - The loan application fields to score.
///
/// # Returns
///
/// * `Result<Json<ScoringResponse>, AppError>` - The decision or an error.
pub async fn evaluate_risk(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScoringRequest>,
) -> Result<Json<ScoringResponse>, AppError> {
    tracing::info!(
        "POST /evaluate_risk - income: {}, credit: {}",
        request.amt_income_total,
        request.amt_credit
    );

    let scorer = state.scorer.as_ref().ok_or(AppError::ModelUnavailable)?;
    let response = scorer.score(&request)?;

    tracing::info!(
        "Scored application: {} (probability {:.4})",
        response.decision,
        response.probability
    );
    Ok(Json(response))
}

/// GET /model
///
/// Returns provenance of the loaded model: when it was trained, on which
/// columns, and how the data was partitioned.
pub async fn model_info(State(state): State<Arc<AppState>>) -> Result<Json<ModelInfo>, AppError> {
    let scorer = state.scorer.as_ref().ok_or(AppError::ModelUnavailable)?;
    Ok(Json(scorer.model_info()))
}

/// GET /api-docs/openapi.yml
pub async fn openapi_spec() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/yaml")],
        include_str!("../openapi.yml"),
    )
}

/// GET /docs
pub async fn swagger_ui() -> Html<&'static str> {
    Html(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8"/>
  <title>rust-risk-api docs</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css"/>
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {
      SwaggerUIBundle({ url: "/api-docs/openapi.yml", dom_id: "#swagger-ui" });
    };
  </script>
</body>
</html>"##,
    )
}
