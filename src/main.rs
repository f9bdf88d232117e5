use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rust_risk_api::config::Config;
use rust_risk_api::errors::PipelineError;
use rust_risk_api::handlers::{self, AppState};
use rust_risk_api::scoring::ScoringService;

/// Main entry point for the application.
///
/// This function initializes the application, including:
/// - Logging and tracing.
/// - Configuration loading.
/// - Loading the trained model artifact, if one exists.
/// - HTTP routes and middleware (CORS, request size limits).
///
/// It then starts the Axum server. The server starts even when no model
/// has been trained yet; scoring endpoints answer 503 until one is.
///
/// # Returns
///
/// * `anyhow::Result<()>` - Ok if the server runs successfully, or an error if initialization fails.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_risk_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Load the trained model, if present
    let model_path = config.model_path();
    let scorer = match ScoringService::load(&model_path) {
        Ok(service) => {
            tracing::info!("✓ Model loaded from {}", model_path.display());
            Some(Arc::new(service))
        }
        Err(PipelineError::MissingInput(path)) => {
            tracing::warn!(
                "No model at {}, scoring endpoints will return 503 until one is trained",
                path.display()
            );
            None
        }
        Err(e) => {
            tracing::error!("Failed to load model: {}", e);
            None
        }
    };

    // Build application state
    let app_state = Arc::new(AppState {
        config: config.clone(),
        scorer,
    });

    // Build scoring routes with security layers
    let scoring_routes = Router::new()
        // API Documentation
        .route("/docs", get(handlers::swagger_ui))
        .route("/api-docs/openapi.yml", get(handlers::openapi_spec))
        // API endpoints
        .route("/evaluate_risk", post(handlers::evaluate_risk))
        .route("/model", get(handlers::model_info))
        .layer(
            ServiceBuilder::new()
                // Request size limit: 1MB max payload
                .layer(RequestBodyLimitLayer::new(1024 * 1024)),
        );

    // Build final app with health check outside the limit layers
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(scoring_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
