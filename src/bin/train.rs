//! Script to train the risk model from the master table.

use rust_risk_api::config::Config;
use rust_risk_api::pipeline::run_training;

/// Main entry point for the training script.
///
/// Fits the preprocessing and classifier on the master table, then
/// persists the model artifact and the held-out test partition for the
/// evaluation script.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    tracing::info!("Training risk model...");
    let report = run_training(&config)?;

    tracing::info!(
        "Done. Trained on {} rows ({:.1}% positive), features: {}",
        report.training_rows,
        report.positive_rate * 100.0,
        report.feature_names.join(", ")
    );
    Ok(())
}
