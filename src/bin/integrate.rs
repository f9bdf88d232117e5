//! Script to build the master table from the raw application and bureau extracts.

use rust_risk_api::config::Config;
use rust_risk_api::integrate::run_integration;

/// Main entry point for the integration script.
///
/// Aggregates bureau history per customer, joins it onto the application
/// table, and writes the master table used by training.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    tracing::info!("Building master table...");
    let report = run_integration(&config)?;

    tracing::info!(
        "Done. {} application rows and {} bureau rows produced {} master rows.",
        report.application_rows,
        report.bureau_rows,
        report.master_rows
    );
    Ok(())
}
