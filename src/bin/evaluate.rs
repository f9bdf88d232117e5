//! Script to evaluate the trained model on the held-out partition.

use rust_risk_api::config::Config;
use rust_risk_api::evaluate::run_evaluation;

/// Main entry point for the evaluation script.
///
/// Loads the model artifact and the persisted test partition, scores it,
/// and prints ROC-AUC, the confusion matrix, and the per-class report.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    let report = run_evaluation(&config)?;

    println!("ROC-AUC: {:.4} ({} test rows)", report.roc_auc, report.test_rows);
    println!();
    println!("Confusion matrix:");
    println!("{}", report.confusion);
    println!();
    println!("{}", report.classification);
    Ok(())
}
