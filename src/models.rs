use serde::{Deserialize, Serialize};

/// Key column joining applications to bureau history.
pub const CUSTOMER_ID_COLUMN: &str = "SK_ID_CURR";
/// Binary label column: 1 marks a loan that went into default.
pub const TARGET_COLUMN: &str = "TARGET";

// ============ API Models ============

/// Loan application submitted for scoring.
///
/// Fields mirror the raw application schema before feature engineering,
/// so callers send day counts, not derived years. Bureau-derived totals
/// default to zero for customers with no credit history; fields the
/// model was not trained on are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringRequest {
    pub amt_income_total: f64,
    pub amt_credit: f64,
    pub amt_annuity: f64,
    pub days_birth: f64,
    pub days_employed: f64,
    #[serde(default)]
    pub total_prev_loan_amt: f64,
    #[serde(default)]
    pub total_prev_debt: f64,
}

impl ScoringRequest {
    /// Request fields keyed by their raw column names, in schema order.
    pub fn as_columns(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("AMT_INCOME_TOTAL", self.amt_income_total),
            ("AMT_CREDIT", self.amt_credit),
            ("AMT_ANNUITY", self.amt_annuity),
            ("DAYS_BIRTH", self.days_birth),
            ("DAYS_EMPLOYED", self.days_employed),
            ("TOTAL_PREV_LOAN_AMT", self.total_prev_loan_amt),
            ("TOTAL_PREV_DEBT", self.total_prev_debt),
        ]
    }
}

/// Scoring verdict returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringResponse {
    pub decision: String,
    /// Default probability rounded to four decimal places.
    pub probability: f64,
    pub message: String,
}

/// Summary of the currently loaded model, served on `/model`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub schema_version: u32,
    pub trained_at: String,
    pub seed: u64,
    pub input_columns: Vec<String>,
    pub training_rows: usize,
    pub test_rows: usize,
}
