//! Domain feature engineering shared by training and serving.
//!
//! The raw tables carry ages and tenure as negative day counts relative to
//! the application date. Both the training pipeline and the scoring service
//! run the same transformation so a model never sees differently-shaped
//! features at serve time than it saw when it was fitted.

use crate::errors::PipelineError;
use crate::table::{Column, Table};

pub const DAYS_BIRTH: &str = "DAYS_BIRTH";
pub const AGE_YEARS: &str = "AGE_YEARS";
pub const DAYS_EMPLOYED: &str = "DAYS_EMPLOYED";
pub const YEARS_EMPLOYED: &str = "YEARS_EMPLOYED";

/// Placeholder the upstream extract uses for "employment unknown" in
/// `DAYS_EMPLOYED`. Treated as missing rather than as ~1000 years of tenure.
pub const DAYS_EMPLOYED_SENTINEL: i64 = 365_243;

const DAYS_PER_YEAR: f64 = 365.0;

/// Convert day-count columns into year units.
///
/// `DAYS_BIRTH` becomes `AGE_YEARS` and `DAYS_EMPLOYED` becomes
/// `YEARS_EMPLOYED`, both divided by -365 so the results are positive
/// years. Sentinel tenure values are nulled before conversion. Columns
/// that are absent are skipped, which makes the transform idempotent:
/// a table that already carries the year columns passes through untouched.
pub fn transform_features(mut table: Table) -> Result<Table, PipelineError> {
    if table.has_column(DAYS_BIRTH) {
        let days = table.numeric_column(DAYS_BIRTH)?;
        let years: Vec<Option<f64>> = days.iter().map(|d| d.map(to_years)).collect();
        table.replace_column(DAYS_BIRTH, Column::float(AGE_YEARS, years))?;
    }
    if table.has_column(DAYS_EMPLOYED) {
        let days = table.numeric_column(DAYS_EMPLOYED)?;
        let years: Vec<Option<f64>> = days
            .iter()
            .map(|d| match d {
                Some(d) if *d == DAYS_EMPLOYED_SENTINEL as f64 => None,
                Some(d) => Some(to_years(*d)),
                None => None,
            })
            .collect();
        table.replace_column(DAYS_EMPLOYED, Column::float(YEARS_EMPLOYED, years))?;
    }
    Ok(table)
}

fn to_years(days: f64) -> f64 {
    days / -DAYS_PER_YEAR
}
