//! Aggregation of raw credit-bureau history into per-customer summaries.

use std::collections::BTreeMap;

use crate::errors::PipelineError;
use crate::models::CUSTOMER_ID_COLUMN;
use crate::table::{Column, Table};

pub const DAYS_CREDIT: &str = "DAYS_CREDIT";
pub const AMT_CREDIT_SUM: &str = "AMT_CREDIT_SUM";
pub const AMT_CREDIT_SUM_DEBT: &str = "AMT_CREDIT_SUM_DEBT";

pub const AVG_DAYS_CREDIT: &str = "AVG_DAYS_CREDIT";
pub const TOTAL_PREV_LOAN_AMT: &str = "TOTAL_PREV_LOAN_AMT";
pub const TOTAL_PREV_DEBT: &str = "TOTAL_PREV_DEBT";

#[derive(Default)]
struct GroupStats {
    days_credit_sum: f64,
    days_credit_count: usize,
    loan_amt_sum: f64,
    debt_sum: f64,
}

/// Collapse the bureau table to one row per customer.
///
/// `DAYS_CREDIT` is averaged while the loan and debt amounts are summed.
/// Missing values are skipped, so a customer whose `DAYS_CREDIT` entries
/// are all missing gets a missing average, while sums over nothing are 0.
/// Rows without a customer id are dropped. The output is sorted by
/// customer id and its ids are unique by construction.
pub fn aggregate_bureau(bureau: &Table) -> Result<Table, PipelineError> {
    let ids = bureau.int_column(CUSTOMER_ID_COLUMN)?;
    let days_credit = bureau.numeric_column(DAYS_CREDIT)?;
    let credit_sum = bureau.numeric_column(AMT_CREDIT_SUM)?;
    let debt = bureau.numeric_column(AMT_CREDIT_SUM_DEBT)?;

    let mut groups: BTreeMap<i64, GroupStats> = BTreeMap::new();
    for row in 0..bureau.num_rows() {
        let Some(id) = ids[row] else { continue };
        let stats = groups.entry(id).or_default();
        if let Some(v) = days_credit[row] {
            stats.days_credit_sum += v;
            stats.days_credit_count += 1;
        }
        if let Some(v) = credit_sum[row] {
            stats.loan_amt_sum += v;
        }
        if let Some(v) = debt[row] {
            stats.debt_sum += v;
        }
    }

    let mut out_ids = Vec::with_capacity(groups.len());
    let mut avg_days = Vec::with_capacity(groups.len());
    let mut loan_totals = Vec::with_capacity(groups.len());
    let mut debt_totals = Vec::with_capacity(groups.len());
    for (id, stats) in &groups {
        out_ids.push(Some(*id));
        avg_days.push(if stats.days_credit_count > 0 {
            Some(stats.days_credit_sum / stats.days_credit_count as f64)
        } else {
            None
        });
        loan_totals.push(Some(stats.loan_amt_sum));
        debt_totals.push(Some(stats.debt_sum));
    }

    tracing::debug!(
        "Aggregated {} bureau rows into {} customer summaries",
        bureau.num_rows(),
        groups.len()
    );

    Table::from_columns(vec![
        Column::int(CUSTOMER_ID_COLUMN, out_ids),
        Column::float(AVG_DAYS_CREDIT, avg_days),
        Column::float(TOTAL_PREV_LOAN_AMT, loan_totals),
        Column::float(TOTAL_PREV_DEBT, debt_totals),
    ])
}
