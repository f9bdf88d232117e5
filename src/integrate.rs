//! Integration of applications with bureau summaries into the master table.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::Serialize;

use crate::bureau::{aggregate_bureau, AVG_DAYS_CREDIT, TOTAL_PREV_DEBT, TOTAL_PREV_LOAN_AMT};
use crate::config::Config;
use crate::errors::PipelineError;
use crate::models::CUSTOMER_ID_COLUMN;
use crate::table::Table;

/// Columns the bureau summary contributes to the master table.
pub const BUREAU_FEATURE_COLUMNS: [&str; 3] =
    [AVG_DAYS_CREDIT, TOTAL_PREV_LOAN_AMT, TOTAL_PREV_DEBT];

/// Outcome of a completed integration run.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrationReport {
    pub application_rows: usize,
    pub bureau_rows: usize,
    pub master_rows: usize,
    pub customers_with_history: usize,
    pub output_path: PathBuf,
}

/// Join applications with the aggregated bureau summary.
///
/// Every application row survives. Customers without bureau history get
/// zeros in the three bureau-derived columns; bureau customers missing
/// from the application table are dropped by the left join.
pub fn integrate_tables(application: &Table, bureau: &Table) -> Result<Table, PipelineError> {
    let summary = aggregate_bureau(bureau)?;
    merge_with_summary(application, &summary)
}

fn merge_with_summary(application: &Table, summary: &Table) -> Result<Table, PipelineError> {
    let mut master = application.left_join(summary, CUSTOMER_ID_COLUMN)?;
    for name in BUREAU_FEATURE_COLUMNS {
        master.fill_null_floats(name, 0.0)?;
    }
    Ok(master)
}

/// Read the raw tables, build the master table, and persist it.
pub fn run_integration(config: &Config) -> Result<IntegrationReport, PipelineError> {
    let application_path = config.application_path();
    let bureau_path = config.bureau_path();

    tracing::info!("Loading application table from {}", application_path.display());
    let application = Table::read_parquet(&application_path)?;
    tracing::info!("Loading bureau table from {}", bureau_path.display());
    let bureau = Table::read_parquet(&bureau_path)?;

    let summary = aggregate_bureau(&bureau)?;
    let summary_ids: HashSet<i64> = summary
        .int_column(CUSTOMER_ID_COLUMN)?
        .iter()
        .flatten()
        .copied()
        .collect();
    let customers_with_history = application
        .int_column(CUSTOMER_ID_COLUMN)?
        .iter()
        .flatten()
        .filter(|id| summary_ids.contains(id))
        .count();

    let master = merge_with_summary(&application, &summary)?;
    let output_path = config.master_table_path();
    master.write_parquet(&output_path)?;

    let report = IntegrationReport {
        application_rows: application.num_rows(),
        bureau_rows: bureau.num_rows(),
        master_rows: master.num_rows(),
        customers_with_history,
        output_path: output_path.clone(),
    };
    tracing::info!(
        "Integration complete: {} master rows ({} with bureau history) written to {}",
        report.master_rows,
        report.customers_with_history,
        output_path.display()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bureau::{AMT_CREDIT_SUM, AMT_CREDIT_SUM_DEBT, DAYS_CREDIT};
    use crate::table::Column;

    fn application_table() -> Table {
        Table::from_columns(vec![
            Column::int(CUSTOMER_ID_COLUMN, vec![Some(1), Some(2), Some(3)]),
            Column::int("TARGET", vec![Some(0), Some(1), Some(0)]),
            Column::float(
                "AMT_INCOME_TOTAL",
                vec![Some(100_000.0), Some(150_000.0), Some(80_000.0)],
            ),
        ])
        .unwrap()
    }

    fn bureau_table() -> Table {
        // Customer 2 has two loans, customer 9 never applied.
        Table::from_columns(vec![
            Column::int(CUSTOMER_ID_COLUMN, vec![Some(2), Some(2), Some(9)]),
            Column::float(DAYS_CREDIT, vec![Some(-200.0), Some(-400.0), Some(-50.0)]),
            Column::float(AMT_CREDIT_SUM, vec![Some(1000.0), Some(3000.0), Some(7.0)]),
            Column::float(AMT_CREDIT_SUM_DEBT, vec![Some(500.0), None, Some(7.0)]),
        ])
        .unwrap()
    }

    #[test]
    fn keeps_every_application_row_and_zero_fills_missing_history() {
        let master = integrate_tables(&application_table(), &bureau_table()).unwrap();

        assert_eq!(master.num_rows(), 3);
        assert_eq!(
            master.float_column(AVG_DAYS_CREDIT).unwrap(),
            &[Some(0.0), Some(-300.0), Some(0.0)]
        );
        assert_eq!(
            master.float_column(TOTAL_PREV_LOAN_AMT).unwrap(),
            &[Some(0.0), Some(4000.0), Some(0.0)]
        );
        assert_eq!(
            master.float_column(TOTAL_PREV_DEBT).unwrap(),
            &[Some(0.0), Some(500.0), Some(0.0)]
        );
    }

    #[test]
    fn bureau_only_customers_are_dropped() {
        let master = integrate_tables(&application_table(), &bureau_table()).unwrap();
        let ids: Vec<i64> = master
            .int_column(CUSTOMER_ID_COLUMN)
            .unwrap()
            .iter()
            .flatten()
            .copied()
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn empty_bureau_still_integrates() {
        let bureau = Table::from_columns(vec![
            Column::int(CUSTOMER_ID_COLUMN, vec![]),
            Column::float(DAYS_CREDIT, vec![]),
            Column::float(AMT_CREDIT_SUM, vec![]),
            Column::float(AMT_CREDIT_SUM_DEBT, vec![]),
        ])
        .unwrap();

        let master = integrate_tables(&application_table(), &bureau).unwrap();
        assert_eq!(master.num_rows(), 3);
        assert_eq!(
            master.float_column(TOTAL_PREV_LOAN_AMT).unwrap(),
            &[Some(0.0), Some(0.0), Some(0.0)]
        );
    }

    #[test]
    fn run_integration_writes_master_table() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_dirs(dir.path(), dir.path().join("artifacts"));

        application_table()
            .write_parquet(&config.application_path())
            .unwrap();
        bureau_table().write_parquet(&config.bureau_path()).unwrap();

        let report = run_integration(&config).unwrap();
        assert_eq!(report.application_rows, 3);
        assert_eq!(report.bureau_rows, 3);
        assert_eq!(report.master_rows, 3);
        assert_eq!(report.customers_with_history, 1);

        let master = Table::read_parquet(&config.master_table_path()).unwrap();
        assert_eq!(master.num_rows(), 3);
    }

    #[test]
    fn missing_application_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_dirs(dir.path(), dir.path().join("artifacts"));
        bureau_table().write_parquet(&config.bureau_path()).unwrap();

        let result = run_integration(&config);
        assert!(matches!(result, Err(PipelineError::MissingInput(path)) if path.ends_with("application.parquet")));
    }
}
