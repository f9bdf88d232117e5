//! Script to generate synthetic raw extracts for local runs.
//!
//! Writes an application table and a bureau table with the shapes and
//! quirks of the real extracts: skewed class balance, missing annuities,
//! the employment sentinel, and customers with zero to several bureau
//! records. Generation is seeded, so reruns produce identical files.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rust_risk_api::config::Config;
use rust_risk_api::features::DAYS_EMPLOYED_SENTINEL;
use rust_risk_api::table::{Column, Table};

const SEED: u64 = 7;
const NUM_CUSTOMERS: usize = 2_000;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    let mut rng = StdRng::seed_from_u64(SEED);

    let mut ids = Vec::with_capacity(NUM_CUSTOMERS);
    let mut targets = Vec::with_capacity(NUM_CUSTOMERS);
    let mut contract_types = Vec::with_capacity(NUM_CUSTOMERS);
    let mut incomes = Vec::with_capacity(NUM_CUSTOMERS);
    let mut credits = Vec::with_capacity(NUM_CUSTOMERS);
    let mut annuities = Vec::with_capacity(NUM_CUSTOMERS);
    let mut births = Vec::with_capacity(NUM_CUSTOMERS);
    let mut employed = Vec::with_capacity(NUM_CUSTOMERS);

    let mut bureau_ids = Vec::new();
    let mut bureau_days = Vec::new();
    let mut bureau_amounts = Vec::new();
    let mut bureau_debts = Vec::new();

    let mut positives = 0usize;
    for i in 0..NUM_CUSTOMERS {
        let id = 100_000 + i as i64;
        let income = 30_000.0 + rng.random::<f64>() * 220_000.0;
        let credit = 45_000.0 + rng.random::<f64>() * 900_000.0;
        let age_days = -rng.random_range(21 * 365_i64..70 * 365_i64);
        let sentinel_tenure = rng.random::<f64>() < 0.08;
        let tenure_days = if sentinel_tenure {
            DAYS_EMPLOYED_SENTINEL
        } else {
            -rng.random_range(90_i64..12_000)
        };

        // Default risk grows with the credit burden and is higher for
        // applicants without verifiable employment.
        let burden = credit / income;
        let mut risk = 0.015 * burden;
        if sentinel_tenure {
            risk += 0.06;
        }
        if tenure_days > -730 && !sentinel_tenure {
            risk += 0.04;
        }
        let is_default = rng.random::<f64>() < risk.min(0.6);
        positives += usize::from(is_default);

        ids.push(Some(id));
        targets.push(Some(i64::from(is_default)));
        contract_types.push(Some(
            if rng.random::<f64>() < 0.9 {
                "Cash loans"
            } else {
                "Revolving loans"
            }
            .to_string(),
        ));
        incomes.push(Some(income));
        credits.push(Some(credit));
        annuities.push(if rng.random::<f64>() < 0.05 {
            None
        } else {
            Some(credit / (8.0 + rng.random::<f64>() * 22.0))
        });
        births.push(Some(age_days));
        employed.push(Some(tenure_days));

        // Around 60% of customers have prior loans on file.
        if rng.random::<f64>() < 0.6 {
            for _ in 0..rng.random_range(1..=5) {
                bureau_ids.push(Some(id));
                bureau_days.push(if rng.random::<f64>() < 0.05 {
                    None
                } else {
                    Some(-(rng.random_range(30..2_500) as f64))
                });
                let amount = 10_000.0 + rng.random::<f64>() * 400_000.0;
                bureau_amounts.push(Some(amount));
                bureau_debts.push(if rng.random::<f64>() < 0.1 {
                    None
                } else {
                    Some(amount * rng.random::<f64>() * 0.8)
                });
            }
        }
    }

    let application = Table::from_columns(vec![
        Column::int("SK_ID_CURR", ids),
        Column::int("TARGET", targets),
        Column::text("NAME_CONTRACT_TYPE", contract_types),
        Column::float("AMT_INCOME_TOTAL", incomes),
        Column::float("AMT_CREDIT", credits),
        Column::float("AMT_ANNUITY", annuities),
        Column::int("DAYS_BIRTH", births),
        Column::int("DAYS_EMPLOYED", employed),
    ])?;
    let bureau = Table::from_columns(vec![
        Column::int("SK_ID_CURR", bureau_ids),
        Column::float("DAYS_CREDIT", bureau_days),
        Column::float("AMT_CREDIT_SUM", bureau_amounts),
        Column::float("AMT_CREDIT_SUM_DEBT", bureau_debts),
    ])?;

    application.write_parquet(&config.application_path())?;
    bureau.write_parquet(&config.bureau_path())?;

    tracing::info!(
        "Wrote {} applications ({:.1}% default) to {}",
        application.num_rows(),
        positives as f64 * 100.0 / NUM_CUSTOMERS as f64,
        config.application_path().display()
    );
    tracing::info!(
        "Wrote {} bureau records to {}",
        bureau.num_rows(),
        config.bureau_path().display()
    );
    Ok(())
}
