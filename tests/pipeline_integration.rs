/// End-to-end pipeline tests covering the full batch flow:
/// raw extracts -> master table -> trained artifact -> evaluation -> scoring.
use rust_risk_api::config::Config;
use rust_risk_api::evaluate::run_evaluation;
use rust_risk_api::integrate::run_integration;
use rust_risk_api::models::ScoringRequest;
use rust_risk_api::pipeline::{run_training, train_model, RiskModelArtifact};
use rust_risk_api::scoring::{Decision, ScoringService};
use rust_risk_api::table::{Column, Table};

/// Deterministic synthetic extracts with a learnable risk signal:
/// defaulters have lower income and heavier bureau debt.
fn raw_tables(customers: usize) -> (Table, Table) {
    let mut ids = Vec::new();
    let mut targets = Vec::new();
    let mut incomes = Vec::new();
    let mut credits = Vec::new();
    let mut annuities = Vec::new();
    let mut births = Vec::new();
    let mut employed = Vec::new();

    let mut bureau_ids = Vec::new();
    let mut bureau_days = Vec::new();
    let mut bureau_amounts = Vec::new();
    let mut bureau_debts = Vec::new();

    for i in 0..customers {
        let id = 1_000 + i as i64;
        let is_default = i % 8 == 0;

        ids.push(Some(id));
        targets.push(Some(i64::from(is_default)));
        incomes.push(Some(if is_default { 38_000.0 } else { 140_000.0 } + i as f64 * 13.0));
        credits.push(Some(250_000.0 + i as f64 * 500.0));
        annuities.push(if i % 11 == 0 {
            None
        } else {
            Some(18_000.0 + i as f64 * 9.0)
        });
        births.push(Some(-9_000 - i as i64 * 40));
        employed.push(Some(if i % 13 == 0 { 365_243 } else { -800 - i as i64 * 15 }));

        // Two thirds of customers have bureau history, defaulters with
        // far more outstanding debt.
        if i % 3 != 2 {
            let records = if i % 3 == 0 { 2 } else { 1 };
            for r in 0..records {
                bureau_ids.push(Some(id));
                bureau_days.push(Some(-(200.0 + (i * 7 + r * 31) as f64)));
                bureau_amounts.push(Some(60_000.0 + (i * 41) as f64));
                bureau_debts.push(Some(if is_default {
                    220_000.0 + (i * 17) as f64
                } else {
                    4_000.0 + (i * 3) as f64
                }));
            }
        }
    }

    let application = Table::from_columns(vec![
        Column::int("SK_ID_CURR", ids),
        Column::int("TARGET", targets),
        Column::float("AMT_INCOME_TOTAL", incomes),
        Column::float("AMT_CREDIT", credits),
        Column::float("AMT_ANNUITY", annuities),
        Column::int("DAYS_BIRTH", births),
        Column::int("DAYS_EMPLOYED", employed),
    ])
    .unwrap();
    let bureau = Table::from_columns(vec![
        Column::int("SK_ID_CURR", bureau_ids),
        Column::float("DAYS_CREDIT", bureau_days),
        Column::float("AMT_CREDIT_SUM", bureau_amounts),
        Column::float("AMT_CREDIT_SUM_DEBT", bureau_debts),
    ])
    .unwrap();
    (application, bureau)
}

fn sample_request() -> ScoringRequest {
    ScoringRequest {
        amt_income_total: 120_000.0,
        amt_credit: 350_000.0,
        amt_annuity: 22_000.0,
        days_birth: -13_000.0,
        days_employed: -2_400.0,
        total_prev_loan_amt: 80_000.0,
        total_prev_debt: 12_000.0,
    }
}

#[test]
fn full_pipeline_from_raw_extracts_to_decisions() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::with_dirs(dir.path().join("data"), dir.path().join("artifacts"));

    let (application, bureau) = raw_tables(200);
    application.write_parquet(&config.application_path()).unwrap();
    bureau.write_parquet(&config.bureau_path()).unwrap();

    let integration = run_integration(&config).unwrap();
    assert_eq!(integration.master_rows, 200);

    let training = run_training(&config).unwrap();
    assert_eq!(training.training_rows + training.test_rows, 200);
    assert!(config.model_path().exists());
    assert!(config.x_test_path().exists());
    assert!(config.y_test_path().exists());

    let evaluation = run_evaluation(&config).unwrap();
    assert_eq!(evaluation.test_rows, training.test_rows);
    assert!(
        evaluation.roc_auc > 0.8,
        "expected a separable model, got AUC {}",
        evaluation.roc_auc
    );

    let service = ScoringService::load(&config.model_path()).unwrap();
    let response = service.score(&sample_request()).unwrap();
    assert!((0.0..=1.0).contains(&response.probability));
    assert_eq!(
        response.decision,
        Decision::from_probability(response.probability).as_str()
    );
}

#[test]
fn training_holds_out_a_stratified_fifth() {
    let (application, bureau) = raw_tables(200);
    let master = rust_risk_api::integrate::integrate_tables(&application, &bureau).unwrap();
    let output = train_model(&master).unwrap();

    // 25 defaulters and 175 good loans, each split 80/20.
    assert_eq!(output.artifact.test_rows, 40);
    assert_eq!(output.artifact.training_rows, 160);

    let held_out_labels = output.y_test.int_column("TARGET").unwrap();
    let positives = held_out_labels
        .iter()
        .flatten()
        .filter(|&&label| label == 1)
        .count();
    assert_eq!(positives, 5);
}

#[test]
fn retraining_on_identical_inputs_reproduces_the_model() {
    let (application, bureau) = raw_tables(120);
    let master = rust_risk_api::integrate::integrate_tables(&application, &bureau).unwrap();

    let first = train_model(&master).unwrap();
    let second = train_model(&master).unwrap();

    assert_eq!(
        first.artifact.model.classifier.weights,
        second.artifact.model.classifier.weights
    );
    assert_eq!(
        first.artifact.model.classifier.intercept,
        second.artifact.model.classifier.intercept
    );
    assert_eq!(first.x_test, second.x_test);
    assert_eq!(first.y_test, second.y_test);
}

#[test]
fn persisted_and_in_memory_models_score_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");

    let (application, bureau) = raw_tables(120);
    let master = rust_risk_api::integrate::integrate_tables(&application, &bureau).unwrap();
    let output = train_model(&master).unwrap();

    output.artifact.save(&path).unwrap();
    let in_memory = ScoringService::from_artifact(output.artifact);
    let reloaded = ScoringService::from_artifact(RiskModelArtifact::load(&path).unwrap());

    let a = in_memory.score(&sample_request()).unwrap();
    let b = reloaded.score(&sample_request()).unwrap();
    assert_eq!(a.probability, b.probability);
    assert_eq!(a.decision, b.decision);
    assert_eq!(a.message, b.message);
}

#[test]
fn customers_without_history_flow_through_with_zero_totals() {
    let (application, _) = raw_tables(60);
    let empty_bureau = Table::from_columns(vec![
        Column::int("SK_ID_CURR", vec![]),
        Column::float("DAYS_CREDIT", vec![]),
        Column::float("AMT_CREDIT_SUM", vec![]),
        Column::float("AMT_CREDIT_SUM_DEBT", vec![]),
    ])
    .unwrap();

    let master = rust_risk_api::integrate::integrate_tables(&application, &empty_bureau).unwrap();
    assert_eq!(master.num_rows(), 60);

    let totals = master.float_column("TOTAL_PREV_LOAN_AMT").unwrap();
    assert!(totals.iter().all(|v| *v == Some(0.0)));

    // Still trainable: the bureau columns are constant but present.
    let output = train_model(&master).unwrap();
    assert!(output
        .artifact
        .input_columns
        .contains(&"TOTAL_PREV_LOAN_AMT".to_string()));
}
