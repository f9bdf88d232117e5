//! Training pipeline: preprocessing, stratified split, model fitting, and
//! artifact persistence.
//!
//! The fitted preprocessing steps travel inside the artifact next to the
//! classifier, so the scoring service replays exactly the imputation and
//! scaling the model was trained with. The artifact also records the raw
//! input columns seen at training time; serving reconciles incoming
//! requests against that list before anything else runs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::classifier::LogisticRegression;
use crate::config::Config;
use crate::errors::PipelineError;
use crate::features::transform_features;
use crate::models::{CUSTOMER_ID_COLUMN, TARGET_COLUMN};
use crate::table::{Column, Table};

/// Seed for the train/test shuffle. Fixed so retraining on the same
/// master table reproduces the same split and the same coefficients.
pub const SPLIT_SEED: u64 = 42;
pub const TEST_FRACTION: f64 = 0.2;
pub const ARTIFACT_SCHEMA_VERSION: u32 = 1;

// ============ Preprocessing ============

/// Median imputer fitted on the training partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Imputer {
    medians: BTreeMap<String, f64>,
}

impl Imputer {
    pub fn fit(table: &Table, columns: &[String]) -> Result<Self, PipelineError> {
        let mut medians = BTreeMap::new();
        for name in columns {
            let mut observed: Vec<f64> = table
                .numeric_column(name)?
                .iter()
                .flatten()
                .copied()
                .filter(|v| v.is_finite())
                .collect();
            let value = match median(&mut observed) {
                Some(m) => m,
                None => {
                    tracing::warn!("Column '{}' has no observed values, imputing with 0", name);
                    0.0
                }
            };
            medians.insert(name.clone(), value);
        }
        Ok(Self { medians })
    }

    pub fn median_for(&self, name: &str) -> Option<f64> {
        self.medians.get(name).copied()
    }

    /// Resolve a possibly-missing value. NaN counts as missing; infinite
    /// values cannot be scaled meaningfully and are rejected.
    pub fn fill(&self, name: &str, value: Option<f64>) -> Result<f64, PipelineError> {
        let median = self.medians.get(name).ok_or_else(|| {
            PipelineError::Scoring(format!("no imputation value for column '{name}'"))
        })?;
        match value {
            Some(v) if v.is_nan() => Ok(*median),
            Some(v) if v.is_infinite() => Err(PipelineError::Scoring(format!(
                "non-finite value in column '{name}'"
            ))),
            Some(v) => Ok(v),
            None => Ok(*median),
        }
    }
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) / 2.0
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ColumnStats {
    mean: f64,
    std: f64,
}

/// Standardizer fitted on the imputed training partition. Uses the
/// population standard deviation; effectively constant columns get a
/// divisor of 1 so they standardize to zero instead of exploding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scaler {
    stats: BTreeMap<String, ColumnStats>,
}

impl Scaler {
    pub fn fit(names: &[String], columns: &[Vec<f64>]) -> Self {
        let mut stats = BTreeMap::new();
        for (name, values) in names.iter().zip(columns) {
            let n = values.len() as f64;
            let mean = if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f64>() / n
            };
            let variance = if values.is_empty() {
                0.0
            } else {
                values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
            };
            let std = variance.sqrt();
            let epsilon = 1e-9 * mean.abs().max(1.0);
            let std = if std <= epsilon { 1.0 } else { std };
            stats.insert(name.clone(), ColumnStats { mean, std });
        }
        Self { stats }
    }

    pub fn scale(&self, name: &str, value: f64) -> Result<f64, PipelineError> {
        let stats = self.stats.get(name).ok_or_else(|| {
            PipelineError::Scoring(format!("no scaling statistics for column '{name}'"))
        })?;
        Ok((value - stats.mean) / stats.std)
    }
}

// ============ Fitted pipeline ============

/// Everything needed to turn engineered features into a probability:
/// imputer, scaler, classifier, and the feature order they share.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineModel {
    pub imputer: Imputer,
    pub scaler: Scaler,
    pub classifier: LogisticRegression,
    /// Engineered feature names in model input order.
    pub feature_names: Vec<String>,
}

impl PipelineModel {
    pub fn fit(
        features: &Table,
        labels: &[u8],
        feature_names: &[String],
    ) -> Result<Self, PipelineError> {
        if feature_names.is_empty() {
            return Err(PipelineError::EmptyFeatureSet);
        }
        let imputer = Imputer::fit(features, feature_names)?;

        let mut imputed: Vec<Vec<f64>> = Vec::with_capacity(feature_names.len());
        for name in feature_names {
            let raw = features.numeric_column(name)?;
            let mut filled = Vec::with_capacity(raw.len());
            for value in raw {
                filled.push(imputer.fill(name, value)?);
            }
            imputed.push(filled);
        }
        let scaler = Scaler::fit(feature_names, &imputed);

        let mut rows: Vec<Vec<f64>> = Vec::with_capacity(features.num_rows());
        for row_idx in 0..features.num_rows() {
            let mut row = Vec::with_capacity(feature_names.len());
            for (name, column) in feature_names.iter().zip(&imputed) {
                row.push(scaler.scale(name, column[row_idx])?);
            }
            rows.push(row);
        }
        let classifier = LogisticRegression::fit(&rows, labels)?;

        Ok(Self {
            imputer,
            scaler,
            classifier,
            feature_names: feature_names.to_vec(),
        })
    }

    /// Score every row of an engineered-feature table.
    ///
    /// This is the single probability path shared by batch evaluation and
    /// the online service: impute, scale, classify, in feature order.
    pub fn score_table(&self, table: &Table) -> Result<Vec<f64>, PipelineError> {
        let num_rows = table.num_rows();
        let mut scaled: Vec<Vec<f64>> = Vec::with_capacity(self.feature_names.len());
        for name in &self.feature_names {
            let raw = table.numeric_column(name)?;
            let mut column = Vec::with_capacity(num_rows);
            for value in raw {
                let filled = self.imputer.fill(name, value)?;
                column.push(self.scaler.scale(name, filled)?);
            }
            scaled.push(column);
        }

        let mut probabilities = Vec::with_capacity(num_rows);
        for row_idx in 0..num_rows {
            let row: Vec<f64> = scaled.iter().map(|column| column[row_idx]).collect();
            probabilities.push(self.classifier.predict_proba(&row)?);
        }
        Ok(probabilities)
    }
}

// ============ Split ============

/// Deterministic stratified split. Indices of each class are shuffled
/// with the seeded generator and the rounded test share of each class is
/// held out, so the class balance carries over to both partitions.
/// Returns `(train, test)` index lists, each sorted ascending.
pub fn stratified_split(labels: &[u8], test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();
    for class in [0u8, 1u8] {
        let mut indices: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, &label)| label == class)
            .map(|(i, _)| i)
            .collect();
        indices.shuffle(&mut rng);
        let take = ((indices.len() as f64) * test_fraction).round() as usize;
        test.extend(indices.drain(..take));
        train.extend(indices);
    }
    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

// ============ Artifact ============

/// Serialized training output: the fitted pipeline plus the provenance
/// needed to serve it faithfully.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskModelArtifact {
    pub schema_version: u32,
    pub trained_at: DateTime<Utc>,
    pub seed: u64,
    /// Raw (pre-engineering) columns the model was trained from, in
    /// training order. Serving reconciles requests against this list.
    pub input_columns: Vec<String>,
    pub training_rows: usize,
    pub test_rows: usize,
    pub model: PipelineModel,
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    checksum: &'a str,
    payload: &'a RiskModelArtifact,
}

#[derive(Deserialize)]
struct Envelope {
    checksum: String,
    payload: RiskModelArtifact,
}

impl RiskModelArtifact {
    /// Persist as JSON wrapped in a checksum envelope. The write goes to
    /// a temporary sibling and is renamed into place so a crash never
    /// leaves a truncated artifact behind.
    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        let payload = serde_json::to_string(self)?;
        let checksum = hex::encode(Sha256::digest(payload.as_bytes()));
        let envelope = serde_json::to_string_pretty(&EnvelopeRef {
            checksum: &checksum,
            payload: self,
        })?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, envelope)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        if !path.exists() {
            return Err(PipelineError::MissingInput(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        let envelope: Envelope = serde_json::from_str(&contents)
            .map_err(|e| PipelineError::Artifact(format!("malformed model file: {e}")))?;

        let payload = serde_json::to_string(&envelope.payload)?;
        let checksum = hex::encode(Sha256::digest(payload.as_bytes()));
        if checksum != envelope.checksum {
            return Err(PipelineError::Artifact(
                "checksum mismatch, model file is corrupted".to_string(),
            ));
        }
        if envelope.payload.schema_version != ARTIFACT_SCHEMA_VERSION {
            return Err(PipelineError::Artifact(format!(
                "unsupported artifact schema version {}",
                envelope.payload.schema_version
            )));
        }
        Ok(envelope.payload)
    }
}

// ============ Training ============

/// In-memory result of a training run.
pub struct TrainingOutput {
    pub artifact: RiskModelArtifact,
    pub x_test: Table,
    pub y_test: Table,
}

/// Outcome summary of a persisted training run.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub training_rows: usize,
    pub test_rows: usize,
    pub positive_rate: f64,
    pub feature_names: Vec<String>,
    pub model_path: PathBuf,
}

/// Train on a master table: select numeric features, engineer them,
/// split, fit the preprocessing and classifier on the training side, and
/// package the artifact together with the held-out partition.
pub fn train_model(master: &Table) -> Result<TrainingOutput, PipelineError> {
    if master.is_empty() {
        return Err(PipelineError::EmptyFeatureSet);
    }
    let labels = extract_labels(master)?;

    let input_columns: Vec<String> = master
        .numeric_column_names()
        .into_iter()
        .filter(|name| name != CUSTOMER_ID_COLUMN && name != TARGET_COLUMN)
        .collect();
    if input_columns.is_empty() {
        return Err(PipelineError::EmptyFeatureSet);
    }

    let mut features = Table::new();
    for name in &input_columns {
        let column = master
            .column(name)
            .ok_or_else(|| PipelineError::Schema(format!("column '{name}' not found")))?;
        features.push_column(column.clone())?;
    }
    let features = transform_features(features)?;
    let feature_names = features.column_names();

    let (train_indices, test_indices) = stratified_split(&labels, TEST_FRACTION, SPLIT_SEED);
    let train_features = features.select_rows(&train_indices);
    let train_labels: Vec<u8> = train_indices.iter().map(|&i| labels[i]).collect();

    let model = PipelineModel::fit(&train_features, &train_labels, &feature_names)?;

    let x_test = features.select_rows(&test_indices);
    let y_test = Table::from_columns(vec![Column::int(
        TARGET_COLUMN,
        test_indices
            .iter()
            .map(|&i| Some(i64::from(labels[i])))
            .collect(),
    )])?;

    let artifact = RiskModelArtifact {
        schema_version: ARTIFACT_SCHEMA_VERSION,
        trained_at: Utc::now(),
        seed: SPLIT_SEED,
        input_columns,
        training_rows: train_indices.len(),
        test_rows: test_indices.len(),
        model,
    };
    Ok(TrainingOutput {
        artifact,
        x_test,
        y_test,
    })
}

pub(crate) fn extract_labels(master: &Table) -> Result<Vec<u8>, PipelineError> {
    let raw = master.numeric_column(TARGET_COLUMN)?;
    let mut labels = Vec::with_capacity(raw.len());
    for (row, value) in raw.iter().enumerate() {
        match value {
            Some(v) if *v == 0.0 => labels.push(0),
            Some(v) if *v == 1.0 => labels.push(1),
            Some(v) => {
                return Err(PipelineError::Schema(format!(
                    "TARGET value {v} at row {row} is not binary"
                )));
            }
            None => {
                return Err(PipelineError::Schema(format!(
                    "TARGET is missing at row {row}"
                )));
            }
        }
    }
    Ok(labels)
}

/// Read the master table, train, and persist the artifact and the
/// held-out test partition.
pub fn run_training(config: &Config) -> Result<TrainingReport, PipelineError> {
    let master_path = config.master_table_path();
    tracing::info!("Loading master table from {}", master_path.display());
    let master = Table::read_parquet(&master_path)?;

    let labels = extract_labels(&master)?;
    let positives = labels.iter().filter(|&&l| l == 1).count();
    let positive_rate = if labels.is_empty() {
        0.0
    } else {
        positives as f64 / labels.len() as f64
    };

    let output = train_model(&master)?;
    let model_path = config.model_path();
    output.artifact.save(&model_path)?;
    output.x_test.write_parquet(&config.x_test_path())?;
    output.y_test.write_parquet(&config.y_test_path())?;

    let report = TrainingReport {
        training_rows: output.artifact.training_rows,
        test_rows: output.artifact.test_rows,
        positive_rate,
        feature_names: output.artifact.model.feature_names.clone(),
        model_path: model_path.clone(),
    };
    tracing::info!(
        "Training complete: {} training rows, {} held out, model written to {}",
        report.training_rows,
        report.test_rows,
        model_path.display()
    );
    Ok(report)
}
