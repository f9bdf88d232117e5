//! Offline evaluation of a trained artifact on the held-out partition.

use std::fmt;

use serde::Serialize;

use crate::config::Config;
use crate::errors::PipelineError;
use crate::pipeline::{extract_labels, RiskModelArtifact};
use crate::table::Table;

/// Probability cut used to binarize predictions for the confusion matrix
/// and the per-class report. Decision thresholds used by the service are
/// a separate concern.
pub const LABEL_THRESHOLD: f64 = 0.5;

/// Area under the ROC curve via the Mann-Whitney rank statistic.
///
/// Scores are ranked ascending with ties sharing their average rank, so
/// tied probabilities contribute half a correctly-ordered pair each.
/// Undefined when the test set contains a single class.
pub fn roc_auc(labels: &[u8], scores: &[f64]) -> Result<f64, PipelineError> {
    if labels.len() != scores.len() {
        return Err(PipelineError::Schema(format!(
            "{} labels for {} scores",
            labels.len(),
            scores.len()
        )));
    }
    let positives = labels.iter().filter(|&&l| l == 1).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(PipelineError::Scoring(
            "ROC-AUC is undefined when the test set has a single class".to_string(),
        ));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let average_rank = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[order[k]] = average_rank;
        }
        i = j + 1;
    }

    let positive_rank_sum: f64 = labels
        .iter()
        .zip(&ranks)
        .filter(|(&label, _)| label == 1)
        .map(|(_, rank)| rank)
        .sum();
    let positives = positives as f64;
    let negatives = negatives as f64;
    Ok((positive_rank_sum - positives * (positives + 1.0) / 2.0) / (positives * negatives))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub true_positives: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(labels: &[u8], predicted: &[u8]) -> Self {
        let mut matrix = Self {
            true_negatives: 0,
            false_positives: 0,
            false_negatives: 0,
            true_positives: 0,
        };
        for (&label, &prediction) in labels.iter().zip(predicted) {
            match (label, prediction) {
                (0, 0) => matrix.true_negatives += 1,
                (0, _) => matrix.false_positives += 1,
                (_, 0) => matrix.false_negatives += 1,
                _ => matrix.true_positives += 1,
            }
        }
        matrix
    }

    pub fn support(&self) -> usize {
        self.true_negatives + self.false_positives + self.false_negatives + self.true_positives
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.support();
        if total == 0 {
            return 0.0;
        }
        (self.true_negatives + self.true_positives) as f64 / total as f64
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "            predicted 0  predicted 1")?;
        writeln!(
            f,
            "actual 0    {:>11}  {:>11}",
            self.true_negatives, self.false_positives
        )?;
        write!(
            f,
            "actual 1    {:>11}  {:>11}",
            self.false_negatives, self.true_positives
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

impl ClassMetrics {
    fn new(true_positives: usize, false_positives: usize, false_negatives: usize) -> Self {
        let precision = ratio(true_positives, true_positives + false_positives);
        let recall = ratio(true_positives, true_positives + false_negatives);
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };
        Self {
            precision,
            recall,
            f1,
            support: true_positives + false_negatives,
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Per-class precision, recall and F1, in the layout of the familiar
/// scikit-style text report.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationReport {
    pub negative: ClassMetrics,
    pub positive: ClassMetrics,
    pub accuracy: f64,
}

impl ClassificationReport {
    pub fn from_confusion(matrix: &ConfusionMatrix) -> Self {
        Self {
            negative: ClassMetrics::new(
                matrix.true_negatives,
                matrix.false_negatives,
                matrix.false_positives,
            ),
            positive: ClassMetrics::new(
                matrix.true_positives,
                matrix.false_positives,
                matrix.false_negatives,
            ),
            accuracy: matrix.accuracy(),
        }
    }

    fn total_support(&self) -> usize {
        self.negative.support + self.positive.support
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.total_support();
        let weight = |m: &ClassMetrics| m.support as f64 / total.max(1) as f64;

        writeln!(f, "{:>13} {:>9} {:>9} {:>9} {:>9}", "", "precision", "recall", "f1-score", "support")?;
        writeln!(f)?;
        for (name, metrics) in [("0", &self.negative), ("1", &self.positive)] {
            writeln!(
                f,
                "{:>13} {:>9.4} {:>9.4} {:>9.4} {:>9}",
                name, metrics.precision, metrics.recall, metrics.f1, metrics.support
            )?;
        }
        writeln!(f)?;
        writeln!(f, "{:>13} {:>9} {:>9} {:>9.4} {:>9}", "accuracy", "", "", self.accuracy, total)?;

        let macro_precision = (self.negative.precision + self.positive.precision) / 2.0;
        let macro_recall = (self.negative.recall + self.positive.recall) / 2.0;
        let macro_f1 = (self.negative.f1 + self.positive.f1) / 2.0;
        writeln!(
            f,
            "{:>13} {:>9.4} {:>9.4} {:>9.4} {:>9}",
            "macro avg", macro_precision, macro_recall, macro_f1, total
        )?;

        let weighted = |pick: fn(&ClassMetrics) -> f64| {
            pick(&self.negative) * weight(&self.negative) + pick(&self.positive) * weight(&self.positive)
        };
        write!(
            f,
            "{:>13} {:>9.4} {:>9.4} {:>9.4} {:>9}",
            "weighted avg",
            weighted(|m| m.precision),
            weighted(|m| m.recall),
            weighted(|m| m.f1),
            total
        )
    }
}

/// Full evaluation outcome for one artifact and test partition.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub test_rows: usize,
    pub roc_auc: f64,
    pub confusion: ConfusionMatrix,
    pub classification: ClassificationReport,
}

/// Score the held-out partition with the artifact's own pipeline and
/// compute ranking and classification metrics.
pub fn evaluate_artifact(
    artifact: &RiskModelArtifact,
    x_test: &Table,
    y_test: &Table,
) -> Result<EvaluationReport, PipelineError> {
    if x_test.num_rows() != y_test.num_rows() {
        return Err(PipelineError::Schema(format!(
            "test features have {} rows but labels have {}",
            x_test.num_rows(),
            y_test.num_rows()
        )));
    }
    if x_test.is_empty() {
        return Err(PipelineError::EmptyFeatureSet);
    }

    let labels = extract_labels(y_test)?;
    let scores = artifact.model.score_table(x_test)?;
    let auc = roc_auc(&labels, &scores)?;

    let predicted: Vec<u8> = scores
        .iter()
        .map(|&p| u8::from(p >= LABEL_THRESHOLD))
        .collect();
    let confusion = ConfusionMatrix::from_predictions(&labels, &predicted);
    let classification = ClassificationReport::from_confusion(&confusion);

    Ok(EvaluationReport {
        test_rows: labels.len(),
        roc_auc: auc,
        confusion,
        classification,
    })
}

/// Load the artifact and the persisted test partition, then evaluate.
pub fn run_evaluation(config: &Config) -> Result<EvaluationReport, PipelineError> {
    let model_path = config.model_path();
    tracing::info!("Loading model from {}", model_path.display());
    let artifact = RiskModelArtifact::load(&model_path)?;

    let x_test = Table::read_parquet(&config.x_test_path())?;
    let y_test = Table::read_parquet(&config.y_test_path())?;

    let report = evaluate_artifact(&artifact, &x_test, &y_test)?;
    tracing::info!(
        "Evaluation complete: ROC-AUC {:.4} over {} test rows",
        report.roc_auc,
        report.test_rows
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CUSTOMER_ID_COLUMN, TARGET_COLUMN};
    use crate::pipeline::{run_training, train_model};
    use crate::table::Column;
    use approx::assert_relative_eq;

    fn synthetic_master(rows: usize) -> Table {
        let mut ids = Vec::new();
        let mut targets = Vec::new();
        let mut incomes = Vec::new();
        let mut debts = Vec::new();
        for i in 0..rows {
            let positive = i % 5 == 0;
            ids.push(Some(i as i64 + 1));
            targets.push(Some(i64::from(positive)));
            incomes.push(Some(if positive {
                40_000.0 + i as f64
            } else {
                120_000.0 + i as f64
            }));
            debts.push(Some(if positive { 90_000.0 } else { 5_000.0 } + i as f64));
        }
        Table::from_columns(vec![
            Column::int(CUSTOMER_ID_COLUMN, ids),
            Column::int(TARGET_COLUMN, targets),
            Column::float("AMT_INCOME_TOTAL", incomes),
            Column::float("TOTAL_PREV_DEBT", debts),
        ])
        .unwrap()
    }

    #[test]
    fn auc_is_one_for_perfect_ranking() {
        let auc = roc_auc(&[0, 0, 1, 1], &[0.1, 0.2, 0.8, 0.9]).unwrap();
        assert_relative_eq!(auc, 1.0);
    }

    #[test]
    fn auc_is_zero_for_inverted_ranking() {
        let auc = roc_auc(&[0, 0, 1, 1], &[0.9, 0.8, 0.2, 0.1]).unwrap();
        assert_relative_eq!(auc, 0.0);
    }

    #[test]
    fn auc_counts_pairwise_orderings() {
        // One of four positive/negative pairs is ordered wrongly.
        let auc = roc_auc(&[0, 1, 0, 1], &[0.4, 0.3, 0.1, 0.8]).unwrap();
        assert_relative_eq!(auc, 0.75);
    }

    #[test]
    fn tied_scores_share_average_rank() {
        let auc = roc_auc(&[0, 1], &[0.5, 0.5]).unwrap();
        assert_relative_eq!(auc, 0.5);
    }

    #[test]
    fn single_class_auc_is_an_error() {
        assert!(matches!(
            roc_auc(&[1, 1], &[0.5, 0.6]),
            Err(PipelineError::Scoring(_))
        ));
        assert!(matches!(
            roc_auc(&[0, 0], &[0.5, 0.6]),
            Err(PipelineError::Scoring(_))
        ));
    }

    #[test]
    fn confusion_matrix_counts_each_cell() {
        let labels = [0, 0, 0, 1, 1, 1];
        let predicted = [0, 1, 0, 1, 0, 1];
        let matrix = ConfusionMatrix::from_predictions(&labels, &predicted);
        assert_eq!(matrix.true_negatives, 2);
        assert_eq!(matrix.false_positives, 1);
        assert_eq!(matrix.false_negatives, 1);
        assert_eq!(matrix.true_positives, 2);
        assert_relative_eq!(matrix.accuracy(), 4.0 / 6.0);
    }

    #[test]
    fn classification_report_matches_hand_computation() {
        let matrix = ConfusionMatrix {
            true_negatives: 8,
            false_positives: 2,
            false_negatives: 1,
            true_positives: 4,
        };
        let report = ClassificationReport::from_confusion(&matrix);

        assert_relative_eq!(report.negative.precision, 8.0 / 9.0);
        assert_relative_eq!(report.negative.recall, 8.0 / 10.0);
        assert_relative_eq!(report.positive.precision, 4.0 / 6.0);
        assert_relative_eq!(report.positive.recall, 4.0 / 5.0);
        assert_eq!(report.negative.support, 10);
        assert_eq!(report.positive.support, 5);
        assert_relative_eq!(report.accuracy, 12.0 / 15.0);

        let rendered = report.to_string();
        assert!(rendered.contains("precision"));
        assert!(rendered.contains("macro avg"));
        assert!(rendered.contains("weighted avg"));
    }

    #[test]
    fn evaluating_a_separable_model_scores_high_auc() {
        let output = train_model(&synthetic_master(100)).unwrap();
        let report = evaluate_artifact(&output.artifact, &output.x_test, &output.y_test).unwrap();

        assert_eq!(report.test_rows, 20);
        assert!(report.roc_auc > 0.9, "auc was {}", report.roc_auc);
        assert_eq!(report.confusion.support(), 20);
    }

    #[test]
    fn mismatched_partitions_are_rejected() {
        let output = train_model(&synthetic_master(100)).unwrap();
        let truncated = output.y_test.select_rows(&[0, 1, 2]);
        assert!(matches!(
            evaluate_artifact(&output.artifact, &output.x_test, &truncated),
            Err(PipelineError::Schema(_))
        ));
    }

    #[test]
    fn run_evaluation_reads_persisted_partition() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            crate::config::Config::with_dirs(dir.path().join("data"), dir.path().join("artifacts"));

        synthetic_master(100)
            .write_parquet(&config.master_table_path())
            .unwrap();
        run_training(&config).unwrap();

        let report = run_evaluation(&config).unwrap();
        assert_eq!(report.test_rows, 20);
        assert!(report.roc_auc > 0.9);
    }

    #[test]
    fn run_evaluation_without_model_is_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            crate::config::Config::with_dirs(dir.path().join("data"), dir.path().join("artifacts"));
        assert!(matches!(
            run_evaluation(&config),
            Err(PipelineError::MissingInput(_))
        ));
    }
}
