//! Class-weighted logistic regression trained by full-batch gradient descent.
//!
//! Defaults are rare in the loan book, so plain maximum likelihood would
//! learn to wave everything through. Samples are reweighted so both classes
//! contribute equally to the gradient, the same "balanced" scheme the wider
//! ML ecosystem uses: `w_c = n / (2 * n_c)`.
//!
//! Fitting is fully deterministic. Weights start at zero and the batch
//! gradient has no stochastic component, so the same matrix always yields
//! the same coefficients.

use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;

const LEARNING_RATE: f64 = 0.1;
const MAX_EPOCHS: usize = 300;

/// Logit clamp. Beyond this the sigmoid saturates past f64 resolution
/// and `exp` risks overflow.
const MAX_LOGIT: f64 = 35.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub weights: Vec<f64>,
    pub intercept: f64,
}

impl LogisticRegression {
    /// Fit on a row-major feature matrix with binary labels.
    pub fn fit(features: &[Vec<f64>], labels: &[u8]) -> Result<Self, PipelineError> {
        let num_rows = features.len();
        let num_features = features.first().map_or(0, Vec::len);
        if num_rows == 0 || num_features == 0 {
            return Err(PipelineError::EmptyFeatureSet);
        }
        if labels.len() != num_rows {
            return Err(PipelineError::Schema(format!(
                "{} labels for {} feature rows",
                labels.len(),
                num_rows
            )));
        }
        for row in features {
            if row.len() != num_features {
                return Err(PipelineError::Schema(format!(
                    "ragged feature matrix: row with {} values, expected {}",
                    row.len(),
                    num_features
                )));
            }
        }

        let (weight_negative, weight_positive) = balanced_class_weights(labels)?;
        let sample_weights: Vec<f64> = labels
            .iter()
            .map(|&y| if y == 1 { weight_positive } else { weight_negative })
            .collect();

        let mut weights = vec![0.0; num_features];
        let mut intercept = 0.0;
        let scale = 1.0 / num_rows as f64;

        for _ in 0..MAX_EPOCHS {
            let mut gradient = vec![0.0; num_features];
            let mut gradient_intercept = 0.0;
            for (row, (&label, &sample_weight)) in
                features.iter().zip(labels.iter().zip(&sample_weights))
            {
                let logit = intercept + dot(&weights, row);
                let residual = sample_weight * (sigmoid(logit) - f64::from(label));
                for (g, x) in gradient.iter_mut().zip(row) {
                    *g += residual * x;
                }
                gradient_intercept += residual;
            }
            for (w, g) in weights.iter_mut().zip(&gradient) {
                *w -= LEARNING_RATE * scale * g;
            }
            intercept -= LEARNING_RATE * scale * gradient_intercept;
        }

        Ok(Self { weights, intercept })
    }

    pub fn num_features(&self) -> usize {
        self.weights.len()
    }

    /// Probability of the positive class for a single feature row.
    pub fn predict_proba(&self, row: &[f64]) -> Result<f64, PipelineError> {
        if row.len() != self.weights.len() {
            return Err(PipelineError::Scoring(format!(
                "feature row has {} values, model expects {}",
                row.len(),
                self.weights.len()
            )));
        }
        let probability = sigmoid(self.intercept + dot(&self.weights, row));
        if !probability.is_finite() {
            return Err(PipelineError::Scoring(
                "probability is not finite".to_string(),
            ));
        }
        Ok(probability)
    }
}

/// Per-class sample weights under the balanced scheme `n / (2 * n_c)`.
///
/// Returns `(negative, positive)`. Both classes must be present; a
/// single-class label vector cannot be fitted.
pub fn balanced_class_weights(labels: &[u8]) -> Result<(f64, f64), PipelineError> {
    let mut positives = 0usize;
    for &label in labels {
        match label {
            0 => {}
            1 => positives += 1,
            other => {
                return Err(PipelineError::Schema(format!(
                    "label {other} is not binary"
                )));
            }
        }
    }
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(PipelineError::Schema(
            "training labels contain a single class".to_string(),
        ));
    }
    let n = labels.len() as f64;
    Ok((n / (2.0 * negatives as f64), n / (2.0 * positives as f64)))
}

pub fn sigmoid(z: f64) -> f64 {
    let z = z.clamp(-MAX_LOGIT, MAX_LOGIT);
    1.0 / (1.0 + (-z).exp())
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn separable_data() -> (Vec<Vec<f64>>, Vec<u8>) {
        // One feature, cleanly separated around zero.
        let features = vec![
            vec![-2.0],
            vec![-1.5],
            vec![-1.0],
            vec![-0.5],
            vec![0.5],
            vec![1.0],
            vec![1.5],
            vec![2.0],
        ];
        let labels = vec![0, 0, 0, 0, 1, 1, 1, 1];
        (features, labels)
    }

    #[test]
    fn learns_a_separable_boundary() {
        let (features, labels) = separable_data();
        let model = LogisticRegression::fit(&features, &labels).unwrap();

        assert!(model.predict_proba(&[-2.0]).unwrap() < 0.5);
        assert!(model.predict_proba(&[2.0]).unwrap() > 0.5);
    }

    #[test]
    fn fitting_is_deterministic() {
        let (features, labels) = separable_data();
        let a = LogisticRegression::fit(&features, &labels).unwrap();
        let b = LogisticRegression::fit(&features, &labels).unwrap();
        assert_eq!(a.weights, b.weights);
        assert_eq!(a.intercept, b.intercept);
    }

    #[test]
    fn class_weights_balance_an_imbalanced_sample() {
        let labels = [0, 0, 0, 0, 0, 0, 0, 0, 0, 1];
        let (negative, positive) = balanced_class_weights(&labels).unwrap();
        assert_relative_eq!(negative, 10.0 / 18.0);
        assert_relative_eq!(positive, 5.0);
        // Total weight per class matches.
        assert_relative_eq!(negative * 9.0, positive * 1.0);
    }

    #[test]
    fn minority_class_is_not_drowned_out() {
        // 20:2 imbalance, still separable.
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for i in 0..20 {
            features.push(vec![-1.0 - (i as f64) * 0.05]);
            labels.push(0);
        }
        features.push(vec![1.0]);
        features.push(vec![1.2]);
        labels.push(1);
        labels.push(1);

        let model = LogisticRegression::fit(&features, &labels).unwrap();
        assert!(model.predict_proba(&[1.1]).unwrap() > 0.5);
    }

    #[test]
    fn single_class_labels_are_rejected() {
        let features = vec![vec![1.0], vec![2.0]];
        assert!(matches!(
            LogisticRegression::fit(&features, &[1, 1]),
            Err(PipelineError::Schema(_))
        ));
    }

    #[test]
    fn empty_matrix_is_rejected() {
        assert!(matches!(
            LogisticRegression::fit(&[], &[]),
            Err(PipelineError::EmptyFeatureSet)
        ));
        let no_columns: Vec<Vec<f64>> = vec![vec![], vec![]];
        assert!(matches!(
            LogisticRegression::fit(&no_columns, &[0, 1]),
            Err(PipelineError::EmptyFeatureSet)
        ));
    }

    #[test]
    fn feature_width_mismatch_is_a_scoring_error() {
        let (features, labels) = separable_data();
        let model = LogisticRegression::fit(&features, &labels).unwrap();
        assert!(matches!(
            model.predict_proba(&[1.0, 2.0]),
            Err(PipelineError::Scoring(_))
        ));
    }

    #[test]
    fn sigmoid_saturates_without_overflow() {
        assert!(sigmoid(1e6) < 1.0);
        assert!(sigmoid(1e6) > 0.999);
        assert!(sigmoid(-1e6) > 0.0);
        assert!(sigmoid(-1e6) < 0.001);
        assert_relative_eq!(sigmoid(0.0), 0.5);
    }
}
