//! Online scoring: request reconciliation, probability, and decision.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;
use crate::features::transform_features;
use crate::models::{ModelInfo, ScoringRequest, ScoringResponse};
use crate::pipeline::RiskModelArtifact;
use crate::table::{Column, Table};

/// Probabilities strictly below this approve outright.
pub const APPROVE_BELOW: f64 = 0.44;
/// Probabilities at or above this are rejected; the band in between goes
/// to a human analyst.
pub const REJECT_AT: f64 = 0.49;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Approve,
    ManualReview,
    Reject,
}

impl Decision {
    pub fn from_probability(probability: f64) -> Self {
        if probability < APPROVE_BELOW {
            Decision::Approve
        } else if probability < REJECT_AT {
            Decision::ManualReview
        } else {
            Decision::Reject
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "APPROVE",
            Decision::ManualReview => "MANUAL_REVIEW",
            Decision::Reject => "REJECT",
        }
    }

    fn recommendation(&self) -> &'static str {
        match self {
            Decision::Approve => "Low default risk. Approval recommended.",
            Decision::ManualReview => "Borderline default risk. Manual review recommended.",
            Decision::Reject => "High default risk. Rejection recommended.",
        }
    }
}

/// Loaded model plus the request plumbing around it.
///
/// A request is first reconciled against the columns the model was
/// trained from: training columns absent from the request are filled
/// with zero and request fields the model never saw are dropped. The
/// reconciled row then takes exactly the training path: feature
/// engineering, imputation, scaling, classification.
pub struct ScoringService {
    artifact: RiskModelArtifact,
}

impl ScoringService {
    pub fn from_artifact(artifact: RiskModelArtifact) -> Self {
        Self { artifact }
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        Ok(Self::from_artifact(RiskModelArtifact::load(path)?))
    }

    pub fn artifact(&self) -> &RiskModelArtifact {
        &self.artifact
    }

    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            schema_version: self.artifact.schema_version,
            trained_at: self.artifact.trained_at.to_rfc3339(),
            seed: self.artifact.seed,
            input_columns: self.artifact.input_columns.clone(),
            training_rows: self.artifact.training_rows,
            test_rows: self.artifact.test_rows,
        }
    }

    pub fn score(&self, request: &ScoringRequest) -> Result<ScoringResponse, PipelineError> {
        let row = self.reconcile_columns(request)?;
        let row = transform_features(row)?;
        let probabilities = self.artifact.model.score_table(&row)?;
        let probability = probabilities
            .first()
            .copied()
            .ok_or_else(|| PipelineError::Scoring("no probability produced".to_string()))?;

        let probability = round4(probability);
        let decision = Decision::from_probability(probability);
        Ok(ScoringResponse {
            decision: decision.as_str().to_string(),
            probability,
            message: format!(
                "Default probability: {:.1}%. {}",
                probability * 100.0,
                decision.recommendation()
            ),
        })
    }

    /// Build a single-row table covering exactly the training columns.
    fn reconcile_columns(&self, request: &ScoringRequest) -> Result<Table, PipelineError> {
        let provided = request.as_columns();
        let mut row = Table::new();
        for name in &self.artifact.input_columns {
            let value = provided
                .iter()
                .find(|(field, _)| field == name)
                .map(|(_, value)| *value);
            if value.is_none() {
                tracing::debug!("Request lacks training column '{}', filling with 0", name);
            }
            row.push_column(Column::float(name.clone(), vec![Some(value.unwrap_or(0.0))]))?;
        }
        if row.num_columns() == 0 {
            return Err(PipelineError::EmptyFeatureSet);
        }
        Ok(row)
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
