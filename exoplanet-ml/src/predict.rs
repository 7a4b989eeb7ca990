//! Prediction service: upload validation, column mapping, feature checks,
//! scoring, and the augmented output table.
//!
//! This is transport-agnostic; the HTTP gateway and the offline CLI both
//! drive it.

use crate::dataset::{Dataset, RenameCollision, RenameReport};
use crate::error::MlError;
use crate::mapping::FeatureMapping;
use crate::model::{Classifier, DEFAULT_FEATURE_STEP};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

pub const DEFAULT_PROBABILITY_COLUMN: &str = "prob_confirme_planeta";
pub const DEFAULT_LABEL_COLUMN: &str = "prediccion";
pub const CSV_EXTENSION: &str = ".csv";

/// What to do when renaming makes two columns share a name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RenamePolicy {
    /// The later column in the header wins.
    #[default]
    LastWins,
    /// Reject the upload.
    Strict,
}

#[derive(Debug, Clone)]
pub struct PredictionOptions {
    pub probability_column: String,
    pub label_column: String,
    pub rename_policy: RenamePolicy,
    /// Pipeline step expected to declare the input features; only used to
    /// name it in configuration errors.
    pub feature_step: String,
}

impl Default for PredictionOptions {
    fn default() -> Self {
        Self {
            probability_column: DEFAULT_PROBABILITY_COLUMN.to_string(),
            label_column: DEFAULT_LABEL_COLUMN.to_string(),
            rename_policy: RenamePolicy::default(),
            feature_step: DEFAULT_FEATURE_STEP.to_string(),
        }
    }
}

/// Why a prediction request failed.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("uploaded file '{filename}' is not a CSV file")]
    InvalidFormat { filename: String },

    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("columns collide after renaming: {}", describe_collisions(.0))]
    RenameConflict(Vec<RenameCollision>),

    #[error("model pipeline has no '{step}' step declaring its input features")]
    ModelConfiguration { step: String },

    #[error(transparent)]
    Internal(#[from] MlError),
}

impl PredictError {
    /// True for problems with the upload itself, false for server-side faults.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidFormat { .. } | Self::MissingColumns(_) | Self::RenameConflict(_)
        )
    }
}

pub fn describe_collisions(collisions: &[RenameCollision]) -> String {
    collisions
        .iter()
        .map(|c| format!("{} <- {}", c.column, c.sources.join(" + ")))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Counts reported alongside the scored table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PredictionSummary {
    pub total_rows: usize,
    pub predictions_positives: usize,
    pub predictions_negatives: usize,
}

/// Input table plus the two prediction columns.
#[derive(Debug, Clone)]
pub struct ScoredDataset {
    pub dataset: Dataset,
    pub summary: PredictionSummary,
    pub renames: RenameReport,
}

/// Shared, read-only scoring capability.
pub struct PredictionService {
    model: Arc<dyn Classifier>,
    mapping: Arc<FeatureMapping>,
    options: PredictionOptions,
}

impl std::fmt::Debug for PredictionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionService")
            .field("model", &self.model.describe().name)
            .field("mapping_version", &self.mapping.version())
            .field("options", &self.options)
            .finish()
    }
}

impl PredictionService {
    pub fn new(
        model: Arc<dyn Classifier>,
        mapping: Arc<FeatureMapping>,
        options: PredictionOptions,
    ) -> Self {
        Self {
            model,
            mapping,
            options,
        }
    }

    pub fn model(&self) -> &dyn Classifier {
        self.model.as_ref()
    }

    pub fn mapping(&self) -> &FeatureMapping {
        &self.mapping
    }

    pub fn options(&self) -> &PredictionOptions {
        &self.options
    }

    /// Validate the filename, parse the bytes, and score every row.
    pub fn score_upload(&self, filename: &str, bytes: &[u8]) -> Result<ScoredDataset, PredictError> {
        if !filename.ends_with(CSV_EXTENSION) {
            return Err(PredictError::InvalidFormat {
                filename: filename.to_string(),
            });
        }
        let dataset = Dataset::from_csv_bytes(bytes)?;
        tracing::debug!(
            filename,
            rows = dataset.row_count(),
            columns = dataset.columns().len(),
            "Parsed upload"
        );
        self.score_dataset(dataset)
    }

    /// Rename, check required features, score, and append the predictions.
    pub fn score_dataset(&self, mut dataset: Dataset) -> Result<ScoredDataset, PredictError> {
        let renames = dataset.rename_columns(&self.mapping);
        if self.options.rename_policy == RenamePolicy::Strict && !renames.collisions.is_empty() {
            return Err(PredictError::RenameConflict(renames.collisions));
        }

        let required = self
            .model
            .feature_names_in()
            .ok_or_else(|| PredictError::ModelConfiguration {
                step: self.options.feature_step.clone(),
            })?;

        let missing = dataset.missing_columns(required);
        if !missing.is_empty() {
            return Err(PredictError::MissingColumns(missing));
        }

        let x = dataset.feature_matrix(required)?;
        let proba = self.model.predict_proba(&x)?;
        let labels = self.model.predict(&x)?;
        let rows = dataset.row_count();
        if proba.len() != rows || labels.len() != rows {
            return Err(MlError::inference(format!(
                "model returned {} probabilities and {} labels for {} rows",
                proba.len(),
                labels.len(),
                rows
            ))
            .into());
        }

        let positive = self.model.classes()[1];
        let positives = labels.iter().filter(|&&l| l == positive).count();
        let summary = PredictionSummary {
            total_rows: rows,
            predictions_positives: positives,
            predictions_negatives: rows - positives,
        };

        dataset.set_column(
            &self.options.probability_column,
            proba.iter().map(|p| format_float(p[1])).collect(),
        )?;
        dataset.set_column(
            &self.options.label_column,
            labels.iter().map(i64::to_string).collect(),
        )?;

        tracing::info!(
            rows,
            positives = summary.predictions_positives,
            negatives = summary.predictions_negatives,
            renamed = renames.renamed.len(),
            "Scored dataset"
        );
        Ok(ScoredDataset {
            dataset,
            summary,
            renames,
        })
    }
}

/// Shortest round-trip text for a float, always with a decimal part.
fn format_float(value: f64) -> String {
    let text = value.to_string();
    if value.is_finite() && !text.contains(['.', 'e', 'E']) {
        format!("{text}.0")
    } else {
        text
    }
}
