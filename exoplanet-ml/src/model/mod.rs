//! Model artifact: the pre-trained classifier consumed as an opaque capability.
//!
//! Request handling only sees the [`Classifier`] trait. [`Pipeline`] is the
//! artifact format loaded at startup; tests substitute their own fakes.

pub mod formats;
pub mod linear;
pub mod pipeline;
pub mod source;
pub mod trees;

pub use formats::{ModelFormat, detect_format};
pub use pipeline::{DEFAULT_FEATURE_STEP, Pipeline, PipelineStep, StepKind};
pub use source::{ArtifactSource, FileArtifactSource, HttpArtifactSource, load_pipeline, source_for};

use crate::dataset::FeatureMatrix;
use crate::error::MlError;
use serde::{Deserialize, Serialize};

/// A binary classifier with a declared input schema.
pub trait Classifier: Send + Sync {
    /// Ordered feature names the classifier expects, if the artifact declares them.
    fn feature_names_in(&self) -> Option<&[String]>;

    /// Per-row `[negative, positive]` class probabilities.
    fn predict_proba(&self, x: &FeatureMatrix) -> Result<Vec<[f64; 2]>, MlError>;

    /// Per-row predicted class label.
    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<i64>, MlError>;

    /// `[negative, positive]` class labels as returned by [`Classifier::predict`].
    fn classes(&self) -> [i64; 2] {
        [0, 1]
    }

    /// Descriptive metadata for logs and the CLI.
    fn describe(&self) -> ModelInfo;
}

/// Summary of a loaded model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub version: String,
    pub estimator: String,
    pub steps: Vec<String>,
    pub n_features: Option<usize>,
}

/// Numerically stable logistic function.
pub(crate) fn sigmoid(raw: f64) -> f64 {
    if raw >= 0.0 {
        1.0 / (1.0 + (-raw).exp())
    } else {
        let e = raw.exp();
        e / (1.0 + e)
    }
}
