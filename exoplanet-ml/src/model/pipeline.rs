//! Pipeline artifact: ordered preprocessing steps ending in an estimator.
//!
//! ```json
//! {
//!   "name": "gradientboost_exoplanets",
//!   "version": "1.0.0",
//!   "classes": [0, 1],
//!   "steps": [
//!     {"name": "imputer", "kind": "simple_imputer", "strategy": "median",
//!      "feature_names_in": ["koi_score", "..."], "statistics": [0.5, "..."]},
//!     {"name": "classifier", "kind": "gradient_boosting",
//!      "init_raw": -0.4, "learning_rate": 0.1, "trees": ["..."]}
//!   ]
//! }
//! ```

use super::linear::LogisticRegression;
use super::trees::GradientBoosting;
use super::{Classifier, ModelInfo, sigmoid};
use crate::dataset::FeatureMatrix;
use crate::error::MlError;
use serde::{Deserialize, Serialize};

/// Step whose `feature_names_in` is the Required Feature List by default.
pub const DEFAULT_FEATURE_STEP: &str = "imputer";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStep {
    pub name: String,
    #[serde(flatten)]
    pub kind: StepKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
    SimpleImputer {
        #[serde(default)]
        strategy: Option<String>,
        #[serde(default)]
        feature_names_in: Option<Vec<String>>,
        statistics: Vec<f64>,
    },
    StandardScaler {
        mean: Vec<f64>,
        scale: Vec<f64>,
    },
    GradientBoosting(GradientBoosting),
    LogisticRegression(LogisticRegression),
}

impl StepKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::SimpleImputer { .. } => "simple_imputer",
            Self::StandardScaler { .. } => "standard_scaler",
            Self::GradientBoosting(_) => "gradient_boosting",
            Self::LogisticRegression(_) => "logistic_regression",
        }
    }

    fn is_estimator(&self) -> bool {
        matches!(self, Self::GradientBoosting(_) | Self::LogisticRegression(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default = "default_classes")]
    pub classes: [i64; 2],
    pub steps: Vec<PipelineStep>,
    #[serde(skip, default = "default_feature_step")]
    feature_step: String,
}

fn default_classes() -> [i64; 2] {
    [0, 1]
}

fn default_feature_step() -> String {
    DEFAULT_FEATURE_STEP.to_string()
}

impl Pipeline {
    pub fn new(name: impl Into<String>, steps: Vec<PipelineStep>) -> Self {
        Self {
            name: name.into(),
            version: String::new(),
            classes: default_classes(),
            steps,
            feature_step: default_feature_step(),
        }
    }

    /// Parse and validate a JSON artifact.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, MlError> {
        let pipeline: Self = serde_json::from_slice(bytes)?;
        pipeline.validate()?;
        Ok(pipeline)
    }

    /// Choose which step declares the Required Feature List.
    pub fn with_feature_step(mut self, step: impl Into<String>) -> Self {
        self.feature_step = step.into();
        self
    }

    pub fn feature_step(&self) -> &str {
        &self.feature_step
    }

    pub fn step(&self, name: &str) -> Option<&PipelineStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Input width, when any step pins it.
    pub fn n_features(&self) -> Option<usize> {
        self.steps.iter().find_map(|s| match &s.kind {
            StepKind::SimpleImputer {
                feature_names_in: Some(names),
                ..
            } => Some(names.len()),
            StepKind::SimpleImputer { statistics, .. } => Some(statistics.len()),
            StepKind::StandardScaler { mean, .. } => Some(mean.len()),
            StepKind::LogisticRegression(lr) => Some(lr.coef.len()),
            StepKind::GradientBoosting(_) => None,
        })
    }

    /// Structural checks run once at load time.
    pub fn validate(&self) -> Result<(), MlError> {
        let Some((last, transforms)) = self.steps.split_last() else {
            return Err(MlError::model("pipeline has no steps"));
        };
        if !last.kind.is_estimator() {
            return Err(MlError::model(format!(
                "last pipeline step '{}' is a {}, not an estimator",
                last.name,
                last.kind.label()
            )));
        }
        for (i, step) in self.steps.iter().enumerate() {
            if step.name.trim().is_empty() {
                return Err(MlError::model(format!("pipeline step #{} has no name", i + 1)));
            }
            if self.steps[..i].iter().any(|s| s.name == step.name) {
                return Err(MlError::model(format!(
                    "pipeline step name '{}' is used twice",
                    step.name
                )));
            }
        }
        if let Some(step) = transforms.iter().find(|s| s.kind.is_estimator()) {
            return Err(MlError::model(format!(
                "estimator step '{}' must be the last step",
                step.name
            )));
        }
        if self.classes[0] == self.classes[1] {
            return Err(MlError::model("pipeline classes must be distinct"));
        }

        let width = self.n_features();
        for step in &self.steps {
            let expect = |what: &str, len: usize| -> Result<(), MlError> {
                match width {
                    Some(w) if w != len => Err(MlError::model(format!(
                        "step '{}' has {len} {what} for {w} features",
                        step.name
                    ))),
                    _ => Ok(()),
                }
            };
            match &step.kind {
                StepKind::SimpleImputer {
                    feature_names_in,
                    statistics,
                    ..
                } => {
                    expect("statistics", statistics.len())?;
                    if let Some(names) = feature_names_in {
                        expect("feature names", names.len())?;
                        if names.iter().any(|n| n.trim().is_empty()) {
                            return Err(MlError::model(format!(
                                "step '{}' declares an empty feature name",
                                step.name
                            )));
                        }
                    }
                }
                StepKind::StandardScaler { mean, scale } => {
                    expect("means", mean.len())?;
                    expect("scales", scale.len())?;
                    if scale.iter().any(|s| *s == 0.0 || !s.is_finite()) {
                        return Err(MlError::model(format!(
                            "step '{}' has a zero or non-finite scale",
                            step.name
                        )));
                    }
                }
                StepKind::GradientBoosting(gb) => {
                    gb.validate(width)
                        .map_err(|e| e.within(&format!("step '{}'", step.name)))?;
                }
                StepKind::LogisticRegression(lr) => {
                    lr.validate(width)
                        .map_err(|e| e.within(&format!("step '{}'", step.name)))?;
                }
            }
        }
        Ok(())
    }

    fn positive_probabilities(&self, x: &FeatureMatrix) -> Result<Vec<f64>, MlError> {
        if let Some(width) = self.n_features() {
            if x.n_features() != width {
                return Err(MlError::inference(format!(
                    "X has {} features, but {} is expecting {} features as input",
                    x.n_features(),
                    self.name,
                    width
                )));
            }
        }
        if let Some(StepKind::GradientBoosting(gb)) = self.steps.last().map(|s| &s.kind) {
            if x.n_features() < gb.min_width() {
                return Err(MlError::inference(format!(
                    "X has {} features, but the trees split on feature {}",
                    x.n_features(),
                    gb.min_width() - 1
                )));
            }
        }

        let mut buf = vec![0.0; x.n_features()];
        let mut out = Vec::with_capacity(x.n_rows());
        for row in x.rows() {
            buf.copy_from_slice(row);
            let mut raw = None;
            for step in &self.steps {
                match &step.kind {
                    StepKind::SimpleImputer { statistics, .. } => {
                        for (v, fill) in buf.iter_mut().zip(statistics) {
                            if v.is_nan() {
                                *v = *fill;
                            }
                        }
                    }
                    StepKind::StandardScaler { mean, scale } => {
                        for ((v, m), s) in buf.iter_mut().zip(mean).zip(scale) {
                            *v = (*v - m) / s;
                        }
                    }
                    StepKind::GradientBoosting(gb) => raw = Some(gb.decision_function(&buf)),
                    StepKind::LogisticRegression(lr) => raw = Some(lr.decision_function(&buf)),
                }
            }
            let raw = raw.ok_or_else(|| MlError::inference("pipeline has no estimator"))?;
            out.push(sigmoid(raw));
        }
        Ok(out)
    }
}

impl Classifier for Pipeline {
    fn feature_names_in(&self) -> Option<&[String]> {
        match &self.step(&self.feature_step)?.kind {
            StepKind::SimpleImputer {
                feature_names_in: Some(names),
                ..
            } if !names.is_empty() => Some(names.as_slice()),
            _ => None,
        }
    }

    fn predict_proba(&self, x: &FeatureMatrix) -> Result<Vec<[f64; 2]>, MlError> {
        Ok(self
            .positive_probabilities(x)?
            .into_iter()
            .map(|p| [1.0 - p, p])
            .collect())
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<i64>, MlError> {
        Ok(self
            .positive_probabilities(x)?
            .into_iter()
            .map(|p| if p > 0.5 { self.classes[1] } else { self.classes[0] })
            .collect())
    }

    fn classes(&self) -> [i64; 2] {
        self.classes
    }

    fn describe(&self) -> ModelInfo {
        ModelInfo {
            name: self.name.clone(),
            version: self.version.clone(),
            estimator: self
                .steps
                .last()
                .map(|s| s.kind.label().to_string())
                .unwrap_or_default(),
            steps: self.steps.iter().map(|s| s.name.clone()).collect(),
            n_features: self.n_features(),
        }
    }
}
