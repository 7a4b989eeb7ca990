//! Logistic regression estimator.

use crate::error::MlError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub coef: Vec<f64>,
    pub intercept: f64,
}

impl LogisticRegression {
    pub fn validate(&self, n_features: Option<usize>) -> Result<(), MlError> {
        if self.coef.is_empty() {
            return Err(MlError::model("logistic regression has no coefficients"));
        }
        if let Some(width) = n_features {
            if self.coef.len() != width {
                return Err(MlError::model(format!(
                    "logistic regression has {} coefficients for {} features",
                    self.coef.len(),
                    width
                )));
            }
        }
        if self.coef.iter().any(|c| !c.is_finite()) || !self.intercept.is_finite() {
            return Err(MlError::model("logistic regression weights must be finite"));
        }
        Ok(())
    }

    pub fn decision_function(&self, row: &[f64]) -> f64 {
        self.coef
            .iter()
            .zip(row)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.intercept
    }
}
