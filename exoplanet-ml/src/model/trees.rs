//! Gradient-boosted regression trees for binary log-loss classification.
//!
//! Trees use the flat array layout of fitted tree estimators: node `i` is a
//! leaf when `children_left[i] == -1`; otherwise `x[feature[i]] <= threshold[i]`
//! descends left. Missing values (NaN) descend right.

use crate::error::MlError;
use serde::{Deserialize, Serialize};

const LEAF: i32 = -1;

/// A single regression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    pub children_left: Vec<i32>,
    pub children_right: Vec<i32>,
    pub feature: Vec<i32>,
    pub threshold: Vec<f64>,
    pub value: Vec<f64>,
}

impl RegressionTree {
    /// A single-leaf tree that always returns `value`.
    pub fn constant(value: f64) -> Self {
        Self {
            children_left: vec![LEAF],
            children_right: vec![LEAF],
            feature: vec![LEAF],
            threshold: vec![0.0],
            value: vec![value],
        }
    }

    /// Check array shapes and child/feature indices.
    pub fn validate(&self, n_features: Option<usize>) -> Result<(), MlError> {
        let n = self.value.len();
        if n == 0 {
            return Err(MlError::model("tree has no nodes"));
        }
        if self.children_left.len() != n
            || self.children_right.len() != n
            || self.feature.len() != n
            || self.threshold.len() != n
        {
            return Err(MlError::model(format!(
                "tree arrays disagree in length (expected {n} nodes)"
            )));
        }
        for i in 0..n {
            let (left, right) = (self.children_left[i], self.children_right[i]);
            if (left == LEAF) != (right == LEAF) {
                return Err(MlError::model(format!(
                    "node {i} has exactly one child"
                )));
            }
            if left == LEAF {
                continue;
            }
            for child in [left, right] {
                if child <= i as i32 || child as usize >= n {
                    return Err(MlError::model(format!(
                        "node {i} points to invalid child {child}"
                    )));
                }
            }
            let feature = self.feature[i];
            if feature < 0 || n_features.is_some_and(|w| feature as usize >= w) {
                return Err(MlError::model(format!(
                    "node {i} splits on out-of-range feature {feature}"
                )));
            }
        }
        Ok(())
    }

    /// Leaf value reached by `row`.
    pub fn evaluate(&self, row: &[f64]) -> f64 {
        let mut node = 0usize;
        loop {
            let left = self.children_left[node];
            if left == LEAF {
                return self.value[node];
            }
            let x = row[self.feature[node] as usize];
            node = if x <= self.threshold[node] {
                left as usize
            } else {
                self.children_right[node] as usize
            };
        }
    }
}

/// Additive ensemble: `raw = init_raw + learning_rate * sum(tree(x))`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    /// Prior log-odds of the positive class.
    pub init_raw: f64,
    pub learning_rate: f64,
    pub trees: Vec<RegressionTree>,
}

impl GradientBoosting {
    pub fn validate(&self, n_features: Option<usize>) -> Result<(), MlError> {
        if self.trees.is_empty() {
            return Err(MlError::model("gradient boosting ensemble has no trees"));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(MlError::model(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(n_features)
                .map_err(|e| e.within(&format!("tree {i}")))?;
        }
        Ok(())
    }

    /// Highest feature index any split reads, plus one.
    pub fn min_width(&self) -> usize {
        self.trees
            .iter()
            .flat_map(|t| {
                t.feature
                    .iter()
                    .zip(&t.children_left)
                    .filter(|(_, l)| **l != LEAF)
                    .map(|(f, _)| *f as usize + 1)
            })
            .max()
            .unwrap_or(0)
    }

    pub fn decision_function(&self, row: &[f64]) -> f64 {
        let sum: f64 = self.trees.iter().map(|t| t.evaluate(row)).sum();
        self.init_raw + self.learning_rate * sum
    }
}
