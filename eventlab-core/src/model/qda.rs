//! Quadratic discriminant analysis over two features and two classes.
//!
//! Each class is modelled as a bivariate Gaussian with its own mean and
//! covariance. Prediction picks the class with the larger log posterior:
//!
//! `ln π_k - ½ ln|Σ_k| - ½ (x - μ_k)ᵀ Σ_k⁻¹ (x - μ_k)`

use serde::{Deserialize, Serialize};

use super::ModelError;

/// Predicted direction of the next move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Movement {
    Down,
    Up,
}

/// A fitted binary classifier over two lagged-return features.
///
/// Injected into the forecast strategy; implementations must be immutable
/// after fitting.
pub trait DirectionClassifier: Send + Sync {
    fn predict(&self, features: [f64; 2]) -> Movement;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClassModel {
    log_prior: f64,
    mean: [f64; 2],
    inv_cov: [[f64; 2]; 2],
    log_det: f64,
}

impl ClassModel {
    fn fit(
        class: Movement,
        samples: &[[f64; 2]],
        total: usize,
        reg_param: f64,
    ) -> Result<Self, ModelError> {
        let n = samples.len();
        if n < 2 {
            return Err(ModelError::DegenerateTrainingSet(format!(
                "class {class:?} has {n} samples, need at least 2"
            )));
        }

        let mean = [
            samples.iter().map(|s| s[0]).sum::<f64>() / n as f64,
            samples.iter().map(|s| s[1]).sum::<f64>() / n as f64,
        ];

        let mut cov = [[0.0; 2]; 2];
        for s in samples {
            let d = [s[0] - mean[0], s[1] - mean[1]];
            cov[0][0] += d[0] * d[0];
            cov[0][1] += d[0] * d[1];
            cov[1][1] += d[1] * d[1];
        }
        let denom = (n - 1) as f64;
        cov[0][0] /= denom;
        cov[0][1] /= denom;
        cov[1][1] /= denom;
        cov[1][0] = cov[0][1];

        if reg_param > 0.0 {
            for (i, row) in cov.iter_mut().enumerate() {
                for (j, v) in row.iter_mut().enumerate() {
                    *v *= 1.0 - reg_param;
                    if i == j {
                        *v += reg_param;
                    }
                }
            }
        }

        let det = cov[0][0] * cov[1][1] - cov[0][1] * cov[1][0];
        if !(det.is_finite() && det > f64::MIN_POSITIVE) {
            return Err(ModelError::SingularCovariance(class));
        }
        let inv_cov = [
            [cov[1][1] / det, -cov[0][1] / det],
            [-cov[1][0] / det, cov[0][0] / det],
        ];

        Ok(Self {
            log_prior: (n as f64 / total as f64).ln(),
            mean,
            inv_cov,
            log_det: det.ln(),
        })
    }

    fn score(&self, x: [f64; 2]) -> f64 {
        let d = [x[0] - self.mean[0], x[1] - self.mean[1]];
        let m = d[0] * (self.inv_cov[0][0] * d[0] + self.inv_cov[0][1] * d[1])
            + d[1] * (self.inv_cov[1][0] * d[0] + self.inv_cov[1][1] * d[1]);
        self.log_prior - 0.5 * self.log_det - 0.5 * m
    }
}

/// Fitted two-class QDA model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuadraticDiscriminant {
    down: ClassModel,
    up: ClassModel,
}

impl QuadraticDiscriminant {
    /// Fit on labelled samples.
    ///
    /// `reg_param` in `[0, 1]` shrinks each class covariance towards the
    /// identity: `(1 - r) Σ + r I`.
    pub fn fit(samples: &[([f64; 2], Movement)], reg_param: f64) -> Result<Self, ModelError> {
        if !(0.0..=1.0).contains(&reg_param) {
            return Err(ModelError::DegenerateTrainingSet(format!(
                "reg_param {reg_param} outside [0, 1]"
            )));
        }
        if samples
            .iter()
            .any(|(x, _)| !x[0].is_finite() || !x[1].is_finite())
        {
            return Err(ModelError::DegenerateTrainingSet(
                "non-finite feature value".into(),
            ));
        }

        let split = |class: Movement| -> Vec<[f64; 2]> {
            samples
                .iter()
                .filter(|(_, label)| *label == class)
                .map(|(x, _)| *x)
                .collect()
        };
        let total = samples.len();

        Ok(Self {
            down: ClassModel::fit(Movement::Down, &split(Movement::Down), total, reg_param)?,
            up: ClassModel::fit(Movement::Up, &split(Movement::Up), total, reg_param)?,
        })
    }
}

impl DirectionClassifier for QuadraticDiscriminant {
    fn predict(&self, features: [f64; 2]) -> Movement {
        // Ties resolve to Down.
        if self.up.score(features) > self.down.score(features) {
            Movement::Up
        } else {
            Movement::Down
        }
    }
}
