//! Statistical models used by the strategies.
//!
//! - `ols`: hedge ratio by least squares through the origin
//! - `qda`: two-class quadratic discriminant classifier
//! - `dataset`: lagged-return training set and the offline training step

pub mod dataset;
pub mod ols;
pub mod qda;

use thiserror::Error;

pub use dataset::{lagged_returns, train_forecast_model, LaggedReturn};
pub use ols::hedge_ratio;
pub use qda::{DirectionClassifier, Movement, QuadraticDiscriminant};

/// Model-fit failures. Fatal for the configuration that triggered them.
#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("singular regression: {0}")]
    SingularRegression(String),
    #[error("degenerate training set: {0}")]
    DegenerateTrainingSet(String),
    #[error("singular covariance for class {0:?}")]
    SingularCovariance(Movement),
}
