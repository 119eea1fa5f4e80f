//! Hedge ratio by ordinary least squares without an intercept.

use super::ModelError;

/// Slope of `y` regressed on `x` through the origin: `Σxy / Σx²`.
pub fn hedge_ratio(y: &[f64], x: &[f64]) -> Result<f64, ModelError> {
    if y.len() != x.len() {
        return Err(ModelError::SingularRegression(format!(
            "length mismatch: {} vs {}",
            y.len(),
            x.len()
        )));
    }
    let sxx: f64 = x.iter().map(|v| v * v).sum();
    let sxy: f64 = x.iter().zip(y).map(|(a, b)| a * b).sum();

    if !(sxx.is_finite() && sxx > 0.0) {
        return Err(ModelError::SingularRegression(
            "regressor has zero sum of squares".into(),
        ));
    }
    let beta = sxy / sxx;
    if !beta.is_finite() {
        return Err(ModelError::SingularRegression(format!("non-finite slope {beta}")));
    }
    Ok(beta)
}
