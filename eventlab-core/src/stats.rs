//! Small numeric helpers shared by strategies and performance statistics.

/// Arithmetic mean. Returns 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divides by `n`).
pub fn std_dev_population(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Sample standard deviation (divides by `n - 1`). Returns 0.0 below two values.
pub fn std_dev_sample(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Below this standard deviation a window is treated as constant.
pub const MIN_STD_DEV: f64 = 1e-12;

/// Dispersion below this fraction of the input magnitude is rounding noise.
///
/// A spread `A - β·B` of two prices near 1e5 carries noise around 1e-11
/// even when the legs move in exact proportion.
pub const RELATIVE_STD_TOLERANCE: f64 = 1e-10;

/// Z-score of the last element against the whole window.
///
/// `scale` is the magnitude of the values the window was derived from (for
/// a spread, the leg prices). Returns `None` when the window is empty or its
/// dispersion is within `max(MIN_STD_DEV, RELATIVE_STD_TOLERANCE × scale)`,
/// so callers never divide by zero or by noise.
pub fn zscore_last(window: &[f64], scale: f64) -> Option<f64> {
    let last = *window.last()?;
    let std = std_dev_population(window);
    let tolerance = MIN_STD_DEV.max(RELATIVE_STD_TOLERANCE * scale.abs());
    if !(std > tolerance) {
        return None;
    }
    Some((last - mean(window)) / std)
}

/// Largest absolute value in `values`, 0.0 when empty.
pub fn max_abs(values: &[f64]) -> f64 {
    values.iter().fold(0.0_f64, |m, v| m.max(v.abs()))
}
