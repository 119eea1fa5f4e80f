//! Lagged-return training set and the offline forecast training step.

use chrono::NaiveDateTime;

use super::qda::{Movement, QuadraticDiscriminant};
use super::ModelError;
use crate::domain::Bar;

/// Returns smaller than this (in percent) are nudged up to it so every
/// training row carries a definite up/down label.
pub const MIN_ABS_RETURN_PCT: f64 = 0.0001;

/// Number of trailing returns used as features.
pub const LAG_FEATURES: usize = 2;

/// One supervised row: the two prior returns and today's move.
#[derive(Debug, Clone, PartialEq)]
pub struct LaggedReturn {
    pub timestamp: NaiveDateTime,
    /// Return of the previous bar, in percent.
    pub lag1: f64,
    /// Return two bars back, in percent.
    pub lag2: f64,
    /// Today's return, in percent (nudged away from zero).
    pub today: f64,
    pub direction: Movement,
}

impl LaggedReturn {
    pub fn features(&self) -> [f64; 2] {
        [self.lag1, self.lag2]
    }
}

/// Percentage return between two prices.
pub fn pct_return(prev: f64, next: f64) -> f64 {
    (next - prev) / prev * 100.0
}

/// Build lagged-return rows from bars ordered by timestamp.
///
/// Rows whose returns are not finite (zero or missing prices) are skipped.
pub fn lagged_returns(bars: &[Bar]) -> Vec<LaggedReturn> {
    let mut rows = Vec::with_capacity(bars.len().saturating_sub(LAG_FEATURES + 1));
    for t in (LAG_FEATURES + 1)..bars.len() {
        let p = |k: usize| bars[t - k].adj_close;
        let mut today = pct_return(p(1), p(0));
        let lag1 = pct_return(p(2), p(1));
        let lag2 = pct_return(p(3), p(2));
        if !(today.is_finite() && lag1.is_finite() && lag2.is_finite()) {
            continue;
        }
        if today.abs() < MIN_ABS_RETURN_PCT {
            today = MIN_ABS_RETURN_PCT;
        }
        let direction = if today > 0.0 {
            Movement::Up
        } else {
            Movement::Down
        };
        rows.push(LaggedReturn {
            timestamp: bars[t].timestamp,
            lag1,
            lag2,
            today,
            direction,
        });
    }
    rows
}

/// Fit the forecast classifier on history strictly before `replay_start`.
pub fn train_forecast_model(
    history: &[Bar],
    replay_start: NaiveDateTime,
    reg_param: f64,
) -> Result<QuadraticDiscriminant, ModelError> {
    let training: Vec<Bar> = history
        .iter()
        .filter(|b| b.timestamp < replay_start)
        .cloned()
        .collect();
    let rows = lagged_returns(&training);
    if rows.is_empty() {
        return Err(ModelError::DegenerateTrainingSet(format!(
            "no training rows before {replay_start}"
        )));
    }
    let samples: Vec<([f64; 2], Movement)> =
        rows.iter().map(|r| (r.features(), r.direction)).collect();
    tracing::debug!(rows = samples.len(), %replay_start, "fitting forecast classifier");
    QuadraticDiscriminant::fit(&samples, reg_param)
}
