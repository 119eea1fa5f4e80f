//! Performance statistics as pure functions over an equity series.
//!
//! No dependencies on the dispatcher or the portfolio: totals in, scalars out.

use serde::{Deserialize, Serialize};

use tracing::warn;

use crate::stats::{mean, std_dev_sample, MIN_STD_DEV};

/// Equity curve derived from per-tick total equity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EquityCurve {
    /// Per-tick simple returns (first entry is 0.0).
    pub returns: Vec<f64>,
    /// Cumulative growth of 1.0, one entry per tick.
    pub curve: Vec<f64>,
    /// Drawdown from the running high-water mark, one entry per tick.
    pub drawdown: Vec<f64>,
}

impl EquityCurve {
    pub fn from_totals(totals: &[f64]) -> Self {
        let returns = period_returns(totals);
        let mut curve = Vec::with_capacity(returns.len());
        let mut growth = 1.0;
        for r in &returns {
            growth *= 1.0 + r;
            curve.push(growth);
        }
        let drawdown = drawdown_series(&curve);
        Self {
            returns,
            curve,
            drawdown,
        }
    }

    /// Final value of the curve minus one (e.g. 0.12 = +12%).
    pub fn total_return(&self) -> f64 {
        self.curve.last().map_or(0.0, |v| v - 1.0)
    }
}

/// Simple returns between consecutive totals; the first period is 0.0.
///
/// A simple return is undefined once equity is at or below zero, so every
/// period after the account is wiped out returns 0.0 and the curve stays at
/// its ruin value. Such periods are reported with a warning.
pub fn period_returns(totals: &[f64]) -> Vec<f64> {
    let mut returns = Vec::with_capacity(totals.len());
    if totals.is_empty() {
        return returns;
    }
    returns.push(0.0);
    let mut undefined = 0usize;
    for w in totals.windows(2) {
        if w[0] > 0.0 {
            returns.push(w[1] / w[0] - 1.0);
        } else {
            undefined += 1;
            returns.push(0.0);
        }
    }
    if undefined > 0 {
        let first = totals.iter().position(|t| *t <= 0.0);
        warn!(
            periods = undefined,
            first_tick = ?first,
            "equity at or below zero, later returns recorded as 0"
        );
    }
    returns
}

/// Annualized Sharpe ratio: `sqrt(periods) × mean / std`.
///
/// Returns 0.0 if variance is zero or fewer than 2 returns.
pub fn sharpe_ratio(returns: &[f64], periods_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let std = std_dev_sample(returns);
    if std < MIN_STD_DEV {
        return 0.0;
    }
    periods_per_year.sqrt() * mean(returns) / std
}

fn drawdown_series(curve: &[f64]) -> Vec<f64> {
    let mut peak = f64::NEG_INFINITY;
    curve
        .iter()
        .map(|&v| {
            peak = peak.max(v);
            peak - v
        })
        .collect()
}

/// Largest drawdown (in curve units) and longest drawdown duration (in ticks).
pub fn drawdowns(curve: &[f64]) -> (f64, usize) {
    let mut max_dd = 0.0_f64;
    let mut duration = 0usize;
    let mut max_duration = 0usize;
    for dd in drawdown_series(curve) {
        max_dd = max_dd.max(dd);
        duration = if dd > 0.0 { duration + 1 } else { 0 };
        max_duration = max_duration.max(duration);
    }
    (max_dd, max_duration)
}

/// Headline statistics for a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    /// Fractional total return (0.05 = 5%).
    pub total_return: f64,
    pub sharpe_ratio: f64,
    /// Fractional max drawdown (0.10 = 10%).
    pub max_drawdown: f64,
    pub drawdown_duration: usize,
}

impl SummaryStats {
    pub fn compute(curve: &EquityCurve, periods_per_year: f64) -> Self {
        let (max_drawdown, drawdown_duration) = drawdowns(&curve.curve);
        Self {
            total_return: curve.total_return(),
            sharpe_ratio: sharpe_ratio(&curve.returns, periods_per_year),
            max_drawdown,
            drawdown_duration,
        }
    }

    /// Labelled, formatted pairs in the fixed reporting order.
    pub fn formatted(&self) -> Vec<(String, String)> {
        vec![
            (
                "Total Return".into(),
                format!("{:.2}%", self.total_return * 100.0),
            ),
            ("Sharpe Ratio".into(), format!("{:.2}", self.sharpe_ratio)),
            (
                "Max Drawdown".into(),
                format!("{:.2}%", self.max_drawdown * 100.0),
            ),
            (
                "Drawdown Duration".into(),
                format!("{}", self.drawdown_duration),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curve_tracks_growth() {
        let curve = EquityCurve::from_totals(&[100.0, 110.0, 99.0, 121.0]);
        assert_eq!(curve.curve.len(), 4);
        assert_eq!(curve.returns[0], 0.0);
        assert!((curve.curve[1] - 1.10).abs() < 1e-12);
        assert!((curve.curve[2] - 0.99).abs() < 1e-12);
        assert!((curve.total_return() - 0.21).abs() < 1e-12);
    }

    #[test]
    fn curve_holds_at_ruin_once_equity_goes_negative() {
        let returns = period_returns(&[100.0, -10.0, -50.0, 20.0]);
        assert_eq!(returns.len(), 4);
        assert!((returns[1] + 1.1).abs() < 1e-12);
        assert_eq!(&returns[2..], &[0.0, 0.0]);

        let curve = EquityCurve::from_totals(&[100.0, -10.0, -50.0, 20.0]);
        assert!((curve.total_return() + 1.1).abs() < 1e-12);
    }

    #[test]
    fn drawdown_and_duration() {
        let (dd, dur) = drawdowns(&[1.0, 1.2, 1.0, 0.9, 1.1, 1.3, 1.25]);
        assert!((dd - 0.3).abs() < 1e-12);
        assert_eq!(dur, 3);
    }

    #[test]
    fn monotonic_curve_has_no_drawdown() {
        let (dd, dur) = drawdowns(&[1.0, 1.01, 1.02, 1.05]);
        assert_eq!(dd, 0.0);
        assert_eq!(dur, 0);
    }

    #[test]
    fn sharpe_constant_equity_is_zero() {
        let curve = EquityCurve::from_totals(&[100.0; 50]);
        assert_eq!(sharpe_ratio(&curve.returns, 252.0), 0.0);
    }

    #[test]
    fn formatted_stats_order_and_suffixes() {
        let stats = SummaryStats {
            total_return: 0.1234,
            sharpe_ratio: 1.5,
            max_drawdown: 0.05,
            drawdown_duration: 12,
        };
        let f = stats.formatted();
        let labels: Vec<&str> = f.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(
            labels,
            ["Total Return", "Sharpe Ratio", "Max Drawdown", "Drawdown Duration"]
        );
        assert_eq!(f[0].1, "12.34%");
        assert_eq!(f[1].1, "1.50");
        assert_eq!(f[2].1, "5.00%");
        assert_eq!(f[3].1, "12");
    }
}
