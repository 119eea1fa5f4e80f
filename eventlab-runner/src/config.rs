//! Sweep configuration loaded from TOML.
//!
//! A sweep file has three tables: `[backtest]` shared settings, `[strategy]`
//! naming the strategy kind, and `[sweep]` with the parameter rows. Rows are
//! plain `name = number` maps and are validated per strategy kind into
//! [`StrategyParams`]; nothing is clamped.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use eventlab_core::engine::DispatcherConfig;
use eventlab_core::portfolio::PortfolioSettings;
use eventlab_core::strategy::PairsParams;

/// One row of named numeric parameters.
pub type ParamRow = BTreeMap<String, f64>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid sweep TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown parameter '{key}' for {kind}")]
    UnknownParam { kind: StrategyKind, key: String },
    #[error("missing parameter '{key}' for {kind}")]
    MissingParam { kind: StrategyKind, key: String },
    #[error("parameter '{key}' must be an integer, got {value}")]
    NotInteger { key: String, value: f64 },
    #[error("parameter '{key}' = {value} is out of range: {reason}")]
    OutOfRange {
        key: String,
        value: f64,
        reason: &'static str,
    },
    #[error("{kind} needs {expected} symbol(s), got {got}")]
    SymbolCount {
        kind: StrategyKind,
        expected: &'static str,
        got: usize,
    },
    #[error("{kind} requires backtest.{field}")]
    MissingSetting {
        kind: StrategyKind,
        field: &'static str,
    },
    #[error("invalid backtest setting: {0}")]
    InvalidSetting(String),
}

/// Which strategy a sweep evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    PairsMeanReversion,
    MovingAverageCross,
    ClassifierForecast,
}

impl StrategyKind {
    /// Recognized parameter keys, in output column order.
    pub fn param_keys(&self) -> &'static [&'static str] {
        match self {
            StrategyKind::PairsMeanReversion => {
                &["window_length", "entry_threshold", "exit_threshold"]
            }
            StrategyKind::MovingAverageCross => &["short_window", "long_window"],
            StrategyKind::ClassifierForecast => &["reg_param"],
        }
    }

    /// Check the configured symbol list fits this kind.
    pub fn check_symbols(&self, symbols: &[String]) -> Result<(), ConfigError> {
        let (ok, expected) = match self {
            StrategyKind::PairsMeanReversion => (symbols.len() == 2, "exactly 2"),
            StrategyKind::MovingAverageCross => (!symbols.is_empty(), "at least 1"),
            StrategyKind::ClassifierForecast => (symbols.len() == 1, "exactly 1"),
        };
        if ok {
            Ok(())
        } else {
            Err(ConfigError::SymbolCount {
                kind: *self,
                expected,
                got: symbols.len(),
            })
        }
    }

    /// Validate a raw row into typed parameters.
    pub fn validate(&self, row: &ParamRow) -> Result<StrategyParams, ConfigError> {
        let keys = self.param_keys();
        if let Some(key) = row.keys().find(|k| !keys.contains(&k.as_str())) {
            return Err(ConfigError::UnknownParam {
                kind: *self,
                key: key.clone(),
            });
        }
        let required = |key: &str| {
            row.get(key).copied().ok_or_else(|| ConfigError::MissingParam {
                kind: *self,
                key: key.to_string(),
            })
        };

        match self {
            StrategyKind::PairsMeanReversion => {
                let window = positive_int("window_length", required("window_length")?)?;
                let entry = required("entry_threshold")?;
                let exit = required("exit_threshold")?;
                if !(entry.is_finite() && entry > 0.0) {
                    return Err(out_of_range("entry_threshold", entry, "must be > 0"));
                }
                if !(exit.is_finite() && exit >= 0.0) {
                    return Err(out_of_range("exit_threshold", exit, "must be >= 0"));
                }
                if exit >= entry {
                    return Err(out_of_range(
                        "exit_threshold",
                        exit,
                        "must be below entry_threshold",
                    ));
                }
                let params = PairsParams::new(window, entry, exit)
                    .map_err(|e| ConfigError::InvalidSetting(e.to_string()))?;
                Ok(StrategyParams::Pairs(params))
            }
            StrategyKind::MovingAverageCross => {
                let short_window = positive_int("short_window", required("short_window")?)?;
                let long_window = positive_int("long_window", required("long_window")?)?;
                if short_window >= long_window {
                    return Err(out_of_range(
                        "short_window",
                        short_window as f64,
                        "must be below long_window",
                    ));
                }
                Ok(StrategyParams::MovingAverage {
                    short_window,
                    long_window,
                })
            }
            StrategyKind::ClassifierForecast => {
                let reg_param = row.get("reg_param").copied().unwrap_or(0.0);
                if !(0.0..=1.0).contains(&reg_param) {
                    return Err(out_of_range("reg_param", reg_param, "must be in [0, 1]"));
                }
                Ok(StrategyParams::Classifier { reg_param })
            }
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StrategyKind::PairsMeanReversion => "pairs_mean_reversion",
            StrategyKind::MovingAverageCross => "moving_average_cross",
            StrategyKind::ClassifierForecast => "classifier_forecast",
        })
    }
}

fn out_of_range(key: &str, value: f64, reason: &'static str) -> ConfigError {
    ConfigError::OutOfRange {
        key: key.to_string(),
        value,
        reason,
    }
}

fn positive_int(key: &str, value: f64) -> Result<usize, ConfigError> {
    if !value.is_finite() || value.fract() != 0.0 {
        return Err(ConfigError::NotInteger {
            key: key.to_string(),
            value,
        });
    }
    if value < 1.0 {
        return Err(out_of_range(key, value, "must be > 0"));
    }
    Ok(value as usize)
}

/// Typed, validated parameters for one configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StrategyParams {
    Pairs(PairsParams),
    MovingAverage {
        short_window: usize,
        long_window: usize,
    },
    Classifier {
        reg_param: f64,
    },
}

impl StrategyParams {
    /// Parameter values as output columns, in [`StrategyKind::param_keys`] order.
    pub fn columns(&self) -> Vec<String> {
        match self {
            StrategyParams::Pairs(p) => vec![
                p.window.to_string(),
                p.zscore_high.to_string(),
                p.zscore_low.to_string(),
            ],
            StrategyParams::MovingAverage {
                short_window,
                long_window,
            } => vec![short_window.to_string(), long_window.to_string()],
            StrategyParams::Classifier { reg_param } => vec![reg_param.to_string()],
        }
    }
}

/// Best-effort parameter columns for a row that failed validation.
pub fn raw_columns(kind: StrategyKind, row: &ParamRow) -> Vec<String> {
    kind.param_keys()
        .iter()
        .map(|k| row.get(*k).map(|v| v.to_string()).unwrap_or_default())
        .collect()
}

/// `[backtest]`: settings shared by every configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BacktestSection {
    pub symbols: Vec<String>,
    #[serde(default = "default_initial_capital")]
    pub initial_capital: f64,
    #[serde(default)]
    pub heartbeat_ms: u64,
    #[serde(default)]
    pub deadline_secs: Option<u64>,
    /// First replay timestamp (inclusive). Also the end of the training window.
    #[serde(default)]
    pub start: Option<NaiveDateTime>,
    /// Last replay timestamp (inclusive).
    #[serde(default)]
    pub end: Option<NaiveDateTime>,
    #[serde(default = "default_periods_per_year")]
    pub periods_per_year: f64,
    #[serde(default = "default_base_quantity")]
    pub base_quantity: u64,
    /// Earliest bar used to train the forecast classifier.
    #[serde(default)]
    pub training_start: Option<NaiveDateTime>,
}

fn default_initial_capital() -> f64 {
    100_000.0
}

fn default_periods_per_year() -> f64 {
    252.0
}

fn default_base_quantity() -> u64 {
    100
}

impl BacktestSection {
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            heartbeat: Duration::from_millis(self.heartbeat_ms),
            deadline: self.deadline_secs.map(Duration::from_secs),
            record_events: false,
        }
    }

    pub fn portfolio_settings(&self) -> PortfolioSettings {
        PortfolioSettings {
            initial_capital: self.initial_capital,
            base_quantity: self.base_quantity,
            periods_per_year: self.periods_per_year,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(ConfigError::InvalidSetting(format!(
                "initial_capital must be positive, got {}",
                self.initial_capital
            )));
        }
        if !(self.periods_per_year.is_finite() && self.periods_per_year > 0.0) {
            return Err(ConfigError::InvalidSetting(format!(
                "periods_per_year must be positive, got {}",
                self.periods_per_year
            )));
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(ConfigError::InvalidSetting(format!(
                    "start {start} is after end {end}"
                )));
            }
        }
        Ok(())
    }
}

/// `[strategy]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategySection {
    pub kind: StrategyKind,
}

/// What to do when one configuration fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Write a `FAILED` row and continue with the next configuration.
    #[default]
    Isolate,
    /// Stop the sweep; rows already written are kept.
    Abort,
}

/// `[sweep]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweepSection {
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    #[serde(default)]
    pub on_failure: FailurePolicy,
    /// Explicit rows, run in the order given.
    #[serde(default)]
    pub params: Vec<ParamRow>,
    /// Cartesian grid appended after the explicit rows.
    #[serde(default)]
    pub grid: BTreeMap<String, Vec<f64>>,
}

fn default_output() -> PathBuf {
    PathBuf::from("output.csv")
}

fn default_parallel() -> bool {
    true
}

impl Default for SweepSection {
    fn default() -> Self {
        Self {
            output: default_output(),
            parallel: default_parallel(),
            on_failure: FailurePolicy::default(),
            params: Vec::new(),
            grid: BTreeMap::new(),
        }
    }
}

/// A complete sweep file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweepConfig {
    pub backtest: BacktestSection,
    pub strategy: StrategySection,
    #[serde(default)]
    pub sweep: SweepSection,
}

impl SweepConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and check the settings shared by all configurations.
    ///
    /// Parameter rows are validated one at a time when they run, so a bad
    /// row only fails its own configuration.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: SweepConfig = toml::from_str(content)?;
        config.backtest.validate()?;
        config.strategy.kind.check_symbols(&config.backtest.symbols)?;
        Ok(config)
    }

    /// Every configuration row in run order: explicit rows, then the grid.
    pub fn rows(&self) -> Vec<ParamRow> {
        let mut rows = self.sweep.params.clone();
        if !self.sweep.grid.is_empty() {
            let mut grid = ParamGrid::new();
            for (key, values) in &self.sweep.grid {
                grid = grid.axis(key, values.clone());
            }
            rows.extend(grid.rows(self.strategy.kind));
        }
        rows
    }
}

/// Cartesian product over named parameter axes.
///
/// Combinations that fail validation for the strategy kind (for example
/// `short_window >= long_window`) are skipped.
#[derive(Debug, Clone, Default)]
pub struct ParamGrid {
    axes: Vec<(String, Vec<f64>)>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn axis(mut self, key: impl Into<String>, values: Vec<f64>) -> Self {
        self.axes.push((key.into(), values));
        self
    }

    /// Number of raw combinations, before validation.
    pub fn size(&self) -> usize {
        if self.axes.is_empty() {
            return 0;
        }
        self.axes.iter().map(|(_, v)| v.len()).product()
    }

    /// Valid rows, with the last axis varying fastest.
    pub fn rows(&self, kind: StrategyKind) -> Vec<ParamRow> {
        if self.axes.is_empty() {
            return Vec::new();
        }
        let mut rows = vec![ParamRow::new()];
        for (key, values) in &self.axes {
            let mut next = Vec::with_capacity(rows.len() * values.len());
            for row in &rows {
                for &v in values {
                    let mut r = row.clone();
                    r.insert(key.clone(), v);
                    next.push(r);
                }
            }
            rows = next;
        }
        rows.retain(|r| kind.validate(r).is_ok());
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAIRS_TOML: &str = r#"
[backtest]
symbols = ["AAPL", "GOOG"]
heartbeat_ms = 0
deadline_secs = 60
start = "2024-01-02T00:00:00"

[strategy]
kind = "pairs_mean_reversion"

[sweep]
output = "pairs.csv"
on_failure = "abort"

[[sweep.params]]
window_length = 100
entry_threshold = 3.0
exit_threshold = 0.5

[[sweep.params]]
window_length = 50
entry_threshold = 2.0
exit_threshold = 0.5
"#;

    fn row(pairs: &[(&str, f64)]) -> ParamRow {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn parses_pairs_sweep_with_defaults() {
        let config = SweepConfig::from_toml(PAIRS_TOML).unwrap();
        assert_eq!(config.strategy.kind, StrategyKind::PairsMeanReversion);
        assert_eq!(config.backtest.initial_capital, 100_000.0);
        assert_eq!(config.backtest.base_quantity, 100);
        assert_eq!(config.backtest.deadline_secs, Some(60));
        assert!(config.backtest.start.is_some());
        assert_eq!(config.sweep.on_failure, FailurePolicy::Abort);
        assert!(config.sweep.parallel);
        assert_eq!(config.rows().len(), 2);
    }

    #[test]
    fn unknown_strategy_kind_is_rejected() {
        let toml = PAIRS_TOML.replace("pairs_mean_reversion", "martingale");
        assert!(matches!(
            SweepConfig::from_toml(&toml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn pairs_needs_two_symbols() {
        let toml = PAIRS_TOML.replace(r#"["AAPL", "GOOG"]"#, r#"["AAPL"]"#);
        assert!(matches!(
            SweepConfig::from_toml(&toml),
            Err(ConfigError::SymbolCount { got: 1, .. })
        ));
    }

    #[test]
    fn pairs_row_validation() {
        let kind = StrategyKind::PairsMeanReversion;
        let ok = row(&[
            ("window_length", 100.0),
            ("entry_threshold", 3.0),
            ("exit_threshold", 0.5),
        ]);
        let StrategyParams::Pairs(p) = kind.validate(&ok).unwrap() else {
            panic!("expected pairs params");
        };
        assert_eq!(p.window, 100);

        let mut bad = ok.clone();
        bad.insert("exit_threshold".into(), 3.0);
        assert!(matches!(kind.validate(&bad), Err(ConfigError::OutOfRange { .. })));

        let mut bad = ok.clone();
        bad.insert("window_length".into(), 10.5);
        assert!(matches!(kind.validate(&bad), Err(ConfigError::NotInteger { .. })));

        let mut bad = ok.clone();
        bad.insert("window_length".into(), 0.0);
        assert!(matches!(kind.validate(&bad), Err(ConfigError::OutOfRange { .. })));

        let mut bad = ok.clone();
        bad.insert("lookback".into(), 5.0);
        assert!(matches!(kind.validate(&bad), Err(ConfigError::UnknownParam { .. })));

        let mut bad = ok;
        bad.remove("entry_threshold");
        assert!(matches!(kind.validate(&bad), Err(ConfigError::MissingParam { .. })));
    }

    #[test]
    fn moving_average_requires_short_below_long() {
        let kind = StrategyKind::MovingAverageCross;
        assert!(kind
            .validate(&row(&[("short_window", 100.0), ("long_window", 400.0)]))
            .is_ok());
        assert!(kind
            .validate(&row(&[("short_window", 400.0), ("long_window", 400.0)]))
            .is_err());
    }

    #[test]
    fn classifier_reg_param_is_optional() {
        let kind = StrategyKind::ClassifierForecast;
        assert_eq!(
            kind.validate(&ParamRow::new()).unwrap(),
            StrategyParams::Classifier { reg_param: 0.0 }
        );
        assert!(kind.validate(&row(&[("reg_param", 1.5)])).is_err());
    }

    #[test]
    fn columns_follow_key_order() {
        let params = StrategyKind::PairsMeanReversion
            .validate(&row(&[
                ("exit_threshold", 0.5),
                ("entry_threshold", 3.0),
                ("window_length", 100.0),
            ]))
            .unwrap();
        assert_eq!(params.columns(), vec!["100", "3", "0.5"]);
    }

    #[test]
    fn grid_skips_invalid_combinations() {
        let grid = ParamGrid::new()
            .axis("short_window", vec![10.0, 50.0, 100.0])
            .axis("long_window", vec![50.0, 200.0]);
        assert_eq!(grid.size(), 6);

        let rows = grid.rows(StrategyKind::MovingAverageCross);
        // (10,50) (10,200) (50,200) (100,200); (50,50) and (100,50) dropped.
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0]["short_window"], 10.0);
        assert_eq!(rows[0]["long_window"], 50.0);
        assert_eq!(rows[3]["short_window"], 100.0);
    }

    #[test]
    fn sweep_grid_is_appended_after_explicit_rows() {
        let toml = format!(
            "{PAIRS_TOML}\n[sweep.grid]\nwindow_length = [20.0]\nentry_threshold = [1.5, 2.5]\nexit_threshold = [0.0]\n"
        );
        let config = SweepConfig::from_toml(&toml).unwrap();
        let rows = config.rows();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[2]["entry_threshold"], 1.5);
        assert_eq!(rows[3]["entry_threshold"], 2.5);
    }
}
