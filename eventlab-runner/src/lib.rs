//! EventLab Runner — sweep orchestration on top of `eventlab-core`.
//!
//! - TOML sweep configuration and per-strategy parameter validation
//! - Bar loading from CSV directories or deterministic synthetic fixtures
//! - Multi-configuration sweep, sequential or rayon-parallel
//! - Ordered, incrementally flushed CSV results

pub mod config;
pub mod data_loader;
pub mod results;
pub mod sweep;

pub use config::{
    ConfigError, FailurePolicy, ParamGrid, ParamRow, StrategyKind, StrategyParams, SweepConfig,
};
pub use data_loader::{
    load_csv_bars, load_market_data, synthetic_market, synthetic_pair, synthetic_trend,
    DataSource, LoadError,
};
pub use results::{OrderedCsvSink, ResultsError};
pub use sweep::{MultiBacktest, RunError, RunOutcome, SweepError, SweepSummary};
