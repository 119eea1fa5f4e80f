//! Multi-configuration sweep.
//!
//! Every configuration gets its own queue, data handler, strategy, portfolio
//! and execution handler; only the bar fixture is shared (read-only, behind
//! `Arc`). Configurations run sequentially or in parallel on the rayon pool,
//! and their rows reach the results file in input order either way.

use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use eventlab_core::data::{HistoricDataHandler, MarketData};
use eventlab_core::engine::{Backtest, BacktestReport, DispatchError};
use eventlab_core::error::ComponentError;
use eventlab_core::execution::SimulatedExecutionHandler;
use eventlab_core::model::{train_forecast_model, ModelError};
use eventlab_core::portfolio::NaivePortfolio;
use eventlab_core::strategy::{
    ClassifierForecast, MovingAverageCross, PairsMeanReversion, Strategy, StrategyError,
};

use crate::config::{
    raw_columns, ConfigError, FailurePolicy, ParamRow, StrategyKind, StrategyParams, SweepConfig,
};
use crate::results::{failure_fields, summary_fields, OrderedCsvSink, ResultsError};

/// Errors that fail a single configuration.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("strategy error: {0}")]
    Strategy(#[from] StrategyError),
    #[error("model error: {0}")]
    Model(#[from] ModelError),
    #[error("data error: {0}")]
    Data(#[from] ComponentError),
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("results error: {0}")]
    Results(#[from] ResultsError),
    #[error("row {index} out of range ({total} rows)")]
    NoSuchRow { index: usize, total: usize },
}

/// Errors that stop the whole sweep.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("symbols missing from market data: {0}")]
    Data(#[from] ComponentError),
    #[error("results error: {0}")]
    Results(#[from] ResultsError),
    #[error("configuration {index} failed, sweep aborted: {source}")]
    Aborted {
        index: usize,
        #[source]
        source: RunError,
    },
}

/// A finished configuration.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub index: usize,
    pub params: StrategyParams,
    pub report: BacktestReport,
    /// Output fields: parameter columns then stripped summary statistics.
    pub fields: Vec<String>,
}

/// Totals for a finished sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepSummary {
    pub total: usize,
    pub succeeded: usize,
    /// `(index, error message)` for each isolated failure.
    pub failed: Vec<(usize, String)>,
    pub output: PathBuf,
}

/// `Some((index, message))` for an isolated failure.
type JobResult = Option<(usize, String)>;

/// Runs every configuration of a [`SweepConfig`] against one bar fixture.
pub struct MultiBacktest {
    config: SweepConfig,
    rows: Vec<ParamRow>,
    data: Arc<MarketData>,
    parallel: bool,
}

impl MultiBacktest {
    /// Restricts `data` to the configured symbols.
    pub fn new(config: SweepConfig, data: &MarketData) -> Result<Self, SweepError> {
        let data = Arc::new(data.select(&config.backtest.symbols)?);
        let rows = config.rows();
        let parallel = config.sweep.parallel;
        Ok(Self {
            config,
            rows,
            data,
            parallel,
        })
    }

    /// Enables or disables parallel execution.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Run one configuration by row index.
    pub fn run_row(&self, index: usize) -> Result<RunOutcome, RunError> {
        let row = self.rows.get(index).ok_or(RunError::NoSuchRow {
            index,
            total: self.rows.len(),
        })?;
        self.run_one(index, row)
    }

    fn run_one(&self, index: usize, row: &ParamRow) -> Result<RunOutcome, RunError> {
        let kind = self.config.strategy.kind;
        let params = kind.validate(row)?;
        let backtest = &self.config.backtest;

        let strategy = self.build_strategy(kind, &params)?;
        let data =
            HistoricDataHandler::with_window(Arc::clone(&self.data), backtest.start, backtest.end);
        let portfolio = NaivePortfolio::new(&backtest.symbols, backtest.portfolio_settings());

        let report = Backtest::new(
            backtest.dispatcher_config(),
            Box::new(data),
            strategy,
            Box::new(portfolio),
            Box::new(SimulatedExecutionHandler::new()),
        )
        .run()?;

        let mut fields = params.columns();
        fields.extend(summary_fields(&report.summary)?);
        Ok(RunOutcome {
            index,
            params,
            report,
            fields,
        })
    }

    fn build_strategy(
        &self,
        kind: StrategyKind,
        params: &StrategyParams,
    ) -> Result<Box<dyn Strategy>, RunError> {
        let symbols = &self.config.backtest.symbols;
        kind.check_symbols(symbols)?;

        let strategy: Box<dyn Strategy> = match *params {
            StrategyParams::Pairs(p) => {
                Box::new(PairsMeanReversion::new(symbols[0].as_str(), symbols[1].as_str(), p))
            }
            StrategyParams::MovingAverage {
                short_window,
                long_window,
            } => Box::new(MovingAverageCross::new(
                symbols.clone(),
                short_window,
                long_window,
            )?),
            StrategyParams::Classifier { reg_param } => {
                let symbol = &symbols[0];
                let replay_start = self.config.backtest.start.ok_or(ConfigError::MissingSetting {
                    kind,
                    field: "start",
                })?;
                let history = self
                    .data
                    .bars(symbol)
                    .ok_or_else(|| ComponentError::UnknownSymbol(symbol.clone()))?;
                let training_start = self.config.backtest.training_start;
                let history: Vec<_> = history
                    .iter()
                    .filter(|b| training_start.map_or(true, |t| b.timestamp >= t))
                    .cloned()
                    .collect();
                let model = train_forecast_model(&history, replay_start, reg_param)?;
                Box::new(ClassifierForecast::new(symbol.as_str(), Box::new(model)))
            }
        };
        Ok(strategy)
    }

    /// Run every configuration, appending rows to the configured output file.
    pub fn run(&self) -> Result<SweepSummary, SweepError> {
        let output = self.config.sweep.output.clone();
        let sink = OrderedCsvSink::append(&output)?;
        let mut summary = self.run_into(&sink)?;
        sink.finish()?;
        summary.output = output;
        Ok(summary)
    }

    /// Run every configuration into an existing sink.
    pub fn run_into<W: std::io::Write + Send>(
        &self,
        sink: &OrderedCsvSink<W>,
    ) -> Result<SweepSummary, SweepError> {
        let total = self.rows.len();
        let policy = self.config.sweep.on_failure;
        let kind = self.config.strategy.kind;
        info!(%kind, total, parallel = self.parallel, "sweep start");

        let job = |(index, row): (usize, &ParamRow)| -> Result<JobResult, SweepError> {
            info!("strategy {} out of {}", index + 1, total);
            match self.run_one(index, row) {
                Ok(outcome) => {
                    info!(
                        index,
                        signals = outcome.report.dispatch.signals,
                        orders = outcome.report.dispatch.orders,
                        fills = outcome.report.dispatch.fills,
                        "configuration finished"
                    );
                    sink.submit(index, outcome.fields)?;
                    Ok(None)
                }
                Err(err) if policy == FailurePolicy::Isolate => {
                    warn!(index, error = %err, "configuration failed, continuing");
                    sink.submit(index, failure_fields(raw_columns(kind, row)))?;
                    Ok(Some((index, err.to_string())))
                }
                Err(err) => Err(SweepError::Aborted { index, source: err }),
            }
        };

        let mut failed: Vec<(usize, String)> = if self.parallel {
            self.rows
                .par_iter()
                .enumerate()
                .map(job)
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .flatten()
                .collect()
        } else {
            self.rows
                .iter()
                .enumerate()
                .map(job)
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .flatten()
                .collect()
        };
        failed.sort_by_key(|(i, _)| *i);

        let summary = SweepSummary {
            total,
            succeeded: total - failed.len(),
            failed,
            output: PathBuf::new(),
        };
        info!(
            total,
            succeeded = summary.succeeded,
            failed = summary.failed.len(),
            "sweep finished"
        );
        Ok(summary)
    }
}
