//! One configuration's complete component set.

use serde::{Deserialize, Serialize};

use super::dispatcher::{self, Consumers, DispatchError, DispatchStats, DispatcherConfig};
use crate::data::DataHandler;
use crate::error::ComponentError;
use crate::execution::ExecutionHandler;
use crate::portfolio::Portfolio;
use crate::queue::EventQueue;
use crate::strategy::Strategy;

/// Result of a finished backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub strategy: String,
    /// Labelled summary statistics, in the portfolio's reporting order.
    pub summary: Vec<(String, String)>,
    pub dispatch: DispatchStats,
}

/// Owns a fresh queue and one instance of every component.
///
/// Built once per configuration and consumed by [`Backtest::run`], so no
/// state leaks from one run into the next.
pub struct Backtest {
    config: DispatcherConfig,
    queue: EventQueue,
    data: Box<dyn DataHandler>,
    strategy: Box<dyn Strategy>,
    portfolio: Box<dyn Portfolio>,
    execution: Box<dyn ExecutionHandler>,
}

impl Backtest {
    pub fn new(
        config: DispatcherConfig,
        data: Box<dyn DataHandler>,
        strategy: Box<dyn Strategy>,
        portfolio: Box<dyn Portfolio>,
        execution: Box<dyn ExecutionHandler>,
    ) -> Self {
        Self {
            config,
            queue: EventQueue::new(),
            data,
            strategy,
            portfolio,
            execution,
        }
    }

    /// Replay to exhaustion, then build the equity curve and summary.
    pub fn run(mut self) -> Result<BacktestReport, DispatchError> {
        let dispatch = dispatcher::run(
            &self.config,
            &mut self.queue,
            Consumers {
                data: self.data.as_mut(),
                strategy: self.strategy.as_mut(),
                portfolio: Some(self.portfolio.as_mut()),
                execution: Some(self.execution.as_mut()),
            },
        )?;

        let stats_err = |source: ComponentError| DispatchError::Component {
            component: "portfolio",
            source,
        };
        self.portfolio.create_equity_curve().map_err(stats_err)?;
        let summary = self.portfolio.output_summary_stats().map_err(stats_err)?;

        Ok(BacktestReport {
            strategy: self.strategy.name().to_string(),
            summary,
            dispatch,
        })
    }
}
