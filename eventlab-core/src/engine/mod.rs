//! Engine — the dispatcher loop and the per-configuration backtest wrapper.

pub mod backtest;
pub mod dispatcher;

pub use backtest::{Backtest, BacktestReport};
pub use dispatcher::{run, Consumers, DispatchError, DispatchStats, DispatcherConfig};
