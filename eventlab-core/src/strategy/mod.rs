//! Strategies — consume `Market` events, emit `Signal` events.
//!
//! Every strategy owns its trade state exclusively. A new instance is built
//! for each sweep configuration and dropped when the run ends, so nothing
//! carries over between configurations.

pub mod forecast;
pub mod ma_cross;
pub mod pairs;

use thiserror::Error;

use crate::data::DataHandler;
use crate::event::{EventError, MarketEvent};
use crate::model::ModelError;
use crate::queue::EventQueue;

pub use forecast::ClassifierForecast;
pub use ma_cross::{MovingAverageCross, PositionFlag};
pub use pairs::{PairState, PairsMeanReversion, PairsParams};

/// Errors raised while generating signals.
#[derive(Debug, Error, PartialEq)]
pub enum StrategyError {
    #[error("model fit failed: {0}")]
    Model(#[from] ModelError),
    #[error("invalid signal: {0}")]
    Signal(#[from] EventError),
    #[error("invalid strategy parameters: {0}")]
    InvalidParams(String),
}

/// Signal generator driven by the dispatcher.
///
/// The dispatcher only ever sees this trait. Implementations read history
/// through `bars` and push any signals they produce onto `queue`.
pub trait Strategy: Send {
    /// Human-readable name (e.g. "pairs_mean_reversion").
    fn name(&self) -> &str;

    fn calculate_signals(
        &mut self,
        event: &MarketEvent,
        bars: &dyn DataHandler,
        queue: &mut EventQueue,
    ) -> Result<(), StrategyError>;
}
