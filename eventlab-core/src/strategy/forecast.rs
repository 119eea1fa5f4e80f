//! Classifier forecast: go long when the model predicts an up move.
//!
//! The classifier is fitted offline (see `model::train_forecast_model`) and
//! injected at construction; the strategy never retrains it. Inference waits
//! until enough bars have been seen for both lag features to be defined.

use tracing::debug;

use super::{Strategy, StrategyError};
use crate::data::DataHandler;
use crate::domain::BarField;
use crate::event::{MarketEvent, SignalDirection, SignalEvent};
use crate::model::dataset::pct_return;
use crate::model::{DirectionClassifier, Movement};
use crate::queue::EventQueue;

/// Bars that must be observed before the first prediction.
pub const MIN_BARS_BEFORE_INFERENCE: usize = 6;

pub struct ClassifierForecast {
    symbol: String,
    model: Box<dyn DirectionClassifier>,
    long_market: bool,
    bars_seen: usize,
}

impl ClassifierForecast {
    pub fn new(symbol: impl Into<String>, model: Box<dyn DirectionClassifier>) -> Self {
        Self {
            symbol: symbol.into(),
            model,
            long_market: false,
            bars_seen: 0,
        }
    }

    pub fn long_market(&self) -> bool {
        self.long_market
    }

    pub fn bars_seen(&self) -> usize {
        self.bars_seen
    }
}

impl std::fmt::Debug for ClassifierForecast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierForecast")
            .field("symbol", &self.symbol)
            .field("long_market", &self.long_market)
            .field("bars_seen", &self.bars_seen)
            .finish_non_exhaustive()
    }
}

impl Strategy for ClassifierForecast {
    fn name(&self) -> &str {
        "classifier_forecast"
    }

    fn calculate_signals(
        &mut self,
        event: &MarketEvent,
        bars: &dyn DataHandler,
        queue: &mut EventQueue,
    ) -> Result<(), StrategyError> {
        self.bars_seen += 1;
        if self.bars_seen < MIN_BARS_BEFORE_INFERENCE {
            return Ok(());
        }

        let Some(closes) = bars.latest_bars_values(&self.symbol, BarField::AdjClose, 3) else {
            return Ok(());
        };
        if closes.len() < 3 {
            return Ok(());
        }

        // Lag1 is the most recent return, matching the training features.
        let lag1 = pct_return(closes[1], closes[2]);
        let lag2 = pct_return(closes[0], closes[1]);
        if !(lag1.is_finite() && lag2.is_finite()) {
            return Ok(());
        }

        let prediction = self.model.predict([lag1, lag2]);
        let direction = match prediction {
            Movement::Up if !self.long_market => {
                self.long_market = true;
                SignalDirection::Long
            }
            Movement::Down if self.long_market => {
                self.long_market = false;
                SignalDirection::Exit
            }
            _ => return Ok(()),
        };

        debug!(symbol = %self.symbol, %direction, lag1, lag2, "forecast signal");
        queue.push(SignalEvent::primary(
            self.symbol.as_str(),
            event.timestamp,
            direction,
        ));
        Ok(())
    }
}
