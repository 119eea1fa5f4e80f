//! Moving average crossover: long while the short SMA is above the long SMA.
//!
//! Each symbol runs its own two-state machine. Entry fires when the short
//! mean rises above the long mean while out of the market; exit fires when it
//! falls below while long. Ties never trigger.
//!
//! Unlike the pairs strategy, a full `long_window` of history is not required:
//! any released history is enough, with both means taken over what exists.

use std::collections::HashMap;
use tracing::debug;

use super::{Strategy, StrategyError};
use crate::data::DataHandler;
use crate::domain::BarField;
use crate::event::{MarketEvent, SignalDirection, SignalEvent};
use crate::queue::EventQueue;
use crate::stats::mean;

/// Per-symbol position flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositionFlag {
    #[default]
    Out,
    Long,
}

#[derive(Debug, Clone)]
pub struct MovingAverageCross {
    symbols: Vec<String>,
    short_window: usize,
    long_window: usize,
    positions: HashMap<String, PositionFlag>,
}

impl MovingAverageCross {
    pub fn new(
        symbols: Vec<String>,
        short_window: usize,
        long_window: usize,
    ) -> Result<Self, StrategyError> {
        if short_window == 0 {
            return Err(StrategyError::InvalidParams(
                "short_window must be > 0".into(),
            ));
        }
        if long_window <= short_window {
            return Err(StrategyError::InvalidParams(format!(
                "long_window {long_window} must exceed short_window {short_window}"
            )));
        }
        let positions = symbols
            .iter()
            .map(|s| (s.clone(), PositionFlag::Out))
            .collect();
        Ok(Self {
            symbols,
            short_window,
            long_window,
            positions,
        })
    }

    pub fn position(&self, symbol: &str) -> Option<PositionFlag> {
        self.positions.get(symbol).copied()
    }
}

impl Strategy for MovingAverageCross {
    fn name(&self) -> &str {
        "moving_average_cross"
    }

    fn calculate_signals(
        &mut self,
        event: &MarketEvent,
        bars: &dyn DataHandler,
        queue: &mut EventQueue,
    ) -> Result<(), StrategyError> {
        for symbol in &self.symbols {
            let Some(closes) = bars.latest_bars_values(symbol, BarField::AdjClose, self.long_window)
            else {
                continue;
            };
            if closes.is_empty() {
                continue;
            }

            let short_start = closes.len().saturating_sub(self.short_window);
            let short_sma = mean(&closes[short_start..]);
            let long_sma = mean(&closes);

            let flag = self.positions.entry(symbol.clone()).or_default();
            let direction = match *flag {
                PositionFlag::Out if short_sma > long_sma => {
                    *flag = PositionFlag::Long;
                    SignalDirection::Long
                }
                PositionFlag::Long if short_sma < long_sma => {
                    *flag = PositionFlag::Out;
                    SignalDirection::Exit
                }
                _ => continue,
            };

            let timestamp = bars
                .latest_bar_datetime(symbol)
                .unwrap_or(event.timestamp);
            debug!(%symbol, %direction, short_sma, long_sma, %timestamp, "crossover signal");
            queue.push(SignalEvent::primary(symbol.as_str(), timestamp, direction));
        }
        Ok(())
    }
}
