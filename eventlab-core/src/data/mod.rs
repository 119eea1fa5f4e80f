//! Market data: the replay source consumed by the dispatcher and strategies.
//!
//! The [`DataHandler`] trait is the contract the rest of the engine relies on.
//! [`HistoricDataHandler`] is an in-memory replay over a shared
//! [`MarketData`] fixture.

pub mod historic;

use chrono::NaiveDateTime;
use std::collections::BTreeMap;

use crate::domain::{Bar, BarField};
use crate::error::ComponentError;
use crate::queue::EventQueue;

pub use historic::HistoricDataHandler;

/// Source of bars for one run.
///
/// Only the bars released so far are visible through the lookback queries;
/// a handler never exposes data from a future tick.
pub trait DataHandler: Send {
    /// False once the replay is exhausted. Never flips back to true.
    fn continue_backtest(&self) -> bool;

    /// Advance the replay by one tick, pushing at most one `Market` event.
    fn update_bars(&mut self, queue: &mut EventQueue) -> Result<(), ComponentError>;

    /// The last `n` released values of `field` for `symbol`, oldest first.
    ///
    /// Returns `None` for an unknown symbol or when nothing has been released
    /// yet. The sequence may be shorter than `n` early in the replay.
    fn latest_bars_values(&self, symbol: &str, field: BarField, n: usize) -> Option<Vec<f64>>;

    /// Timestamps of the last `n` released bars for `symbol`, oldest first.
    ///
    /// Lines up element for element with [`DataHandler::latest_bars_values`].
    fn latest_bars_datetimes(&self, symbol: &str, n: usize) -> Option<Vec<NaiveDateTime>>;

    /// Timestamp of the most recently released bar for `symbol`.
    fn latest_bar_datetime(&self, symbol: &str) -> Option<NaiveDateTime>;

    /// Most recent value of `field` for `symbol`.
    fn latest_bar_value(&self, symbol: &str, field: BarField) -> Option<f64> {
        self.latest_bars_values(symbol, field, 1)
            .and_then(|values| values.last().copied())
    }
}

/// Immutable multi-symbol bar fixture, sorted by timestamp per symbol.
///
/// Shared read-only (behind `Arc`) by every configuration of a sweep.
#[derive(Debug, Clone, Default)]
pub struct MarketData {
    symbols: Vec<String>,
    bars: BTreeMap<String, Vec<Bar>>,
}

impl MarketData {
    /// Build from an unordered bag of bars. Symbol order follows first appearance.
    pub fn from_bars(bars: impl IntoIterator<Item = Bar>) -> Self {
        let mut data = Self::default();
        for bar in bars {
            data.insert(bar);
        }
        data.sort();
        data
    }

    /// Build from per-symbol series, keeping the given symbol order.
    pub fn from_series(series: Vec<(String, Vec<Bar>)>) -> Self {
        let mut data = Self::default();
        for (symbol, bars) in series {
            if !data.bars.contains_key(&symbol) {
                data.symbols.push(symbol.clone());
            }
            data.bars.entry(symbol).or_default().extend(bars);
        }
        data.sort();
        data
    }

    fn insert(&mut self, bar: Bar) {
        if !self.bars.contains_key(&bar.symbol) {
            self.symbols.push(bar.symbol.clone());
        }
        self.bars.entry(bar.symbol.clone()).or_default().push(bar);
    }

    fn sort(&mut self) {
        for series in self.bars.values_mut() {
            series.sort_by_key(|b| b.timestamp);
        }
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn bars(&self, symbol: &str) -> Option<&[Bar]> {
        self.bars.get(symbol).map(|v| v.as_slice())
    }

    /// Restrict to a subset of symbols, in the requested order.
    pub fn select(&self, symbols: &[String]) -> Result<Self, ComponentError> {
        let mut series = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let bars = self
                .bars
                .get(symbol)
                .ok_or_else(|| ComponentError::UnknownSymbol(symbol.clone()))?;
            series.push((symbol.clone(), bars.clone()));
        }
        Ok(Self::from_series(series))
    }

    pub fn is_empty(&self) -> bool {
        self.bars.values().all(|v| v.is_empty())
    }
}
