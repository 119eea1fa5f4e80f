//! In-memory historic replay.

use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{DataHandler, MarketData};
use crate::domain::{Bar, BarField};
use crate::error::ComponentError;
use crate::event::MarketEvent;
use crate::queue::EventQueue;

/// Replays a [`MarketData`] fixture one timestamp at a time.
///
/// The timeline is the sorted union of every symbol's bar timestamps inside
/// the optional `[start, end]` window. Each tick releases all bars stamped at
/// the next timeline entry and pushes a single `Market` event.
#[derive(Debug)]
pub struct HistoricDataHandler {
    data: Arc<MarketData>,
    symbols: Vec<String>,
    timeline: Vec<NaiveDateTime>,
    cursor: usize,
    /// Per symbol: `[first, released)` index range into the fixture series.
    released: HashMap<String, (usize, usize)>,
    continue_backtest: bool,
}

impl HistoricDataHandler {
    pub fn new(data: Arc<MarketData>) -> Self {
        Self::with_window(data, None, None)
    }

    pub fn with_window(
        data: Arc<MarketData>,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Self {
        let in_window = |ts: &NaiveDateTime| {
            start.map_or(true, |s| *ts >= s) && end.map_or(true, |e| *ts <= e)
        };

        let symbols = data.symbols().to_vec();
        let mut timeline = Vec::new();
        let mut released = HashMap::with_capacity(symbols.len());

        for symbol in &symbols {
            let bars = data.bars(symbol).unwrap_or_default();
            timeline.extend(bars.iter().map(|b| b.timestamp).filter(|ts| in_window(ts)));
            let first = start.map_or(0, |s| bars.partition_point(|b| b.timestamp < s));
            released.insert(symbol.clone(), (first, first));
        }
        timeline.sort_unstable();
        timeline.dedup();

        Self {
            data,
            symbols,
            timeline,
            cursor: 0,
            released,
            continue_backtest: true,
        }
    }

    /// Number of ticks that will emit a `Market` event.
    pub fn tick_count(&self) -> usize {
        self.timeline.len()
    }
}

impl HistoricDataHandler {
    fn released_bars(&self, symbol: &str) -> Option<&[Bar]> {
        let &(first, released) = self.released.get(symbol)?;
        if released == first {
            return None;
        }
        self.data.bars(symbol)?.get(first..released)
    }
}

impl DataHandler for HistoricDataHandler {
    fn continue_backtest(&self) -> bool {
        self.continue_backtest
    }

    fn update_bars(&mut self, queue: &mut EventQueue) -> Result<(), ComponentError> {
        let Some(&timestamp) = self.timeline.get(self.cursor) else {
            if self.continue_backtest {
                debug!(ticks = self.cursor, "replay exhausted");
            }
            self.continue_backtest = false;
            return Ok(());
        };
        self.cursor += 1;

        for symbol in &self.symbols {
            let bars = self
                .data
                .bars(symbol)
                .ok_or_else(|| ComponentError::UnknownSymbol(symbol.clone()))?;
            let range = self
                .released
                .get_mut(symbol)
                .ok_or_else(|| ComponentError::UnknownSymbol(symbol.clone()))?;
            while range.1 < bars.len() && bars[range.1].timestamp <= timestamp {
                range.1 += 1;
            }
        }

        queue.push(MarketEvent { timestamp });
        Ok(())
    }

    fn latest_bars_values(&self, symbol: &str, field: BarField, n: usize) -> Option<Vec<f64>> {
        let bars = self.released_bars(symbol)?;
        let skip = bars.len().saturating_sub(n);
        Some(bars[skip..].iter().map(|b| b.field(field)).collect())
    }

    fn latest_bars_datetimes(&self, symbol: &str, n: usize) -> Option<Vec<NaiveDateTime>> {
        let bars = self.released_bars(symbol)?;
        let skip = bars.len().saturating_sub(n);
        Some(bars[skip..].iter().map(|b| b.timestamp).collect())
    }

    fn latest_bar_datetime(&self, symbol: &str) -> Option<NaiveDateTime> {
        self.released_bars(symbol)?.last().map(|b| b.timestamp)
    }
}
