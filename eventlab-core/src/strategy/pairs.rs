//! Pairs mean reversion on the z-score of an OLS spread.
//!
//! Each bar the hedge ratio of leg A on leg B is re-estimated over a rolling
//! window, the spread `A - β·B` is standardized, and the latest z-score is
//! run through the entry/exit thresholds:
//!
//! | condition                 | state | action                              |
//! |---------------------------|-------|-------------------------------------|
//! | `z <= -high`              | flat  | A LONG 1.0, B SHORT \|β\| → long    |
//! | `\|z\| <= low`            | long  | exit both → flat                    |
//! | `z >= high`               | flat  | A SHORT 1.0, B LONG \|β\| → short   |
//! | `\|z\| <= low`            | short | exit both → flat                    |
//!
//! The four rules are checked in that order on every bar, each against the
//! state left by the previous rule; when more than one matches, the last
//! matching rule's signal pair is the one emitted.
//!
//! Legs are paired on timestamp. A bar is only evaluated when the latest
//! `window` bars of both legs fall on the same timestamps; while a bar is
//! missing from either leg inside the window, the strategy stays quiet.

use chrono::NaiveDateTime;
use tracing::debug;

use super::{Strategy, StrategyError};
use crate::data::DataHandler;
use crate::domain::BarField;
use crate::event::{EventError, MarketEvent, SignalDirection, SignalEvent};
use crate::model::hedge_ratio;
use crate::queue::EventQueue;
use crate::stats::{max_abs, zscore_last};

/// Market state of the pair.
///
/// Long and short are variants of one enum, so the pair can never be long
/// and short at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PairState {
    #[default]
    Flat,
    /// Long the spread: long leg A, short leg B.
    Long,
    /// Short the spread: short leg A, long leg B.
    Short,
}

/// Validated thresholds and window for [`PairsMeanReversion`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairsParams {
    pub window: usize,
    pub zscore_high: f64,
    pub zscore_low: f64,
}

impl PairsParams {
    pub fn new(window: usize, zscore_high: f64, zscore_low: f64) -> Result<Self, StrategyError> {
        if window == 0 {
            return Err(StrategyError::InvalidParams("window must be > 0".into()));
        }
        if !(zscore_low.is_finite() && zscore_low >= 0.0) {
            return Err(StrategyError::InvalidParams(format!(
                "exit threshold must be >= 0, got {zscore_low}"
            )));
        }
        if !(zscore_high.is_finite() && zscore_high > zscore_low) {
            return Err(StrategyError::InvalidParams(format!(
                "entry threshold {zscore_high} must exceed exit threshold {zscore_low}"
            )));
        }
        Ok(Self {
            window,
            zscore_high,
            zscore_low,
        })
    }
}

/// Pairs mean-reversion strategy over a fixed `(A, B)` pair.
#[derive(Debug, Clone)]
pub struct PairsMeanReversion {
    pair: (String, String),
    params: PairsParams,
    state: PairState,
}

impl PairsMeanReversion {
    pub fn new(leg_a: impl Into<String>, leg_b: impl Into<String>, params: PairsParams) -> Self {
        Self {
            pair: (leg_a.into(), leg_b.into()),
            params,
            state: PairState::Flat,
        }
    }

    pub fn state(&self) -> PairState {
        self.state
    }

    pub fn long_market(&self) -> bool {
        self.state == PairState::Long
    }

    pub fn short_market(&self) -> bool {
        self.state == PairState::Short
    }

    /// Apply the threshold rules to `z`, returning the signal pair to emit.
    fn apply_rules(
        &mut self,
        z: f64,
        timestamp: NaiveDateTime,
        hedge_ratio: f64,
    ) -> Result<Option<[SignalEvent; 2]>, EventError> {
        let PairsParams {
            zscore_high,
            zscore_low,
            ..
        } = self.params;
        let mut signals = None;

        if z <= -zscore_high && self.state == PairState::Flat {
            signals = Some(self.entry_pair(SignalDirection::Long, timestamp, hedge_ratio)?);
            self.state = PairState::Long;
        }
        if z.abs() <= zscore_low && self.state == PairState::Long {
            self.state = PairState::Flat;
            signals = Some(self.exit_pair(timestamp));
        }
        if z >= zscore_high && self.state == PairState::Flat {
            signals = Some(self.entry_pair(SignalDirection::Short, timestamp, hedge_ratio)?);
            self.state = PairState::Short;
        }
        if z.abs() <= zscore_low && self.state == PairState::Short {
            self.state = PairState::Flat;
            signals = Some(self.exit_pair(timestamp));
        }

        Ok(signals)
    }

    fn entry_pair(
        &self,
        leg_a: SignalDirection,
        timestamp: NaiveDateTime,
        hedge_ratio: f64,
    ) -> Result<[SignalEvent; 2], EventError> {
        let leg_b = match leg_a {
            SignalDirection::Long => SignalDirection::Short,
            _ => SignalDirection::Long,
        };
        let hr = hedge_ratio.abs();
        Ok([
            SignalEvent::new(self.pair.0.as_str(), timestamp, leg_a, 1.0, 1.0)?,
            SignalEvent::new(self.pair.1.as_str(), timestamp, leg_b, hr, hr)?,
        ])
    }

    fn exit_pair(&self, timestamp: NaiveDateTime) -> [SignalEvent; 2] {
        [
            SignalEvent::primary(self.pair.0.as_str(), timestamp, SignalDirection::Exit),
            SignalEvent::primary(self.pair.1.as_str(), timestamp, SignalDirection::Exit),
        ]
    }
}

impl Strategy for PairsMeanReversion {
    fn name(&self) -> &str {
        "pairs_mean_reversion"
    }

    fn calculate_signals(
        &mut self,
        event: &MarketEvent,
        bars: &dyn DataHandler,
        queue: &mut EventQueue,
    ) -> Result<(), StrategyError> {
        let Some((y, x)) = aligned_closes(bars, &self.pair.0, &self.pair.1, self.params.window)
        else {
            return Ok(());
        };

        let beta = hedge_ratio(&y, &x)?;
        let spread: Vec<f64> = y.iter().zip(&x).map(|(a, b)| a - beta * b).collect();
        let scale = max_abs(&y).max(beta.abs() * max_abs(&x));
        let Some(z) = zscore_last(&spread, scale) else {
            return Ok(());
        };

        if let Some(signals) = self.apply_rules(z, event.timestamp, beta)? {
            debug!(
                z,
                hedge_ratio = beta,
                state = ?self.state,
                leg_a = %signals[0].direction(),
                "pair signal"
            );
            for signal in signals {
                queue.push(signal);
            }
        }
        Ok(())
    }
}

/// The last `n` adjusted closes of both legs, oldest first.
///
/// `None` until both legs have `n` released bars on identical timestamps.
fn aligned_closes(
    bars: &dyn DataHandler,
    leg_a: &str,
    leg_b: &str,
    n: usize,
) -> Option<(Vec<f64>, Vec<f64>)> {
    let y = bars.latest_bars_values(leg_a, BarField::AdjClose, n)?;
    let x = bars.latest_bars_values(leg_b, BarField::AdjClose, n)?;
    if y.len() < n || x.len() < n {
        return None;
    }
    if bars.latest_bars_datetimes(leg_a, n)? != bars.latest_bars_datetimes(leg_b, n)? {
        debug!(leg_a, leg_b, "legs not aligned on timestamp, skipping bar");
        return None;
    }
    Some((y, x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{HistoricDataHandler, MarketData};
    use crate::domain::Bar;
    use chrono::{Duration, NaiveDate};
    use std::sync::Arc;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 10, 8)
            .unwrap()
            .and_hms_opt(10, 41, 0)
            .unwrap()
    }

    fn strategy() -> PairsMeanReversion {
        PairsMeanReversion::new("AAPL", "GOOG", PairsParams::new(100, 3.0, 0.5).unwrap())
    }

    #[test]
    fn params_reject_inverted_thresholds() {
        assert!(PairsParams::new(100, 0.5, 3.0).is_err());
        assert!(PairsParams::new(100, 2.0, 2.0).is_err());
        assert!(PairsParams::new(100, 2.0, -0.1).is_err());
        assert!(PairsParams::new(0, 2.0, 0.5).is_err());
        assert!(PairsParams::new(100, 2.0, 0.0).is_ok());
    }

    #[test]
    fn low_z_enters_long_spread() {
        let mut s = strategy();
        let signals = s.apply_rules(-3.5, ts(), -0.8).unwrap().unwrap();
        assert_eq!(s.state(), PairState::Long);

        assert_eq!(signals[0].symbol(), "AAPL");
        assert_eq!(signals[0].direction(), SignalDirection::Long);
        assert_eq!(signals[0].strength(), 1.0);
        assert_eq!(signals[1].symbol(), "GOOG");
        assert_eq!(signals[1].direction(), SignalDirection::Short);
        assert_eq!(signals[1].strength(), 0.8);
        assert_eq!(signals[1].target_hedge_ratio(), 0.8);
    }

    #[test]
    fn high_z_enters_short_spread() {
        let mut s = strategy();
        let signals = s.apply_rules(3.0, ts(), 1.25).unwrap().unwrap();
        assert_eq!(s.state(), PairState::Short);
        assert_eq!(signals[0].direction(), SignalDirection::Short);
        assert_eq!(signals[1].direction(), SignalDirection::Long);
        assert_eq!(signals[1].strength(), 1.25);
    }

    #[test]
    fn exit_band_flattens_long_and_short() {
        let mut s = strategy();
        s.apply_rules(-4.0, ts(), 1.0).unwrap();
        let exits = s.apply_rules(0.2, ts(), 1.0).unwrap().unwrap();
        assert_eq!(s.state(), PairState::Flat);
        assert!(exits
            .iter()
            .all(|e| e.direction() == SignalDirection::Exit && e.strength() == 1.0));

        s.apply_rules(4.0, ts(), 1.0).unwrap();
        assert!(s.short_market());
        s.apply_rules(-0.5, ts(), 1.0).unwrap().unwrap();
        assert_eq!(s.state(), PairState::Flat);
    }

    #[test]
    fn no_repeat_entry_while_in_market() {
        let mut s = strategy();
        assert!(s.apply_rules(-3.5, ts(), 1.0).unwrap().is_some());
        assert!(s.apply_rules(-5.0, ts(), 1.0).unwrap().is_none());
        // An opposite extreme does not flip long into short.
        assert!(s.apply_rules(4.0, ts(), 1.0).unwrap().is_none());
        assert!(s.long_market() && !s.short_market());
    }

    #[test]
    fn between_bands_is_quiet() {
        let mut s = strategy();
        assert!(s.apply_rules(1.5, ts(), 1.0).unwrap().is_none());
        assert!(s.apply_rules(-2.9, ts(), 1.0).unwrap().is_none());
        assert_eq!(s.state(), PairState::Flat);
    }

    #[test]
    fn zero_hedge_ratio_entry_is_an_error() {
        let mut s = strategy();
        assert_eq!(
            s.apply_rules(-3.5, ts(), 0.0).unwrap_err(),
            EventError::InvalidHedgeRatio(0.0)
        );
        assert_eq!(s.state(), PairState::Flat);
    }

    fn bar(symbol: &str, day: i64, close: f64) -> Bar {
        Bar {
            symbol: symbol.into(),
            timestamp: ts() + Duration::days(day),
            open: close,
            high: close,
            low: close,
            close,
            adj_close: close,
            volume: 1_000,
        }
    }

    /// AAPL trades days 0..10, GOOG skips day 5.
    fn gapped_handler(ticks: usize) -> HistoricDataHandler {
        let mut bars: Vec<Bar> = (0..10).map(|d| bar("AAPL", d, 100.0 + d as f64)).collect();
        bars.extend((0..10).filter(|d| *d != 5).map(|d| bar("GOOG", d, 50.0 + d as f64)));
        let mut handler = HistoricDataHandler::new(Arc::new(MarketData::from_bars(bars)));
        let mut queue = EventQueue::new();
        for _ in 0..ticks {
            handler.update_bars(&mut queue).unwrap();
        }
        handler
    }

    #[test]
    fn legs_pair_on_timestamp() {
        // Day 5 missing from GOOG: a window spanning it is never evaluated.
        let handler = gapped_handler(7);
        assert!(aligned_closes(&handler, "AAPL", "GOOG", 2).is_none());

        let handler = gapped_handler(10);
        assert!(aligned_closes(&handler, "AAPL", "GOOG", 6).is_none());
        let (y, x) = aligned_closes(&handler, "AAPL", "GOOG", 3).unwrap();
        assert_eq!(y, vec![107.0, 108.0, 109.0]);
        assert_eq!(x, vec![57.0, 58.0, 59.0]);
    }
}
