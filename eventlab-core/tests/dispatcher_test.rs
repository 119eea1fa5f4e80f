//! Dispatcher integration tests: routing, causal ordering and end-to-end
//! runs with the reference collaborators.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::sync::Arc;

use eventlab_core::data::{DataHandler, HistoricDataHandler, MarketData};
use eventlab_core::domain::Bar;
use eventlab_core::engine::{self, Backtest, Consumers, DispatchError, DispatcherConfig};
use eventlab_core::event::{EventKind, MarketEvent, SignalDirection, SignalEvent};
use eventlab_core::execution::SimulatedExecutionHandler;
use eventlab_core::portfolio::{NaivePortfolio, PortfolioSettings};
use eventlab_core::queue::EventQueue;
use eventlab_core::strategy::{
    MovingAverageCross, PairsMeanReversion, PairsParams, Strategy, StrategyError,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2020, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn series(symbol: &str, closes: impl IntoIterator<Item = f64>) -> Vec<Bar> {
    closes
        .into_iter()
        .enumerate()
        .map(|(i, c)| Bar {
            symbol: symbol.into(),
            timestamp: t0() + Duration::days(i as i64),
            open: c,
            high: c,
            low: c,
            close: c,
            adj_close: c,
            volume: 1_000,
        })
        .collect()
}

fn fixture(legs: Vec<(&str, Vec<f64>)>) -> Arc<MarketData> {
    Arc::new(MarketData::from_series(
        legs.into_iter()
            .map(|(s, closes)| (s.to_string(), series(s, closes)))
            .collect(),
    ))
}

fn recording() -> DispatcherConfig {
    DispatcherConfig {
        record_events: true,
        ..DispatcherConfig::default()
    }
}

fn backtest(data: Arc<MarketData>, strategy: Box<dyn Strategy>) -> Backtest {
    let symbols = data.symbols().to_vec();
    Backtest::new(
        recording(),
        Box::new(HistoricDataHandler::new(data)),
        strategy,
        Box::new(NaivePortfolio::new(&symbols, PortfolioSettings::default())),
        Box::new(SimulatedExecutionHandler::new()),
    )
}

/// Emits a LONG then an EXIT on alternating market events.
struct Flipper {
    long: bool,
}

impl Strategy for Flipper {
    fn name(&self) -> &str {
        "flipper"
    }

    fn calculate_signals(
        &mut self,
        event: &MarketEvent,
        _bars: &dyn DataHandler,
        queue: &mut EventQueue,
    ) -> Result<(), StrategyError> {
        let direction = if self.long {
            SignalDirection::Exit
        } else {
            SignalDirection::Long
        };
        self.long = !self.long;
        queue.push(SignalEvent::primary("SPY", event.timestamp, direction));
        Ok(())
    }
}

// ── Causal ordering ──────────────────────────────────────────────────

#[test]
fn every_derived_event_follows_its_market_event() {
    let data = fixture(vec![("SPY", (0..40).map(|i| 100.0 + i as f64).collect())]);
    let report = backtest(data, Box::new(Flipper { long: false })).run().unwrap();

    let log = report.dispatch.event_log.unwrap();
    assert_eq!(report.dispatch.markets, 40);
    assert_eq!(report.dispatch.signals, 40);
    assert_eq!(report.dispatch.orders, 40);
    assert_eq!(report.dispatch.fills, 40);

    // Within each tick: one MARKET first, then SIGNAL → ORDER → FILL.
    for tick in 0..40u64 {
        let kinds: Vec<EventKind> = log
            .iter()
            .filter(|(t, _)| *t == tick)
            .map(|(_, k)| *k)
            .collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::Market,
                EventKind::Signal,
                EventKind::Order,
                EventKind::Fill
            ],
            "tick {tick}"
        );
    }
}

#[test]
fn order_without_execution_handler_is_unrouted() {
    let data = fixture(vec![("SPY", vec![10.0, 11.0, 12.0])]);
    let symbols = data.symbols().to_vec();
    let mut handler = HistoricDataHandler::new(data);
    let mut strategy = Flipper { long: false };
    let mut portfolio = NaivePortfolio::new(&symbols, PortfolioSettings::default());
    let mut queue = EventQueue::new();

    let err = engine::run(
        &DispatcherConfig::default(),
        &mut queue,
        Consumers {
            data: &mut handler,
            strategy: &mut strategy,
            portfolio: Some(&mut portfolio),
            execution: None,
        },
    )
    .unwrap_err();
    assert!(matches!(err, DispatchError::Unrouted(EventKind::Order)));
}

// ── Strategy scenarios ───────────────────────────────────────────────

/// Runs an MA cross over 1..=500 and returns (signal ticks, fills, AAPL position).
fn run_monotonic_ma(short: usize, long: usize) -> (Vec<u64>, u64, Option<i64>) {
    let data = fixture(vec![("AAPL", (1..=500).map(f64::from).collect())]);
    let mut strategy = MovingAverageCross::new(vec!["AAPL".into()], short, long).unwrap();

    let symbols = data.symbols().to_vec();
    let mut handler = HistoricDataHandler::new(data);
    let mut portfolio = NaivePortfolio::new(&symbols, PortfolioSettings::default());
    let mut execution = SimulatedExecutionHandler::new();
    let mut queue = EventQueue::new();

    let stats = engine::run(
        &recording(),
        &mut queue,
        Consumers {
            data: &mut handler,
            strategy: &mut strategy,
            portfolio: Some(&mut portfolio),
            execution: Some(&mut execution),
        },
    )
    .unwrap();

    let signal_ticks = stats
        .event_log
        .unwrap()
        .into_iter()
        .filter(|(_, k)| *k == EventKind::Signal)
        .map(|(t, _)| t)
        .collect();
    (signal_ticks, stats.fills, portfolio.position("AAPL"))
}

#[test]
fn monotonic_prices_give_one_long_and_no_exit() {
    // While history fits inside the short window both means are equal, and
    // ties never count as a cross: the first LONG needs 11 bars.
    let (ticks, fills, position) = run_monotonic_ma(10, 50);
    assert_eq!(ticks, vec![10]);
    assert_eq!(fills, 1);
    assert_eq!(position, Some(100));
}

#[test]
fn short_windows_cross_once_on_monotonic_prices() {
    // At 6 bars the short mean is 4.0 against 3.5 for the long one.
    let (ticks, fills, position) = run_monotonic_ma(5, 20);
    assert_eq!(ticks, vec![5]);
    assert_eq!(fills, 1);
    assert_eq!(position, Some(100));
}

#[test]
fn identical_prices_never_signal() {
    let data = fixture(vec![("AAPL", vec![50.0; 300]), ("GOOG", vec![25.0; 300])]);
    let params = PairsParams::new(100, 3.0, 0.5).unwrap();
    let report = backtest(data, Box::new(PairsMeanReversion::new("AAPL", "GOOG", params)))
        .run()
        .unwrap();

    assert_eq!(report.dispatch.signals, 0);
    assert_eq!(report.dispatch.orders, 0);
    assert_eq!(report.summary[0], ("Total Return".into(), "0.00%".into()));
    assert_eq!(report.summary[1], ("Sharpe Ratio".into(), "0.00".into()));
}

#[test]
fn exactly_hedged_pair_at_large_prices_never_signals() {
    // A moves in exact proportion to B, so the spread is rounding noise.
    let b: Vec<f64> = (0..400)
        .map(|i| 1e5 + 500.0 * (i as f64 * 0.37).sin() + i as f64 * 3.1)
        .collect();
    let a: Vec<f64> = b.iter().map(|x| 1.7 * x).collect();
    let data = fixture(vec![("AAPL", a), ("GOOG", b)]);
    let params = PairsParams::new(30, 2.0, 0.5).unwrap();
    let report = backtest(data, Box::new(PairsMeanReversion::new("AAPL", "GOOG", params)))
        .run()
        .unwrap();

    assert_eq!(report.dispatch.markets, 400);
    assert_eq!(report.dispatch.signals, 0);
    assert_eq!(report.dispatch.orders, 0);
}

#[test]
fn short_history_is_a_no_op_for_pairs() {
    // Fewer bars than the window: the strategy never has a full lookback.
    let data = fixture(vec![
        ("AAPL", (0..50).map(|i| 100.0 + (i as f64).sin()).collect()),
        ("GOOG", (0..50).map(|i| 50.0 + (i as f64).cos()).collect()),
    ]);
    let params = PairsParams::new(100, 0.5, 0.1).unwrap();
    let report = backtest(data, Box::new(PairsMeanReversion::new("AAPL", "GOOG", params)))
        .run()
        .unwrap();
    assert_eq!(report.dispatch.markets, 50);
    assert_eq!(report.dispatch.signals, 0);
}

#[test]
fn diverging_spread_trades_both_legs() {
    // Leg A tracks leg B until the end, where it drops sharply.
    let b: Vec<f64> = (0..120).map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0).collect();
    let mut a: Vec<f64> = b
        .iter()
        .enumerate()
        .map(|(i, x)| 2.0 * x + (i % 3) as f64 * 0.1)
        .collect();
    for v in a.iter_mut().skip(110) {
        *v -= 40.0;
    }
    let data = fixture(vec![("AAPL", a), ("GOOG", b)]);
    let params = PairsParams::new(30, 2.0, 0.5).unwrap();
    let report = backtest(data, Box::new(PairsMeanReversion::new("AAPL", "GOOG", params)))
        .run()
        .unwrap();

    assert!(report.dispatch.signals >= 2);
    assert_eq!(report.dispatch.signals % 2, 0);
    assert_eq!(report.dispatch.orders, report.dispatch.fills);
    assert_eq!(report.strategy, "pairs_mean_reversion");
}
