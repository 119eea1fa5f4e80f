//! The simulation loop.
//!
//! One tick = `update_bars()` followed by a full drain of the queue. Events
//! are routed by kind to the single consumer registered for it:
//!
//! - `Market` → strategy, then portfolio mark-to-market
//! - `Signal` → portfolio
//! - `Order`  → execution
//! - `Fill`   → portfolio
//!
//! Anything a consumer pushes while handling an event is drained in the same
//! tick, after the events already queued.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

use crate::data::DataHandler;
use crate::error::ComponentError;
use crate::event::{Event, EventKind};
use crate::execution::ExecutionHandler;
use crate::portfolio::Portfolio;
use crate::queue::EventQueue;
use crate::strategy::{Strategy, StrategyError};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no consumer registered for {0} events")]
    Unrouted(EventKind),

    #[error("strategy '{name}' failed: {source}")]
    Strategy {
        name: String,
        #[source]
        source: StrategyError,
    },

    #[error("{component} failed: {source}")]
    Component {
        component: &'static str,
        #[source]
        source: ComponentError,
    },

    #[error("deadline exceeded after {ticks} ticks ({elapsed:?})")]
    DeadlineExceeded { ticks: u64, elapsed: Duration },
}

impl DispatchError {
    fn component(component: &'static str) -> impl FnOnce(ComponentError) -> Self {
        move |source| DispatchError::Component { component, source }
    }
}

/// Loop pacing and instrumentation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Sleep between ticks. Zero for batch replay.
    pub heartbeat: Duration,
    /// Abort the run once this much wall-clock time has elapsed.
    pub deadline: Option<Duration>,
    /// Keep a `(tick, kind)` record of every dispatched event.
    pub record_events: bool,
}

/// The component set a run's events are routed to.
///
/// Portfolio and execution are optional so a strategy can be driven on its
/// own; a `Signal`, `Order` or `Fill` that then needs them is an error.
pub struct Consumers<'a> {
    pub data: &'a mut dyn DataHandler,
    pub strategy: &'a mut dyn Strategy,
    pub portfolio: Option<&'a mut dyn Portfolio>,
    pub execution: Option<&'a mut dyn ExecutionHandler>,
}

/// Counters gathered over one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub ticks: u64,
    pub markets: u64,
    pub signals: u64,
    pub orders: u64,
    pub fills: u64,
    /// Present only when `record_events` was set.
    pub event_log: Option<Vec<(u64, EventKind)>>,
}

impl DispatchStats {
    fn record(&mut self, tick: u64, kind: EventKind) {
        match kind {
            EventKind::Market => self.markets += 1,
            EventKind::Signal => self.signals += 1,
            EventKind::Order => self.orders += 1,
            EventKind::Fill => self.fills += 1,
        }
        if let Some(log) = self.event_log.as_mut() {
            log.push((tick, kind));
        }
    }
}

/// Run the replay to exhaustion.
///
/// Returns once the data handler stops reporting data and the queue is
/// empty. The first error from any consumer ends the run.
pub fn run(
    config: &DispatcherConfig,
    queue: &mut EventQueue,
    mut consumers: Consumers<'_>,
) -> Result<DispatchStats, DispatchError> {
    let started = Instant::now();
    let mut stats = DispatchStats {
        event_log: config.record_events.then(Vec::new),
        ..DispatchStats::default()
    };

    debug!(strategy = consumers.strategy.name(), "dispatch start");

    while consumers.data.continue_backtest() {
        consumers
            .data
            .update_bars(queue)
            .map_err(DispatchError::component("data handler"))?;

        let tick = stats.ticks;
        while let Some(event) = queue.try_pop() {
            stats.record(tick, event.kind());
            dispatch(&event, queue, &mut consumers)?;
        }
        stats.ticks += 1;

        if !config.heartbeat.is_zero() {
            std::thread::sleep(config.heartbeat);
        }
        if let Some(deadline) = config.deadline {
            let elapsed = started.elapsed();
            if elapsed > deadline {
                return Err(DispatchError::DeadlineExceeded {
                    ticks: stats.ticks,
                    elapsed,
                });
            }
        }
    }

    info!(
        strategy = consumers.strategy.name(),
        ticks = stats.ticks,
        signals = stats.signals,
        orders = stats.orders,
        fills = stats.fills,
        "dispatch finished"
    );
    Ok(stats)
}

fn dispatch(
    event: &Event,
    queue: &mut EventQueue,
    consumers: &mut Consumers<'_>,
) -> Result<(), DispatchError> {
    let data: &dyn DataHandler = &*consumers.data;
    match event {
        Event::Market(market) => {
            consumers
                .strategy
                .calculate_signals(market, data, queue)
                .map_err(|source| DispatchError::Strategy {
                    name: consumers.strategy.name().to_string(),
                    source,
                })?;
            if let Some(portfolio) = consumers.portfolio.as_deref_mut() {
                portfolio
                    .update_timeindex(market, data)
                    .map_err(DispatchError::component("portfolio"))?;
            }
        }
        Event::Signal(signal) => consumers
            .portfolio
            .as_deref_mut()
            .ok_or(DispatchError::Unrouted(EventKind::Signal))?
            .update_signal(signal, data, queue)
            .map_err(DispatchError::component("portfolio"))?,
        Event::Order(order) => consumers
            .execution
            .as_deref_mut()
            .ok_or(DispatchError::Unrouted(EventKind::Order))?
            .execute_order(order, data, queue)
            .map_err(DispatchError::component("execution handler"))?,
        Event::Fill(fill) => consumers
            .portfolio
            .as_deref_mut()
            .ok_or(DispatchError::Unrouted(EventKind::Fill))?
            .update_fill(fill)
            .map_err(DispatchError::component("portfolio"))?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{HistoricDataHandler, MarketData};
    use crate::domain::Bar;
    use crate::event::{MarketEvent, SignalDirection, SignalEvent};
    use chrono::{Duration as Days, NaiveDate};
    use std::sync::Arc;

    /// Emits one LONG per market event.
    struct Chatty;

    impl Strategy for Chatty {
        fn name(&self) -> &str {
            "chatty"
        }

        fn calculate_signals(
            &mut self,
            event: &MarketEvent,
            _bars: &dyn DataHandler,
            queue: &mut EventQueue,
        ) -> Result<(), StrategyError> {
            queue.push(SignalEvent::primary("SPY", event.timestamp, SignalDirection::Long));
            Ok(())
        }
    }

    struct Silent;

    impl Strategy for Silent {
        fn name(&self) -> &str {
            "silent"
        }

        fn calculate_signals(
            &mut self,
            _event: &MarketEvent,
            _bars: &dyn DataHandler,
            _queue: &mut EventQueue,
        ) -> Result<(), StrategyError> {
            Ok(())
        }
    }

    fn handler(n: usize) -> HistoricDataHandler {
        let t0 = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let bars = (0..n).map(|i| Bar {
            symbol: "SPY".into(),
            timestamp: t0 + Days::days(i as i64),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            adj_close: 1.0,
            volume: 1,
        });
        HistoricDataHandler::new(Arc::new(MarketData::from_bars(bars)))
    }

    #[test]
    fn runs_to_exhaustion_with_empty_queue() {
        let mut data = handler(5);
        let mut strategy = Silent;
        let mut queue = EventQueue::new();
        let stats = run(
            &DispatcherConfig::default(),
            &mut queue,
            Consumers {
                data: &mut data,
                strategy: &mut strategy,
                portfolio: None,
                execution: None,
            },
        )
        .unwrap();
        assert_eq!(stats.markets, 5);
        assert_eq!(stats.signals, 0);
        assert!(queue.is_empty());
        assert!(!data.continue_backtest());
        assert!(stats.event_log.is_none());
    }

    #[test]
    fn signal_without_portfolio_is_unrouted() {
        let mut data = handler(3);
        let mut strategy = Chatty;
        let mut queue = EventQueue::new();
        let err = run(
            &DispatcherConfig::default(),
            &mut queue,
            Consumers {
                data: &mut data,
                strategy: &mut strategy,
                portfolio: None,
                execution: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::Unrouted(EventKind::Signal)));
    }

    #[test]
    fn zero_deadline_aborts_after_first_tick() {
        let mut data = handler(10);
        let mut strategy = Silent;
        let mut queue = EventQueue::new();
        let config = DispatcherConfig {
            heartbeat: Duration::from_millis(1),
            deadline: Some(Duration::ZERO),
            record_events: false,
        };
        let err = run(
            &config,
            &mut queue,
            Consumers {
                data: &mut data,
                strategy: &mut strategy,
                portfolio: None,
                execution: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::DeadlineExceeded { ticks: 1, .. }));
    }
}
