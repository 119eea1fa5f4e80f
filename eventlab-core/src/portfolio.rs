//! Position accounting, order sizing and the equity record.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::data::DataHandler;
use crate::domain::BarField;
use crate::error::ComponentError;
use crate::event::{
    FillEvent, MarketEvent, OrderEvent, OrderSide, OrderType, SignalDirection, SignalEvent,
};
use crate::performance::{EquityCurve, SummaryStats};
use crate::queue::EventQueue;

/// Position and equity bookkeeping driven by the dispatcher.
pub trait Portfolio: Send {
    /// Mark holdings to market for the bar just released.
    fn update_timeindex(
        &mut self,
        event: &MarketEvent,
        bars: &dyn DataHandler,
    ) -> Result<(), ComponentError>;

    /// Size a signal into zero or one `Order` events.
    fn update_signal(
        &mut self,
        event: &SignalEvent,
        bars: &dyn DataHandler,
        queue: &mut EventQueue,
    ) -> Result<(), ComponentError>;

    fn update_fill(&mut self, event: &FillEvent) -> Result<(), ComponentError>;

    /// Build the equity curve from the recorded holdings.
    fn create_equity_curve(&mut self) -> Result<(), ComponentError>;

    /// Labelled statistics in fixed order:
    /// total return, Sharpe ratio, max drawdown, drawdown duration.
    ///
    /// Requires [`Portfolio::create_equity_curve`] to have run.
    fn output_summary_stats(&self) -> Result<Vec<(String, String)>, ComponentError>;
}

/// Sizing and reporting knobs for [`NaivePortfolio`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSettings {
    pub initial_capital: f64,
    /// Order size for a signal of strength 1.0.
    pub base_quantity: u64,
    /// Sharpe annualization factor (252 for daily bars).
    pub periods_per_year: f64,
}

impl Default for PortfolioSettings {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            base_quantity: 100,
            periods_per_year: 252.0,
        }
    }
}

/// Holdings at one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingsSnapshot {
    /// `None` for the opening snapshot taken before the first bar.
    pub timestamp: Option<NaiveDateTime>,
    /// Market value per symbol.
    pub values: BTreeMap<String, f64>,
    pub cash: f64,
    /// Cumulative commission paid so far.
    pub commission: f64,
    pub total: f64,
}

/// Fixed-size, no-risk-management portfolio.
///
/// Every signal becomes a market order of `floor(base_quantity × strength)`
/// shares. Entries are only taken from flat and exits close the whole
/// position, so a symbol's position steps between short, flat and long.
#[derive(Debug, Clone)]
pub struct NaivePortfolio {
    settings: PortfolioSettings,
    positions: BTreeMap<String, i64>,
    cash: f64,
    commission: f64,
    holdings: Vec<HoldingsSnapshot>,
    equity: Option<EquityCurve>,
}

impl NaivePortfolio {
    pub fn new(symbols: &[String], settings: PortfolioSettings) -> Self {
        let positions: BTreeMap<String, i64> = symbols.iter().map(|s| (s.clone(), 0)).collect();
        let opening = HoldingsSnapshot {
            timestamp: None,
            values: positions.keys().map(|s| (s.clone(), 0.0)).collect(),
            cash: settings.initial_capital,
            commission: 0.0,
            total: settings.initial_capital,
        };
        Self {
            settings,
            positions,
            cash: settings.initial_capital,
            commission: 0.0,
            holdings: vec![opening],
            equity: None,
        }
    }

    /// Signed share count for `symbol` (negative when short).
    pub fn position(&self, symbol: &str) -> Option<i64> {
        self.positions.get(symbol).copied()
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn commission_paid(&self) -> f64 {
        self.commission
    }

    pub fn holdings(&self) -> &[HoldingsSnapshot] {
        &self.holdings
    }

    fn naive_order(&self, signal: &SignalEvent, current: i64) -> Option<OrderEvent> {
        let sized = (self.settings.base_quantity as f64 * signal.strength()).floor();
        let sized = if sized.is_finite() && sized >= 0.0 {
            sized as u64
        } else {
            0
        };

        let (side, quantity) = match (signal.direction(), current) {
            (SignalDirection::Long, 0) => (OrderSide::Buy, sized),
            (SignalDirection::Short, 0) => (OrderSide::Sell, sized),
            (SignalDirection::Exit, q) if q > 0 => (OrderSide::Sell, q.unsigned_abs()),
            (SignalDirection::Exit, q) if q < 0 => (OrderSide::Buy, q.unsigned_abs()),
            _ => return None,
        };
        if quantity == 0 {
            return None;
        }
        Some(OrderEvent {
            symbol: signal.symbol().to_string(),
            order_type: OrderType::Market,
            quantity,
            side,
        })
    }
}

impl Portfolio for NaivePortfolio {
    fn update_timeindex(
        &mut self,
        event: &MarketEvent,
        bars: &dyn DataHandler,
    ) -> Result<(), ComponentError> {
        let mut values = BTreeMap::new();
        let mut market_value = 0.0;
        for (symbol, &quantity) in &self.positions {
            let value = if quantity == 0 {
                0.0
            } else {
                let price = bars
                    .latest_bar_value(symbol, BarField::AdjClose)
                    .ok_or_else(|| ComponentError::MissingPrice(symbol.clone()))?;
                quantity as f64 * price
            };
            market_value += value;
            values.insert(symbol.clone(), value);
        }

        self.holdings.push(HoldingsSnapshot {
            timestamp: Some(event.timestamp),
            values,
            cash: self.cash,
            commission: self.commission,
            total: self.cash + market_value,
        });
        Ok(())
    }

    fn update_signal(
        &mut self,
        event: &SignalEvent,
        _bars: &dyn DataHandler,
        queue: &mut EventQueue,
    ) -> Result<(), ComponentError> {
        let current = self
            .position(event.symbol())
            .ok_or_else(|| ComponentError::UnknownSymbol(event.symbol().to_string()))?;
        if let Some(order) = self.naive_order(event, current) {
            debug!(
                symbol = %order.symbol,
                side = ?order.side,
                quantity = order.quantity,
                "order"
            );
            queue.push(order);
        }
        Ok(())
    }

    fn update_fill(&mut self, event: &FillEvent) -> Result<(), ComponentError> {
        let position = self
            .positions
            .get_mut(&event.symbol)
            .ok_or_else(|| ComponentError::UnknownSymbol(event.symbol.clone()))?;
        let sign = event.side.sign();
        *position += sign * event.quantity as i64;

        // Buys spend cash, sells receive it; commission is always paid.
        self.cash -= sign as f64 * event.fill_cost + event.commission;
        self.commission += event.commission;
        Ok(())
    }

    fn create_equity_curve(&mut self) -> Result<(), ComponentError> {
        let totals: Vec<f64> = self.holdings.iter().map(|h| h.total).collect();
        if totals.iter().any(|t| !t.is_finite()) {
            return Err(ComponentError::StatsUnavailable(
                "non-finite equity in holdings".into(),
            ));
        }
        self.equity = Some(EquityCurve::from_totals(&totals));
        Ok(())
    }

    fn output_summary_stats(&self) -> Result<Vec<(String, String)>, ComponentError> {
        let curve = self.equity.as_ref().ok_or_else(|| {
            ComponentError::StatsUnavailable("equity curve has not been created".into())
        })?;
        Ok(SummaryStats::compute(curve, self.settings.periods_per_year).formatted())
    }
}
