//! Turns orders into fills.

use tracing::debug;

use crate::data::DataHandler;
use crate::domain::BarField;
use crate::error::ComponentError;
use crate::event::{FillEvent, OrderEvent};
use crate::queue::EventQueue;

/// Consumes `Order` events and reports `Fill` events.
pub trait ExecutionHandler: Send {
    fn execute_order(
        &mut self,
        event: &OrderEvent,
        bars: &dyn DataHandler,
        queue: &mut EventQueue,
    ) -> Result<(), ComponentError>;
}

/// Interactive Brokers style commission for `quantity` shares worth `notional`.
///
/// 0.013/share up to 500 shares, 0.008/share above, never below 1.30, and
/// capped at 0.5% of the trade value.
pub fn ib_commission(quantity: u64, notional: f64) -> f64 {
    let per_share = if quantity <= 500 { 0.013 } else { 0.008 };
    let commission = (per_share * quantity as f64).max(1.3);
    commission.min(0.005 * notional.abs())
}

/// Fills every order in full at the latest adjusted close.
///
/// No latency, slippage or partial fills.
#[derive(Debug, Clone)]
pub struct SimulatedExecutionHandler {
    exchange: String,
}

impl SimulatedExecutionHandler {
    pub fn new() -> Self {
        Self::with_exchange("ARCA")
    }

    pub fn with_exchange(exchange: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
        }
    }
}

impl Default for SimulatedExecutionHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionHandler for SimulatedExecutionHandler {
    fn execute_order(
        &mut self,
        event: &OrderEvent,
        bars: &dyn DataHandler,
        queue: &mut EventQueue,
    ) -> Result<(), ComponentError> {
        let missing = || ComponentError::MissingPrice(event.symbol.clone());
        let price = bars
            .latest_bar_value(&event.symbol, BarField::AdjClose)
            .ok_or_else(missing)?;
        let timestamp = bars.latest_bar_datetime(&event.symbol).ok_or_else(missing)?;

        let fill_cost = price * event.quantity as f64;
        let commission = ib_commission(event.quantity, fill_cost);
        debug!(symbol = %event.symbol, price, quantity = event.quantity, commission, "fill");

        queue.push(FillEvent {
            timestamp,
            symbol: event.symbol.clone(),
            exchange: self.exchange.clone(),
            quantity: event.quantity,
            side: event.side,
            fill_cost,
            commission,
        });
        Ok(())
    }
}
