//! Event taxonomy — the immutable messages passed through the event queue.
//!
//! Four kinds of event flow through a run:
//! - `Market`: a new bar was released by the data handler
//! - `Signal`: a strategy's directional intent for one symbol
//! - `Order`: a portfolio's sized order for the execution handler
//! - `Fill`: confirmation of a simulated execution
//!
//! Events are constructed once and never mutated. Consumers receive them by
//! shared reference; anything a consumer produces is a new event appended to
//! the queue.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while constructing or parsing events.
#[derive(Debug, Error, PartialEq)]
pub enum EventError {
    #[error("target hedge ratio must be positive and finite, got {0}")]
    InvalidHedgeRatio(f64),
    #[error("signal strength must be positive and finite, got {0}")]
    InvalidStrength(f64),
    #[error("unknown event tag '{0}'")]
    UnknownTag(String),
}

/// Tag identifying which kind of event a message is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Market,
    Signal,
    Order,
    Fill,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Market,
        EventKind::Signal,
        EventKind::Order,
        EventKind::Fill,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Market => "MARKET",
            EventKind::Signal => "SIGNAL",
            EventKind::Order => "ORDER",
            EventKind::Fill => "FILL",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| EventError::UnknownTag(s.to_string()))
    }
}

/// A new bar is available from the data handler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketEvent {
    pub timestamp: NaiveDateTime,
}

/// Directional intent of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalDirection {
    Long,
    Short,
    Exit,
}

impl fmt::Display for SignalDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SignalDirection::Long => "LONG",
            SignalDirection::Short => "SHORT",
            SignalDirection::Exit => "EXIT",
        })
    }
}

/// A strategy's directional intent for one symbol.
///
/// Construction validates the payload, so a `SignalEvent` always carries a
/// positive, finite `strength` and `target_hedge_ratio`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSignal")]
pub struct SignalEvent {
    symbol: String,
    timestamp: NaiveDateTime,
    direction: SignalDirection,
    strength: f64,
    target_hedge_ratio: f64,
}

/// Wire form of [`SignalEvent`], checked through [`SignalEvent::new`].
#[derive(Deserialize)]
struct RawSignal {
    symbol: String,
    timestamp: NaiveDateTime,
    direction: SignalDirection,
    strength: f64,
    target_hedge_ratio: f64,
}

impl TryFrom<RawSignal> for SignalEvent {
    type Error = EventError;

    fn try_from(raw: RawSignal) -> Result<Self, Self::Error> {
        SignalEvent::new(
            raw.symbol,
            raw.timestamp,
            raw.direction,
            raw.strength,
            raw.target_hedge_ratio,
        )
    }
}

impl SignalEvent {
    pub fn new(
        symbol: impl Into<String>,
        timestamp: NaiveDateTime,
        direction: SignalDirection,
        strength: f64,
        target_hedge_ratio: f64,
    ) -> Result<Self, EventError> {
        if !(strength.is_finite() && strength > 0.0) {
            return Err(EventError::InvalidStrength(strength));
        }
        if !(target_hedge_ratio.is_finite() && target_hedge_ratio > 0.0) {
            return Err(EventError::InvalidHedgeRatio(target_hedge_ratio));
        }
        Ok(Self {
            symbol: symbol.into(),
            timestamp,
            direction,
            strength,
            target_hedge_ratio,
        })
    }

    /// Signal for a single-leg strategy: strength and hedge ratio of 1.0.
    pub fn primary(
        symbol: impl Into<String>,
        timestamp: NaiveDateTime,
        direction: SignalDirection,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
            direction,
            strength: 1.0,
            target_hedge_ratio: 1.0,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn direction(&self) -> SignalDirection {
        self.direction
    }

    pub fn strength(&self) -> f64 {
        self.strength
    }

    pub fn target_hedge_ratio(&self) -> f64 {
        self.target_hedge_ratio
    }
}

/// Buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// +1 for buys, -1 for sells.
    pub fn sign(&self) -> i64 {
        match self {
            OrderSide::Buy => 1,
            OrderSide::Sell => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
}

/// A sized order from the portfolio to the execution handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub symbol: String,
    pub order_type: OrderType,
    pub quantity: u64,
    pub side: OrderSide,
}

/// A simulated execution, reported back to the portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillEvent {
    pub timestamp: NaiveDateTime,
    pub symbol: String,
    pub exchange: String,
    pub quantity: u64,
    pub side: OrderSide,
    /// Total notional of the fill (price × quantity).
    pub fill_cost: f64,
    pub commission: f64,
}

/// Tagged union over every event kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    Market(MarketEvent),
    Signal(SignalEvent),
    Order(OrderEvent),
    Fill(FillEvent),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Market(_) => EventKind::Market,
            Event::Signal(_) => EventKind::Signal,
            Event::Order(_) => EventKind::Order,
            Event::Fill(_) => EventKind::Fill,
        }
    }
}

impl From<MarketEvent> for Event {
    fn from(e: MarketEvent) -> Self {
        Event::Market(e)
    }
}

impl From<SignalEvent> for Event {
    fn from(e: SignalEvent) -> Self {
        Event::Signal(e)
    }
}

impl From<OrderEvent> for Event {
    fn from(e: OrderEvent) -> Self {
        Event::Order(e)
    }
}

impl From<FillEvent> for Event {
    fn from(e: FillEvent) -> Self {
        Event::Fill(e)
    }
}
