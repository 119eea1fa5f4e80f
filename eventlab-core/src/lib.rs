//! EventLab Core — event taxonomy, dispatcher loop, strategies and reference collaborators.
//!
//! A run replays bars through a single FIFO queue:
//! - the data handler releases one tick and pushes a `Market` event
//! - the strategy turns market events into `Signal` events
//! - the portfolio sizes signals into `Order` events and marks to market
//! - the execution handler fills orders, and fills flow back to the portfolio
//!
//! The queue is drained completely before the next tick is released.

pub mod data;
pub mod domain;
pub mod engine;
pub mod error;
pub mod event;
pub mod execution;
pub mod model;
pub mod performance;
pub mod portfolio;
pub mod queue;
pub mod stats;
pub mod strategy;
