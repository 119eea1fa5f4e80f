//! FIFO event queue owned by a single run.

use std::collections::VecDeque;

use crate::event::Event;

/// Strict first-in first-out queue of events.
///
/// Producers append with [`EventQueue::push`]; the dispatcher drains with the
/// non-blocking [`EventQueue::try_pop`], which returns `None` immediately when
/// nothing is pending. There is no way to insert ahead of queued events.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<Event>,
    pushed: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: impl Into<Event>) {
        self.events.push_back(event.into());
        self.pushed += 1;
    }

    pub fn try_pop(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Total number of events ever pushed.
    pub fn total_pushed(&self) -> u64 {
        self.pushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKind, MarketEvent, OrderEvent, OrderSide, OrderType};
    use chrono::NaiveDate;

    fn market() -> MarketEvent {
        MarketEvent {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn pops_in_push_order() {
        let mut queue = EventQueue::new();
        queue.push(market());
        queue.push(OrderEvent {
            symbol: "SPY".into(),
            order_type: OrderType::Market,
            quantity: 10,
            side: OrderSide::Buy,
        });

        assert_eq!(queue.try_pop().map(|e| e.kind()), Some(EventKind::Market));
        assert_eq!(queue.try_pop().map(|e| e.kind()), Some(EventKind::Order));
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn empty_pop_returns_immediately() {
        let mut queue = EventQueue::new();
        assert!(queue.try_pop().is_none());
        assert!(queue.is_empty());
        assert_eq!(queue.total_pushed(), 0);
    }
}
