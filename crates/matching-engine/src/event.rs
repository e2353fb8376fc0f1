//! Event types for the matching engine
//!
//! Every book mutation made by the worker is described by one event. The
//! events are handed to the persistence collaborator through an
//! [`EventSink`](crate::log::EventSink) in sequence order.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Price, Quantity, Side, Trade};

/// Event in the matching engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchingEvent {
    /// An incoming order was accepted by the worker
    OrderAccepted {
        order_id: Uuid,
        symbol: String,
        side: Side,
        price: Price,
        quantity: Quantity,
        sequence: u64,
    },

    /// A trade was executed
    TradeExecuted {
        trade: Trade,
        sequence: u64,
    },

    /// The unfilled remainder of an order was placed in the book
    OrderRested {
        order_id: Uuid,
        side: Side,
        price: Price,
        quantity: Quantity,
        sequence: u64,
    },

    /// A resting order was cancelled
    OrderCancelled {
        order_id: Uuid,
        side: Side,
        price: Price,
        remaining_quantity: Quantity,
        sequence: u64,
    },
}

impl MatchingEvent {
    /// Get the sequence number for this event
    pub fn sequence(&self) -> u64 {
        match self {
            MatchingEvent::OrderAccepted { sequence, .. } => *sequence,
            MatchingEvent::TradeExecuted { sequence, .. } => *sequence,
            MatchingEvent::OrderRested { sequence, .. } => *sequence,
            MatchingEvent::OrderCancelled { sequence, .. } => *sequence,
        }
    }

    /// Short name used in logs and metrics labels
    pub fn kind(&self) -> &'static str {
        match self {
            MatchingEvent::OrderAccepted { .. } => "order_accepted",
            MatchingEvent::TradeExecuted { .. } => "trade_executed",
            MatchingEvent::OrderRested { .. } => "order_rested",
            MatchingEvent::OrderCancelled { .. } => "order_cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = MatchingEvent::OrderRested {
            order_id: Uuid::nil(),
            side: Side::Buy,
            price: dec!(100),
            quantity: dec!(0.5),
            sequence: 3,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "order_rested");
        assert_eq!(json["side"], "BUY");

        let back: MatchingEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.sequence(), 3);
        assert_eq!(back.kind(), "order_rested");
    }
}
