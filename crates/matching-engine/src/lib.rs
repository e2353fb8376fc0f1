//! Order Matching Engine for OpenExchange
//!
//! Per-symbol limit order book with price-time priority matching.
//!
//! # Architecture
//!
//! ```text
//!  producers ──offer──▶ bounded queue ──poll──▶ matching worker ──▶ event sink
//!      ▲                                            │
//!      └──────────── oneshot completion ◀───────────┘
//! ```
//!
//! - Exactly one worker thread owns and mutates the [`OrderBook`]
//! - Producers never block on the book, only on their own completion channel
//! - A full queue is rejected immediately ([`EngineError::QueueFull`])
//! - Irrecoverable failures trip the [`CircuitBreaker`]; a halt is final
//! - Resting orders are restored at startup through [`EngineBuilder`]

pub mod book;
pub mod circuit_breaker;
pub mod domain;
pub mod engine;
pub mod error;
pub mod event;
pub mod index;
pub mod log;
pub mod matcher;
pub mod metrics;
pub mod queue;
pub mod result;
mod worker;

pub use book::{BookSide, OrderBook, PriceLevel};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerStatus, EngineState};
pub use domain::{LevelSummary, Order, OrderBookSnapshot, Price, Quantity, Side, Trade};
pub use engine::{EngineBuilder, EngineConfig, MatchingEngine, MAX_ORDER_QUANTITY};
pub use error::{EngineError, MatchingError, SinkError};
pub use event::MatchingEvent;
pub use index::{AskKey, BidKey, OrderedPriceIndex, PriceKey};
pub use log::{EventSink, InMemoryEventLog, JsonLinesJournal, NullSink};
pub use matcher::Matcher;
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use result::{MatchStatus, MatchingResult};

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    fn order_strategy() -> impl Strategy<Value = Order> {
        (any::<bool>(), 95u32..=105, 1u32..=50).prop_map(|(is_buy, price, qty)| {
            let side = if is_buy { Side::Buy } else { Side::Sell };
            // Quantities in tenths so fills split levels unevenly
            Order::new("BTCUSDT", side, Decimal::from(price), Decimal::new(qty.into(), 1))
        })
    }

    proptest! {
        #[test]
        fn test_conservation_holds_for_every_result(orders in prop::collection::vec(order_strategy(), 1..200)) {
            let mut matcher = Matcher::new(OrderBook::new("BTCUSDT"), 0);

            for order in orders {
                let original = order.quantity;
                let result = matcher.apply_order(order).unwrap();
                let traded: Decimal = result.trades.iter().map(|t| t.quantity).sum();

                prop_assert_eq!(result.remaining_quantity + traded, original);
                prop_assert!(result.remaining_quantity >= Decimal::ZERO);
            }
        }

        #[test]
        fn test_no_empty_level_survives_matching(orders in prop::collection::vec(order_strategy(), 1..200)) {
            let mut matcher = Matcher::new(OrderBook::new("BTCUSDT"), 0);

            for order in orders {
                matcher.apply_order(order).unwrap();
                prop_assert!(!matcher.book().has_empty_level());
                prop_assert!(!matcher.book().is_crossed());
            }
        }

        #[test]
        fn test_trades_never_beat_taker_limit(orders in prop::collection::vec(order_strategy(), 1..200)) {
            let mut matcher = Matcher::new(OrderBook::new("BTCUSDT"), 0);

            for order in orders {
                let (side, limit) = (order.side, order.price);
                let result = matcher.apply_order(order).unwrap();
                for trade in &result.trades {
                    match side {
                        Side::Buy => prop_assert!(trade.price <= limit),
                        Side::Sell => prop_assert!(trade.price >= limit),
                    }
                }
            }
        }
    }
}
