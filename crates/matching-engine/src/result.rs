//! Result types for matching operations

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Quantity, Trade};

/// Outcome classification of a submitted order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    /// No trade; the full quantity now rests
    Pending,
    /// Some quantity traded and the remainder rests
    PartiallyMatched,
    /// Fully filled
    Matched,
}

/// Result of a matching operation
///
/// `remaining_quantity + filled_quantity()` always equals the submitted
/// quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingResult {
    /// Incoming order
    pub order_id: Uuid,
    /// Trades in execution order
    pub trades: Vec<Trade>,
    /// Quantity left resting in the book
    pub remaining_quantity: Quantity,
    /// Outcome
    pub status: MatchStatus,
    /// Acceptance sequence of the incoming order
    pub sequence: u64,
}

impl MatchingResult {
    /// Build a result, deriving the status from trades and remainder
    pub fn new(order_id: Uuid, trades: Vec<Trade>, remaining_quantity: Quantity, sequence: u64) -> Self {
        let status = if trades.is_empty() {
            MatchStatus::Pending
        } else if remaining_quantity.is_zero() {
            MatchStatus::Matched
        } else {
            MatchStatus::PartiallyMatched
        };

        Self {
            order_id,
            trades,
            remaining_quantity,
            status,
            sequence,
        }
    }

    /// Check if any trades were generated
    pub fn has_trades(&self) -> bool {
        !self.trades.is_empty()
    }

    /// Total quantity filled
    pub fn filled_quantity(&self) -> Quantity {
        self.trades.iter().map(|t| t.quantity).sum()
    }

    /// Submitted quantity reconstructed from fills and remainder
    pub fn original_quantity(&self) -> Quantity {
        self.remaining_quantity + self.filled_quantity()
    }

    /// Whether the remainder rests in the book
    pub fn is_resting(&self) -> bool {
        self.remaining_quantity > Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Order;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_derivation() {
        let maker = Order::sell("BTCUSDT", dec!(100), dec!(1));
        let taker = Order::buy("BTCUSDT", dec!(100), dec!(1));
        let trade = Trade::new(&maker, &taker, dec!(0.5), 2);

        let pending = MatchingResult::new(taker.order_id, vec![], dec!(1), 1);
        assert_eq!(pending.status, MatchStatus::Pending);
        assert!(pending.is_resting());

        let partial = MatchingResult::new(taker.order_id, vec![trade.clone()], dec!(0.5), 1);
        assert_eq!(partial.status, MatchStatus::PartiallyMatched);
        assert_eq!(partial.original_quantity(), dec!(1));

        let full = MatchingResult::new(taker.order_id, vec![trade], dec!(0), 1);
        assert_eq!(full.status, MatchStatus::Matched);
        assert!(!full.is_resting());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&MatchStatus::PartiallyMatched).unwrap();
        assert_eq!(json, "\"PARTIALLY_MATCHED\"");
    }
}
