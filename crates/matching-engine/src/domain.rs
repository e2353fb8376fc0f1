//! Domain types for the Matching Engine
//!
//! Orders, trades and the aggregated depth view. Storage mapping for these
//! types belongs to the persistence collaborator, not to this crate.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MatchingError;

/// Limit price
pub type Price = Decimal;

/// Order or trade quantity
pub type Quantity = Decimal;

// ============================================================================
// Order Side
// ============================================================================

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order, rests on the bid side
    #[serde(alias = "buy")]
    Buy,
    /// Sell order, rests on the ask side
    #[serde(alias = "sell")]
    Sell,
}

impl Side {
    /// Returns the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

// ============================================================================
// Order
// ============================================================================

/// Limit order as seen by the matching engine
///
/// `quantity` is the remaining quantity. It only ever decreases, and only
/// the matching worker mutates it once the order is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Order ID, generated when absent from the input
    #[serde(default = "Uuid::new_v4")]
    pub order_id: Uuid,
    /// Symbol being traded
    pub symbol: String,
    /// Buy or Sell
    pub side: Side,
    /// Limit price
    pub price: Price,
    /// Remaining quantity to fill
    pub quantity: Quantity,
    /// Acceptance sequence (time priority), stamped by the worker
    #[serde(default)]
    pub sequence: u64,
}

impl Order {
    /// Create a new limit order with a fresh id
    pub fn new(symbol: impl Into<String>, side: Side, price: Price, quantity: Quantity) -> Self {
        Self {
            order_id: Uuid::new_v4(),
            symbol: symbol.into(),
            side,
            price,
            quantity,
            sequence: 0,
        }
    }

    /// Convenience constructor for a buy order
    pub fn buy(symbol: impl Into<String>, price: Price, quantity: Quantity) -> Self {
        Self::new(symbol, Side::Buy, price, quantity)
    }

    /// Convenience constructor for a sell order
    pub fn sell(symbol: impl Into<String>, price: Price, quantity: Quantity) -> Self {
        Self::new(symbol, Side::Sell, price, quantity)
    }

    /// Use an externally assigned order id
    pub fn with_id(mut self, order_id: Uuid) -> Self {
        self.order_id = order_id;
        self
    }

    /// Reduce remaining quantity after a fill
    pub fn fill(&mut self, qty: Quantity) -> Result<(), MatchingError> {
        if qty > self.quantity {
            return Err(MatchingError::Overfill {
                order_id: self.order_id,
                fill: qty,
                remaining: self.quantity,
            });
        }
        self.quantity -= qty;
        Ok(())
    }

    /// Check if order is completely filled
    pub fn is_filled(&self) -> bool {
        self.quantity.is_zero()
    }

    /// Whether this order may trade against a resting level at `level_price`
    ///
    /// A buy crosses asks priced at or below its limit, a sell crosses bids
    /// priced at or above its limit.
    pub fn crosses(&self, level_price: Price) -> bool {
        match self.side {
            Side::Buy => self.price >= level_price,
            Side::Sell => self.price <= level_price,
        }
    }
}

// ============================================================================
// Trade
// ============================================================================

/// Execution between a resting (maker) and an incoming (taker) order
///
/// The price is always the maker's price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Unique trade identifier
    pub trade_id: Uuid,
    /// Symbol traded
    pub symbol: String,
    /// Execution price (maker price)
    pub price: Price,
    /// Quantity traded
    pub quantity: Quantity,
    /// Buy side order
    pub buy_order_id: Uuid,
    /// Sell side order
    pub sell_order_id: Uuid,
    /// Side of the incoming order
    pub taker_side: Side,
    /// Sequence number (for deterministic ordering)
    pub sequence: u64,
    /// When the trade occurred
    pub timestamp: DateTime<Utc>,
}

impl Trade {
    /// Create a trade between `maker` and `taker`
    pub fn new(maker: &Order, taker: &Order, quantity: Quantity, sequence: u64) -> Self {
        let (buy_order_id, sell_order_id) = match taker.side {
            Side::Buy => (taker.order_id, maker.order_id),
            Side::Sell => (maker.order_id, taker.order_id),
        };

        Self {
            trade_id: Uuid::new_v4(),
            symbol: taker.symbol.clone(),
            price: maker.price,
            quantity,
            buy_order_id,
            sell_order_id,
            taker_side: taker.side,
            sequence,
            timestamp: Utc::now(),
        }
    }

    /// Id of the resting order in this trade
    pub fn maker_order_id(&self) -> Uuid {
        match self.taker_side {
            Side::Buy => self.sell_order_id,
            Side::Sell => self.buy_order_id,
        }
    }

    /// Id of the incoming order in this trade
    pub fn taker_order_id(&self) -> Uuid {
        match self.taker_side {
            Side::Buy => self.buy_order_id,
            Side::Sell => self.sell_order_id,
        }
    }
}

// ============================================================================
// Depth view
// ============================================================================

/// Aggregated price level for depth snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSummary {
    /// Price
    pub price: Price,
    /// Total resting quantity at this price
    pub quantity: Quantity,
    /// Number of orders at this price
    pub order_count: usize,
}

/// Depth-limited view of the book
///
/// Order identity is discarded on purpose; recovery goes through replay of
/// raw order history, never through a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    /// Symbol
    pub symbol: String,
    /// Bid levels (best first)
    pub bids: Vec<LevelSummary>,
    /// Ask levels (best first)
    pub asks: Vec<LevelSummary>,
    /// Last sequence applied to the book
    pub sequence: u64,
    /// Snapshot timestamp
    pub timestamp: DateTime<Utc>,
}

impl OrderBookSnapshot {
    /// Best bid price in the snapshot
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.first().map(|l| l.price)
    }

    /// Best ask price in the snapshot
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first().map(|l| l.price)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn test_side_serde_accepts_both_cases() {
        let upper: Side = serde_json::from_str("\"BUY\"").unwrap();
        let lower: Side = serde_json::from_str("\"sell\"").unwrap();
        assert_eq!(upper, Side::Buy);
        assert_eq!(lower, Side::Sell);
        assert_eq!(serde_json::to_string(&Side::Sell).unwrap(), "\"SELL\"");
    }

    #[test]
    fn test_order_json_without_id() {
        let order: Order = serde_json::from_str(
            r#"{"symbol":"BTCUSDT","side":"buy","price":"100.5","quantity":2}"#,
        )
        .unwrap();
        assert_eq!(order.side, Side::Buy);
        assert_eq!(order.price, dec!(100.5));
        assert_eq!(order.quantity, dec!(2));
        assert_eq!(order.sequence, 0);
        assert!(!order.order_id.is_nil());
    }

    #[test]
    fn test_order_fill() {
        let mut order = Order::buy("BTCUSDT", dec!(100), dec!(1.0));

        order.fill(dec!(0.4)).unwrap();
        assert_eq!(order.quantity, dec!(0.6));
        assert!(!order.is_filled());

        order.fill(dec!(0.6)).unwrap();
        assert!(order.is_filled());
    }

    #[test]
    fn test_order_overfill_is_rejected() {
        let mut order = Order::sell("BTCUSDT", dec!(100), dec!(0.5));
        let err = order.fill(dec!(0.6)).unwrap_err();
        assert!(matches!(err, MatchingError::Overfill { .. }));
        assert_eq!(order.quantity, dec!(0.5));
    }

    #[test]
    fn test_crossing() {
        let buy = Order::buy("BTCUSDT", dec!(100), dec!(1));
        assert!(buy.crosses(dec!(99)));
        assert!(buy.crosses(dec!(100)));
        assert!(!buy.crosses(dec!(100.01)));

        let sell = Order::sell("BTCUSDT", dec!(100), dec!(1));
        assert!(sell.crosses(dec!(101)));
        assert!(sell.crosses(dec!(100)));
        assert!(!sell.crosses(dec!(99.99)));
    }

    #[test]
    fn test_trade_uses_maker_price_and_sides() {
        let maker = Order::sell("BTCUSDT", dec!(100), dec!(1));
        let taker = Order::buy("BTCUSDT", dec!(101), dec!(0.5));

        let trade = Trade::new(&maker, &taker, dec!(0.5), 7);
        assert_eq!(trade.price, dec!(100));
        assert_eq!(trade.buy_order_id, taker.order_id);
        assert_eq!(trade.sell_order_id, maker.order_id);
        assert_eq!(trade.maker_order_id(), maker.order_id);
        assert_eq!(trade.taker_order_id(), taker.order_id);
        assert_eq!(trade.sequence, 7);
    }
}
