//! Order book for a single symbol
//!
//! CRITICAL PROPERTIES:
//! 1. Bids iterate descending (highest price first)
//! 2. Asks iterate ascending (lowest price first)
//! 3. Each price level is a FIFO queue
//! 4. A level present in the index always holds at least one order
//!
//! The book is owned by exactly one matching worker and is never shared.

use std::collections::{HashMap, VecDeque};

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{LevelSummary, Order, Price, Quantity, Side};
use crate::error::MatchingError;
use crate::index::{AskKey, BidKey, OrderedPriceIndex, PriceKey};

// ============================================================================
// Price Level
// ============================================================================

/// FIFO queue of resting orders at one price
#[derive(Debug, Clone)]
pub struct PriceLevel {
    price: Price,
    orders: VecDeque<Order>,
}

impl PriceLevel {
    /// Create an empty level
    pub fn new(price: Price) -> Self {
        Self {
            price,
            orders: VecDeque::new(),
        }
    }

    /// Level price
    pub fn price(&self) -> Price {
        self.price
    }

    /// Append to the FIFO tail
    pub fn push_back(&mut self, order: Order) {
        self.orders.push_back(order);
    }

    /// Oldest order at this price
    pub fn front(&self) -> Option<&Order> {
        self.orders.front()
    }

    /// Oldest order at this price, mutably
    pub fn front_mut(&mut self) -> Option<&mut Order> {
        self.orders.front_mut()
    }

    /// Remove the oldest order
    pub fn pop_front(&mut self) -> Option<Order> {
        self.orders.pop_front()
    }

    /// Remove a specific order, preserving the order of the others
    pub fn remove(&mut self, order_id: Uuid) -> Option<Order> {
        let pos = self.orders.iter().position(|o| o.order_id == order_id)?;
        self.orders.remove(pos)
    }

    /// Orders in time priority
    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter()
    }

    /// Number of resting orders
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Sum of remaining quantity at this level
    pub fn total_quantity(&self) -> Result<Quantity, MatchingError> {
        self.orders
            .iter()
            .try_fold(Decimal::ZERO, |total, o| total.checked_add(o.quantity))
            .ok_or(MatchingError::QuantityOverflow { price: self.price })
    }

    /// Aggregate view of this level
    pub fn summary(&self) -> Result<LevelSummary, MatchingError> {
        Ok(LevelSummary {
            price: self.price,
            quantity: self.total_quantity()?,
            order_count: self.orders.len(),
        })
    }
}

// ============================================================================
// Book Side
// ============================================================================

/// One side of the book: price levels in priority order
#[derive(Debug, Clone)]
pub struct BookSide<K> {
    side: Side,
    levels: OrderedPriceIndex<K, PriceLevel>,
}

impl<K: PriceKey> BookSide<K> {
    /// Create an empty side
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: OrderedPriceIndex::new(),
        }
    }

    /// Which side of the book this is
    pub fn side(&self) -> Side {
        self.side
    }

    /// Append an order to the tail of its price level, creating the level if absent
    pub fn add(&mut self, order: Order) {
        let key = K::from_price(order.price);
        match self.levels.search_mut(&key) {
            Some(level) => level.push_back(order),
            None => {
                let mut level = PriceLevel::new(order.price);
                level.push_back(order);
                self.levels.insert(key, level);
            }
        }
    }

    /// Delete the level at `price` if its queue is empty
    ///
    /// Returns true if a level was removed.
    pub fn remove_level_if_empty(&mut self, price: Price) -> bool {
        let key = K::from_price(price);
        match self.levels.search(&key) {
            Some(level) if level.is_empty() => {
                self.levels.delete(&key);
                true
            }
            _ => false,
        }
    }

    /// Remove one order resting at `price`
    pub fn remove_order(&mut self, price: Price, order_id: Uuid) -> Option<Order> {
        let key = K::from_price(price);
        let removed = self.levels.search_mut(&key)?.remove(order_id);
        self.remove_level_if_empty(price);
        removed
    }

    /// Best price on this side
    pub fn best_price(&self) -> Option<Price> {
        self.levels.first().map(|(k, _)| k.price())
    }

    /// Best level on this side, mutably
    pub fn best_level_mut(&mut self) -> Option<&mut PriceLevel> {
        self.levels.first_mut().map(|(_, level)| level)
    }

    /// Level at an exact price
    pub fn level(&self, price: Price) -> Option<&PriceLevel> {
        self.levels.search(&K::from_price(price))
    }

    /// Levels in priority order (best first)
    pub fn levels(&self) -> impl Iterator<Item = &PriceLevel> {
        self.levels.values()
    }

    /// Up to `depth` aggregated levels, best first
    pub fn depth(&self, depth: usize) -> Result<Vec<LevelSummary>, MatchingError> {
        self.levels().take(depth).map(PriceLevel::summary).collect()
    }

    /// Number of price levels
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Number of resting orders
    pub fn order_count(&self) -> usize {
        self.levels().map(PriceLevel::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Whether any level holds no orders (must never be true)
    pub fn has_empty_level(&self) -> bool {
        self.levels().any(PriceLevel::is_empty)
    }
}

// ============================================================================
// Order Book
// ============================================================================

/// Where a resting order lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLocation {
    pub side: Side,
    pub price: Price,
}

/// Order book for a single symbol
#[derive(Debug, Clone)]
pub struct OrderBook {
    symbol: String,
    pub(crate) bids: BookSide<BidKey>,
    pub(crate) asks: BookSide<AskKey>,
    /// Resting order id -> location, kept in step with the levels
    pub(crate) locations: HashMap<Uuid, OrderLocation>,
}

impl OrderBook {
    /// Create a new order book
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bids: BookSide::new(Side::Buy),
            asks: BookSide::new(Side::Sell),
            locations: HashMap::new(),
        }
    }

    /// Symbol this book is for
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Rest an order on its own side at its own limit price
    pub fn add(&mut self, order: Order) -> Result<(), MatchingError> {
        if self.locations.contains_key(&order.order_id) {
            return Err(MatchingError::DuplicateOrder(order.order_id));
        }

        self.locations.insert(
            order.order_id,
            OrderLocation {
                side: order.side,
                price: order.price,
            },
        );
        match order.side {
            Side::Buy => self.bids.add(order),
            Side::Sell => self.asks.add(order),
        }
        Ok(())
    }

    /// Delete the level at `price` on `side` if it is empty
    pub fn remove_level_if_empty(&mut self, price: Price, side: Side) -> bool {
        match side {
            Side::Buy => self.bids.remove_level_if_empty(price),
            Side::Sell => self.asks.remove_level_if_empty(price),
        }
    }

    /// Remove a resting order by id
    pub fn remove_order(&mut self, order_id: Uuid) -> Result<Option<Order>, MatchingError> {
        let Some(location) = self.locations.remove(&order_id) else {
            return Ok(None);
        };

        let removed = match location.side {
            Side::Buy => self.bids.remove_order(location.price, order_id),
            Side::Sell => self.asks.remove_order(location.price, order_id),
        };

        match removed {
            Some(order) => Ok(Some(order)),
            None => Err(MatchingError::IndexOutOfSync(order_id)),
        }
    }

    /// Whether an order with this id is resting
    pub fn contains_order(&self, order_id: Uuid) -> bool {
        self.locations.contains_key(&order_id)
    }

    /// Location of a resting order
    pub fn location(&self, order_id: Uuid) -> Option<OrderLocation> {
        self.locations.get(&order_id).copied()
    }

    /// Get best bid price (highest buy)
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.best_price()
    }

    /// Get best ask price (lowest sell)
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.best_price()
    }

    /// Get spread
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Whether the best bid meets or exceeds the best ask
    pub fn is_crossed(&self) -> bool {
        matches!(self.spread(), Some(spread) if spread <= Decimal::ZERO)
    }

    /// Bid side, best first
    pub fn bids(&self) -> &BookSide<BidKey> {
        &self.bids
    }

    /// Ask side, best first
    pub fn asks(&self) -> &BookSide<AskKey> {
        &self.asks
    }

    /// Total resting quantity at a bid price
    pub fn bid_quantity_at(&self, price: Price) -> Result<Quantity, MatchingError> {
        self.bids
            .level(price)
            .map_or(Ok(Decimal::ZERO), PriceLevel::total_quantity)
    }

    /// Total resting quantity at an ask price
    pub fn ask_quantity_at(&self, price: Price) -> Result<Quantity, MatchingError> {
        self.asks
            .level(price)
            .map_or(Ok(Decimal::ZERO), PriceLevel::total_quantity)
    }

    /// Total number of resting orders
    pub fn order_count(&self) -> usize {
        self.locations.len()
    }

    /// Total number of price levels on both sides
    pub fn level_count(&self) -> usize {
        self.bids.level_count() + self.asks.level_count()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Whether any indexed level has an empty queue
    pub fn has_empty_level(&self) -> bool {
        self.bids.has_empty_level() || self.asks.has_empty_level()
    }
}

// ============================================================================
// Tests
// ============================================================================
