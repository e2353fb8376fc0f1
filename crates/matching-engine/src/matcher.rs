//! Price-time priority matching
//!
//! The matcher owns the order book and the sequence counter. It is driven
//! exclusively by the matching worker; nothing here is thread-safe and
//! nothing needs to be.

use std::collections::HashMap;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::book::{BookSide, OrderBook, OrderLocation};
use crate::domain::{Order, OrderBookSnapshot, Side, Trade};
use crate::error::MatchingError;
use crate::event::MatchingEvent;
use crate::index::PriceKey;
use crate::result::MatchingResult;

/// Matching core for one symbol
#[derive(Debug)]
pub struct Matcher {
    book: OrderBook,
    sequence: u64,
    events: Vec<MatchingEvent>,
}

impl Matcher {
    /// Wrap a book, continuing from `sequence`
    pub fn new(book: OrderBook, sequence: u64) -> Self {
        Self {
            book,
            sequence,
            events: Vec::new(),
        }
    }

    /// Read access to the book
    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    /// Last sequence number handed out
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Events produced since the last call, in sequence order
    pub fn take_events(&mut self) -> Vec<MatchingEvent> {
        std::mem::take(&mut self.events)
    }

    fn next_sequence(&mut self) -> Result<u64, MatchingError> {
        advance(&mut self.sequence)
    }

    /// Match an incoming order against the book
    ///
    /// 1. Sweep the opposing side best price first while the limit crosses
    /// 2. Within a level consume resting orders from the FIFO head
    /// 3. Delete each level as soon as its queue empties
    /// 4. Rest any remainder on the order's own side at its limit price
    ///
    /// An error other than [`MatchingError::DuplicateOrder`] may leave the
    /// book partially mutated; the caller must halt.
    pub fn apply_order(&mut self, mut order: Order) -> Result<MatchingResult, MatchingError> {
        if self.book.contains_order(order.order_id) {
            return Err(MatchingError::DuplicateOrder(order.order_id));
        }

        order.sequence = self.next_sequence()?;
        self.events.push(MatchingEvent::OrderAccepted {
            order_id: order.order_id,
            symbol: order.symbol.clone(),
            side: order.side,
            price: order.price,
            quantity: order.quantity,
            sequence: order.sequence,
        });

        let trades = match order.side {
            Side::Buy => sweep(
                &mut self.book.asks,
                &mut self.book.locations,
                &mut order,
                &mut self.sequence,
            )?,
            Side::Sell => sweep(
                &mut self.book.bids,
                &mut self.book.locations,
                &mut order,
                &mut self.sequence,
            )?,
        };

        for trade in &trades {
            debug!(
                trade_id = %trade.trade_id,
                price = %trade.price,
                quantity = %trade.quantity,
                maker = %trade.maker_order_id(),
                "Trade executed"
            );
            self.events.push(MatchingEvent::TradeExecuted {
                trade: trade.clone(),
                sequence: trade.sequence,
            });
        }

        let result = MatchingResult::new(order.order_id, trades, order.quantity, order.sequence);

        if !order.is_filled() {
            let sequence = self.next_sequence()?;
            self.events.push(MatchingEvent::OrderRested {
                order_id: order.order_id,
                side: order.side,
                price: order.price,
                quantity: order.quantity,
                sequence,
            });
            self.book.add(order)?;
        }

        Ok(result)
    }

    /// Remove a resting order
    pub fn cancel(&mut self, order_id: Uuid) -> Result<Option<Order>, MatchingError> {
        let Some(order) = self.book.remove_order(order_id)? else {
            return Ok(None);
        };

        let sequence = self.next_sequence()?;
        self.events.push(MatchingEvent::OrderCancelled {
            order_id,
            side: order.side,
            price: order.price,
            remaining_quantity: order.quantity,
            sequence,
        });
        Ok(Some(order))
    }

    /// Aggregated depth view, up to `depth` levels per side
    pub fn snapshot(&self, depth: usize) -> Result<OrderBookSnapshot, MatchingError> {
        Ok(OrderBookSnapshot {
            symbol: self.book.symbol().to_string(),
            bids: self.book.bids().depth(depth)?,
            asks: self.book.asks().depth(depth)?,
            sequence: self.sequence,
            timestamp: Utc::now(),
        })
    }

    /// Give the book back (shutdown, tests)
    pub fn into_book(self) -> OrderBook {
        self.book
    }
}

/// Step the sequence counter
fn advance(sequence: &mut u64) -> Result<u64, MatchingError> {
    *sequence = sequence
        .checked_add(1)
        .ok_or(MatchingError::SequenceExhausted(*sequence))?;
    Ok(*sequence)
}

/// Consume crossing liquidity from `opposing` for `incoming`
fn sweep<K: PriceKey>(
    opposing: &mut BookSide<K>,
    locations: &mut HashMap<Uuid, OrderLocation>,
    incoming: &mut Order,
    sequence: &mut u64,
) -> Result<Vec<Trade>, MatchingError> {
    let mut trades = Vec::new();

    while !incoming.is_filled() {
        let Some(level) = opposing.best_level_mut() else {
            break; // Opposing side empty
        };
        let level_price = level.price();
        if !incoming.crosses(level_price) {
            break;
        }

        while !incoming.is_filled() {
            let Some(resting) = level.front_mut() else {
                break;
            };

            let match_qty = incoming.quantity.min(resting.quantity);
            if match_qty <= rust_decimal::Decimal::ZERO {
                return Err(MatchingError::EmptyFill {
                    order_id: resting.order_id,
                    quantity: match_qty,
                });
            }

            resting.fill(match_qty)?;
            incoming.fill(match_qty)?;
            let trade_sequence = advance(sequence)?;
            trades.push(Trade::new(resting, incoming, match_qty, trade_sequence));

            if resting.is_filled() {
                if let Some(done) = level.pop_front() {
                    if locations.remove(&done.order_id).is_none() {
                        return Err(MatchingError::IndexOutOfSync(done.order_id));
                    }
                }
            }
        }

        opposing.remove_level_if_empty(level_price);
    }

    Ok(trades)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::MatchStatus;
    use rust_decimal_macros::dec;

    const SYMBOL: &str = "BTCUSDT";

    fn matcher() -> Matcher {
        Matcher::new(OrderBook::new(SYMBOL), 0)
    }

    #[test]
    fn test_basic_match() {
        let mut m = matcher();

        let result = m.apply_order(Order::sell(SYMBOL, dec!(100), dec!(10))).unwrap();
        assert_eq!(result.trades.len(), 0);
        assert_eq!(result.status, MatchStatus::Pending);

        let result = m.apply_order(Order::buy(SYMBOL, dec!(100), dec!(10))).unwrap();
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].quantity, dec!(10));
        assert_eq!(result.trades[0].price, dec!(100));
        assert_eq!(result.status, MatchStatus::Matched);
        assert!(m.book().is_empty());
    }

    #[test]
    fn test_partial_fill_rests_remainder() {
        let mut m = matcher();
        m.apply_order(Order::sell(SYMBOL, dec!(100), dec!(5))).unwrap();

        let buy = Order::buy(SYMBOL, dec!(100), dec!(10));
        let buy_id = buy.order_id;
        let result = m.apply_order(buy).unwrap();

        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].quantity, dec!(5));
        assert_eq!(result.remaining_quantity, dec!(5));
        assert_eq!(result.status, MatchStatus::PartiallyMatched);

        assert!(m.book().asks().is_empty());
        assert_eq!(m.book().best_bid(), Some(dec!(100)));
        assert_eq!(m.book().bid_quantity_at(dec!(100)).unwrap(), dec!(5));
        assert!(m.book().contains_order(buy_id));
    }

    #[test]
    fn test_price_time_priority() {
        let mut m = matcher();

        let first = Order::sell(SYMBOL, dec!(100), dec!(1.0));
        let second = Order::sell(SYMBOL, dec!(100), dec!(1.0));
        let first_id = first.order_id;
        let second_id = second.order_id;
        m.apply_order(first).unwrap();
        m.apply_order(second).unwrap();

        let result = m.apply_order(Order::buy(SYMBOL, dec!(100), dec!(1.0))).unwrap();
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].maker_order_id(), first_id);

        let level = m.book().asks().level(dec!(100)).unwrap();
        assert_eq!(level.len(), 1);
        assert_eq!(level.front().unwrap().order_id, second_id);
    }

    #[test]
    fn test_sweeps_levels_best_price_first() {
        let mut m = matcher();
        m.apply_order(Order::sell(SYMBOL, dec!(101), dec!(3))).unwrap();
        m.apply_order(Order::sell(SYMBOL, dec!(99), dec!(4))).unwrap();
        m.apply_order(Order::sell(SYMBOL, dec!(100), dec!(7))).unwrap();

        let result = m.apply_order(Order::buy(SYMBOL, dec!(100), dec!(12))).unwrap();

        let fills: Vec<_> = result.trades.iter().map(|t| (t.price, t.quantity)).collect();
        assert_eq!(fills, vec![(dec!(99), dec!(4)), (dec!(100), dec!(7))]);
        assert_eq!(result.remaining_quantity, dec!(1));

        // 101 did not cross and is untouched; the remainder rests as a bid at 100
        assert_eq!(m.book().best_ask(), Some(dec!(101)));
        assert_eq!(m.book().best_bid(), Some(dec!(100)));
        assert!(!m.book().has_empty_level());
    }

    #[test]
    fn test_no_crossing() {
        let mut m = matcher();
        m.apply_order(Order::sell(SYMBOL, dec!(100), dec!(10))).unwrap();

        let result = m.apply_order(Order::buy(SYMBOL, dec!(95), dec!(10))).unwrap();
        assert!(result.trades.is_empty());
        assert_eq!(result.status, MatchStatus::Pending);
        assert_eq!(result.remaining_quantity, dec!(10));
        assert_eq!(m.book().best_bid(), Some(dec!(95)));
        assert_eq!(m.book().best_ask(), Some(dec!(100)));
    }

    #[test]
    fn test_sell_trades_at_resting_bid_price() {
        let mut m = matcher();
        m.apply_order(Order::buy(SYMBOL, dec!(100), dec!(10))).unwrap();

        let result = m.apply_order(Order::sell(SYMBOL, dec!(95), dec!(10))).unwrap();
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].price, dec!(100));
        assert_eq!(result.trades[0].taker_side, Side::Sell);
    }

    #[test]
    fn test_end_to_end_example() {
        let mut m = matcher();

        let resting = m.apply_order(Order::sell(SYMBOL, dec!(100), dec!(1.0))).unwrap();
        assert_eq!(resting.status, MatchStatus::Pending);

        let buy = m.apply_order(Order::buy(SYMBOL, dec!(101), dec!(0.5))).unwrap();
        assert_eq!(buy.status, MatchStatus::Matched);
        assert_eq!(buy.trades.len(), 1);
        assert_eq!(buy.trades[0].price, dec!(100));
        assert_eq!(buy.trades[0].quantity, dec!(0.5));
        assert_eq!(m.book().ask_quantity_at(dec!(100)).unwrap(), dec!(0.5));

        // No bids exist, so the sell rests and becomes the new best ask
        let sell = m.apply_order(Order::sell(SYMBOL, dec!(99), dec!(0.6))).unwrap();
        assert_eq!(sell.status, MatchStatus::Pending);
        assert_eq!(m.book().best_ask(), Some(dec!(99)));
        assert_eq!(m.book().asks().level_count(), 2);
    }

    #[test]
    fn test_duplicate_resting_id_rejected_without_mutation() {
        let mut m = matcher();
        let order = Order::buy(SYMBOL, dec!(100), dec!(1));
        m.apply_order(order.clone()).unwrap();
        let sequence = m.sequence();
        m.take_events();

        let err = m.apply_order(order.clone()).unwrap_err();
        assert_eq!(err, MatchingError::DuplicateOrder(order.order_id));
        assert_eq!(m.sequence(), sequence);
        assert!(m.take_events().is_empty());
        assert_eq!(m.book().order_count(), 1);
    }

    #[test]
    fn test_events_follow_sequence_order() {
        let mut m = matcher();
        m.apply_order(Order::sell(SYMBOL, dec!(100), dec!(1))).unwrap();
        m.apply_order(Order::buy(SYMBOL, dec!(100), dec!(2))).unwrap();

        let events = m.take_events();
        let kinds: Vec<_> = events.iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                "order_accepted",
                "order_rested",
                "order_accepted",
                "trade_executed",
                "order_rested"
            ]
        );
        assert!(events.windows(2).all(|w| w[0].sequence() < w[1].sequence()));
    }

    #[test]
    fn test_cancel_removes_order_and_level() {
        let mut m = matcher();
        let order = Order::buy(SYMBOL, dec!(100), dec!(10));
        let id = order.order_id;
        m.apply_order(order).unwrap();

        let cancelled = m.cancel(id).unwrap().unwrap();
        assert_eq!(cancelled.quantity, dec!(10));
        assert!(m.book().is_empty());
        assert_eq!(m.cancel(id).unwrap(), None);
    }

    #[test]
    fn test_cancel_partially_filled_order_reports_remaining() {
        let mut m = matcher();
        let ask = Order::sell(SYMBOL, dec!(100), dec!(10));
        let id = ask.order_id;
        m.apply_order(ask).unwrap();
        m.apply_order(Order::buy(SYMBOL, dec!(100), dec!(4))).unwrap();

        let cancelled = m.cancel(id).unwrap().unwrap();
        assert_eq!(cancelled.quantity, dec!(6));
    }

    #[test]
    fn test_snapshot_depth() {
        let mut m = matcher();
        for price in [dec!(101), dec!(102), dec!(103)] {
            m.apply_order(Order::sell(SYMBOL, price, dec!(1))).unwrap();
        }
        m.apply_order(Order::buy(SYMBOL, dec!(99), dec!(2))).unwrap();
        m.apply_order(Order::buy(SYMBOL, dec!(99), dec!(3))).unwrap();

        let snapshot = m.snapshot(2).unwrap();
        assert_eq!(snapshot.symbol, SYMBOL);
        assert_eq!(snapshot.asks.len(), 2);
        assert_eq!(snapshot.best_ask(), Some(dec!(101)));
        assert_eq!(snapshot.bids.len(), 1);
        assert_eq!(snapshot.bids[0].quantity, dec!(5));
        assert_eq!(snapshot.bids[0].order_count, 2);
        assert_eq!(snapshot.sequence, m.sequence());
    }

    #[test]
    fn test_determinism() {
        let orders = vec![
            Order::sell(SYMBOL, dec!(100), dec!(10)),
            Order::sell(SYMBOL, dec!(99), dec!(5)),
            Order::buy(SYMBOL, dec!(100), dec!(12)),
        ];

        let run = |orders: Vec<Order>| {
            let mut m = matcher();
            orders
                .into_iter()
                .map(|o| m.apply_order(o).unwrap())
                .flat_map(|r| r.trades)
                .map(|t| (t.price, t.quantity, t.sequence))
                .collect::<Vec<_>>()
        };

        assert_eq!(run(orders.clone()), run(orders));
    }

    #[test]
    fn test_sequence_exhaustion_is_fatal() {
        let mut m = Matcher::new(OrderBook::new(SYMBOL), u64::MAX);

        let err = m.apply_order(Order::buy(SYMBOL, dec!(100), dec!(1))).unwrap_err();
        assert_eq!(err, MatchingError::SequenceExhausted(u64::MAX));
        assert!(err.is_fatal());
        assert!(m.book().is_empty());
    }

    #[test]
    fn test_sequence_runs_out_mid_order() {
        let mut m = Matcher::new(OrderBook::new(SYMBOL), u64::MAX - 1);
        let result = m.apply_order(Order::sell(SYMBOL, dec!(100), dec!(1)));

        // Acceptance takes the last number; resting the remainder has none left
        assert_eq!(result.unwrap_err(), MatchingError::SequenceExhausted(u64::MAX));
        assert_eq!(m.sequence(), u64::MAX);
    }
}
