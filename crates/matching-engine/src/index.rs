//! Ordered price index
//!
//! An ordered associative structure keyed by price. Both book sides use the
//! same ascending-order container; the bid side stores its keys under a
//! reversing comparator so that ascending iteration is always best-first.
//!
//! All access is single-threaded (the matching worker owns the book), so a
//! plain `BTreeMap` gives the required logarithmic lookup, insert and delete.

use std::cmp::Reverse;
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::Price;

/// Key type that maps a price onto a side-specific ordering
pub trait PriceKey: Ord + Copy + fmt::Debug {
    /// Build the key for a price
    fn from_price(price: Price) -> Self;

    /// Recover the price from the key
    fn price(&self) -> Price;
}

/// Ask side key: lowest price first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AskKey(Price);

impl PriceKey for AskKey {
    fn from_price(price: Price) -> Self {
        AskKey(price)
    }

    fn price(&self) -> Price {
        self.0
    }
}

/// Bid side key: highest price first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BidKey(Reverse<Price>);

impl PriceKey for BidKey {
    fn from_price(price: Price) -> Self {
        BidKey(Reverse(price))
    }

    fn price(&self) -> Price {
        self.0 .0
    }
}

/// Ordered map from price key to value
#[derive(Debug, Clone)]
pub struct OrderedPriceIndex<K, V> {
    entries: BTreeMap<K, V>,
}

impl<K: Ord, V> OrderedPriceIndex<K, V> {
    /// Create an empty index
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Point lookup
    pub fn search(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// Mutable point lookup
    pub fn search_mut(&mut self, key: &K) -> Option<&mut V> {
        self.entries.get_mut(key)
    }

    /// Insert a value, returning the previous one under the same key
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.entries.insert(key, value)
    }

    /// Remove a key
    pub fn delete(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key)
    }

    /// Entries in ascending key order
    ///
    /// Each call starts a fresh iteration bounded by the current size.
    pub fn iter(&self) -> btree_map::Iter<'_, K, V> {
        self.entries.iter()
    }

    /// First entry in key order
    pub fn first(&self) -> Option<(&K, &V)> {
        self.entries.iter().next()
    }

    /// First entry in key order, mutably
    pub fn first_mut(&mut self) -> Option<(&K, &mut V)> {
        self.entries.iter_mut().next()
    }

    /// Values in ascending key order
    pub fn values(&self) -> btree_map::Values<'_, K, V> {
        self.entries.values()
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no keys
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Ord, V> Default for OrderedPriceIndex<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ask_keys_iterate_ascending() {
        let mut index = OrderedPriceIndex::new();
        for price in [dec!(101), dec!(99), dec!(100)] {
            index.insert(AskKey::from_price(price), price);
        }

        let prices: Vec<_> = index.iter().map(|(k, _)| k.price()).collect();
        assert_eq!(prices, vec![dec!(99), dec!(100), dec!(101)]);
    }

    #[test]
    fn test_bid_keys_iterate_descending() {
        let mut index = OrderedPriceIndex::new();
        for price in [dec!(99), dec!(101), dec!(100)] {
            index.insert(BidKey::from_price(price), price);
        }

        let prices: Vec<_> = index.iter().map(|(k, _)| k.price()).collect();
        assert_eq!(prices, vec![dec!(101), dec!(100), dec!(99)]);
        assert_eq!(index.first().map(|(k, _)| k.price()), Some(dec!(101)));
    }

    #[test]
    fn test_search_insert_delete() {
        let mut index: OrderedPriceIndex<AskKey, &str> = OrderedPriceIndex::new();
        let key = AskKey::from_price(dec!(100.5));

        assert!(index.search(&key).is_none());
        assert!(index.insert(key, "a").is_none());
        assert_eq!(index.search(&key), Some(&"a"));

        if let Some(v) = index.search_mut(&key) {
            *v = "b";
        }
        assert_eq!(index.insert(key, "c"), Some("b"));

        assert_eq!(index.delete(&key), Some("c"));
        assert!(index.delete(&key).is_none());
        assert!(index.is_empty());
    }

    #[test]
    fn test_iteration_is_restartable() {
        let mut index = OrderedPriceIndex::new();
        index.insert(AskKey::from_price(dec!(1)), ());
        index.insert(AskKey::from_price(dec!(2)), ());

        assert_eq!(index.iter().count(), 2);
        assert_eq!(index.iter().count(), 2);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_price_scale_does_not_split_keys() {
        // 100 and 100.00 are the same price
        let mut index = OrderedPriceIndex::new();
        index.insert(AskKey::from_price(dec!(100)), 1);
        assert_eq!(index.search(&AskKey::from_price(dec!(100.00))), Some(&1));
    }
}
