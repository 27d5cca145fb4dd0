//! Price-level order book with full-replace diff application.
//!
//! High-performance implementation using:
//! - BTreeMap keyed by [`Price`] so sorted views are a plain walk
//! - Volume-zero-as-delete, so the book only ever stores live levels
//!
//! # Invariant
//!
//! Every stored volume is strictly positive. A zero (or missing) volume
//! means the level does not exist. Constructors drop non-positive volumes
//! and [`BookState::apply`] removes levels whose change volume is zero.

use ordered_float::OrderedFloat;

use crate::types::{BookConsistency, BookSnapshot, Diff, Level, Price, PriceLevels, Side};

/// Full order book at one instant.
///
/// `BookState` is a plain value: cloning it yields an independent book, and
/// every state returned from segment replay is owned by the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookState {
    /// Milliseconds since epoch
    time: i64,

    /// Bid levels: price -> volume
    bids: PriceLevels,

    /// Ask levels: price -> volume
    asks: PriceLevels,
}

impl BookState {
    /// Create an empty book at `time`.
    pub fn new(time: i64) -> Self {
        Self {
            time,
            ..Default::default()
        }
    }

    /// Create a book from full level maps.
    ///
    /// Levels with a non-positive volume are not stored.
    pub fn from_levels(time: i64, mut bids: PriceLevels, mut asks: PriceLevels) -> Self {
        bids.retain(|_, v| *v > 0.0);
        asks.retain(|_, v| *v > 0.0);
        Self { time, bids, asks }
    }

    /// Book time in milliseconds since epoch.
    #[inline]
    pub fn time(&self) -> i64 {
        self.time
    }

    /// Bid level map.
    #[inline]
    pub fn bids(&self) -> &PriceLevels {
        &self.bids
    }

    /// Ask level map.
    #[inline]
    pub fn asks(&self) -> &PriceLevels {
        &self.asks
    }

    /// Level map for one side.
    #[inline]
    pub fn levels(&self, side: Side) -> &PriceLevels {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    /// Volume resting at `price` on `side`, if the level exists.
    pub fn volume_at(&self, side: Side, price: f64) -> Option<f64> {
        self.levels(side).get(&OrderedFloat(price)).copied()
    }

    /// Set or delete a single level.
    ///
    /// A volume of zero deletes the level; any other volume replaces it.
    pub fn set_level(&mut self, side: Side, price: f64, volume: f64) {
        let levels = match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        };
        Self::apply_change(levels, OrderedFloat(price), volume);
    }

    /// Apply a diff in place and return the same book.
    ///
    /// For each change, volume `0` removes the price level and any other
    /// volume sets it (full replace). The book time becomes `diff.time`.
    /// Callers that need the previous state must clone before calling.
    pub fn apply(&mut self, diff: &Diff) -> &mut Self {
        for (&price, &volume) in &diff.bid_changes {
            Self::apply_change(&mut self.bids, price, volume);
        }
        for (&price, &volume) in &diff.ask_changes {
            Self::apply_change(&mut self.asks, price, volume);
        }
        self.time = diff.time;
        self
    }

    #[inline]
    fn apply_change(levels: &mut PriceLevels, price: Price, volume: f64) {
        if volume == 0.0 {
            levels.remove(&price);
        } else {
            levels.insert(price, volume);
        }
    }

    /// Bids sorted by price, highest first, truncated to `depth` levels.
    ///
    /// `None` returns every level.
    pub fn sorted_bids(&self, depth: Option<usize>) -> Vec<Level> {
        let depth = depth.unwrap_or(usize::MAX);
        self.bids.iter().rev().take(depth).map(Level::from).collect()
    }

    /// Asks sorted by price, lowest first, truncated to `depth` levels.
    ///
    /// `None` returns every level.
    pub fn sorted_asks(&self, depth: Option<usize>) -> Vec<Level> {
        let depth = depth.unwrap_or(usize::MAX);
        self.asks.iter().take(depth).map(Level::from).collect()
    }

    /// Highest bid price.
    #[inline]
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.keys().next_back().map(|p| p.into_inner())
    }

    /// Lowest ask price.
    #[inline]
    pub fn best_ask(&self) -> Option<f64> {
        self.asks.keys().next().map(|p| p.into_inner())
    }

    /// `best_ask - best_bid`, or `0.0` if either side is empty.
    pub fn spread(&self) -> f64 {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => ask - bid,
            _ => 0.0,
        }
    }

    /// `(best_bid + best_ask) / 2`, or `0.0` if either side is empty.
    pub fn mid_price(&self) -> f64 {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => (bid + ask) / 2.0,
            _ => 0.0,
        }
    }

    /// Number of bid levels.
    #[inline]
    pub fn bid_levels(&self) -> usize {
        self.bids.len()
    }

    /// Number of ask levels.
    #[inline]
    pub fn ask_levels(&self) -> usize {
        self.asks.len()
    }

    /// Returns true if both sides are empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Top-of-book consistency.
    pub fn check_consistency(&self) -> BookConsistency {
        BookConsistency::classify(self.best_bid(), self.best_ask())
    }

    /// Depth-trimmed, sorted result value for this book.
    pub fn snapshot(&self, depth: Option<usize>) -> BookSnapshot {
        BookSnapshot {
            time: self.time,
            bids: self.sorted_bids(depth),
            asks: self.sorted_asks(depth),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels(pairs: &[(f64, f64)]) -> PriceLevels {
        pairs.iter().map(|&(p, v)| (OrderedFloat(p), v)).collect()
    }

    fn sample_book() -> BookState {
        BookState::from_levels(
            1000,
            levels(&[(100.0, 1.0), (99.5, 2.0), (99.0, 3.0)]),
            levels(&[(101.0, 1.0), (101.5, 2.5), (102.0, 4.0)]),
        )
    }

    #[test]
    fn test_new_book_is_empty() {
        let book = BookState::new(5);
        assert!(book.is_empty());
        assert_eq!(book.time(), 5);
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.best_ask(), None);
        assert_eq!(book.check_consistency(), BookConsistency::Empty);
    }

    #[test]
    fn test_from_levels_drops_non_positive_volume() {
        let book = BookState::from_levels(
            1,
            levels(&[(100.0, 0.0), (99.0, 1.0)]),
            levels(&[(101.0, -1.0)]),
        );
        assert_eq!(book.bid_levels(), 1);
        assert_eq!(book.ask_levels(), 0);
    }

    #[test]
    fn test_apply_sets_replaces_and_deletes() {
        let mut book = sample_book();
        let diff = Diff::new(1005)
            .with_bid(100.0, 0.0)
            .with_bid(99.5, 7.0)
            .with_ask(100.5, 2.0);

        book.apply(&diff);

        assert_eq!(book.time(), 1005);
        assert_eq!(book.volume_at(Side::Bid, 100.0), None);
        assert_eq!(book.volume_at(Side::Bid, 99.5), Some(7.0));
        assert_eq!(book.volume_at(Side::Ask, 100.5), Some(2.0));
        assert_eq!(book.best_bid(), Some(99.5));
        assert_eq!(book.best_ask(), Some(100.5));
    }

    #[test]
    fn test_apply_delete_of_missing_level_is_noop() {
        let mut book = sample_book();
        let before = book.clone();
        book.apply(&Diff::new(1000).with_ask(150.0, 0.0));
        assert_eq!(book, before);
    }

    #[test]
    fn test_apply_is_idempotent() {
        let diff = Diff::new(1010)
            .with_bid(99.0, 0.0)
            .with_bid(98.0, 5.0)
            .with_ask(101.0, 3.0);

        let mut once = sample_book();
        once.apply(&diff);

        let mut twice = sample_book();
        twice.apply(&diff).apply(&diff);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_apply_returns_same_book_for_chaining() {
        let mut book = BookState::new(0);
        let spread = book
            .apply(&Diff::new(1).with_bid(10.0, 1.0))
            .apply(&Diff::new(2).with_ask(11.0, 1.0))
            .spread();
        assert_eq!(spread, 1.0);
        assert_eq!(book.time(), 2);
    }

    #[test]
    fn test_sorted_views_order_and_depth() {
        let book = sample_book();

        let bids = book.sorted_bids(None);
        assert_eq!(
            bids,
            vec![
                Level::new(100.0, 1.0),
                Level::new(99.5, 2.0),
                Level::new(99.0, 3.0)
            ]
        );

        let asks = book.sorted_asks(Some(2));
        assert_eq!(asks, vec![Level::new(101.0, 1.0), Level::new(101.5, 2.5)]);

        assert!(book.sorted_bids(Some(0)).is_empty());
        assert_eq!(book.sorted_asks(Some(10)).len(), 3);
    }

    #[test]
    fn test_spread_and_mid() {
        let book = sample_book();
        assert_eq!(book.spread(), 1.0);
        assert_eq!(book.mid_price(), 100.5);
        assert!(book.check_consistency().is_valid());
    }

    #[test]
    fn test_spread_and_mid_fallback_on_empty_side() {
        let mut book = sample_book();
        book.apply(
            &Diff::new(1001)
                .with_bid(100.0, 0.0)
                .with_bid(99.5, 0.0)
                .with_bid(99.0, 0.0),
        );
        assert_eq!(book.bid_levels(), 0);
        assert_eq!(book.spread(), 0.0);
        assert_eq!(book.mid_price(), 0.0);
    }

    #[test]
    fn test_set_level() {
        let mut book = BookState::new(0);
        book.set_level(Side::Bid, 50.0, 1.0);
        book.set_level(Side::Ask, 51.0, 2.0);
        book.set_level(Side::Bid, 50.0, 0.0);
        assert_eq!(book.bid_levels(), 0);
        assert_eq!(book.volume_at(Side::Ask, 51.0), Some(2.0));
    }

    #[test]
    fn test_snapshot_is_independent_value() {
        let mut book = sample_book();
        let snap = book.snapshot(Some(1));
        book.apply(&Diff::new(2000).with_bid(100.0, 0.0));

        assert_eq!(snap.time, 1000);
        assert_eq!(snap.bids, vec![Level::new(100.0, 1.0)]);
        assert_eq!(snap.asks, vec![Level::new(101.0, 1.0)]);
    }

    #[test]
    fn test_locked_and_crossed_books() {
        let mut book = BookState::new(0);
        book.set_level(Side::Bid, 100.0, 1.0);
        book.set_level(Side::Ask, 100.0, 1.0);
        assert!(book.check_consistency().is_locked());

        book.set_level(Side::Bid, 100.5, 1.0);
        assert!(book.check_consistency().is_crossed());
    }
}
