//! Core data types for order book history.
//!
//! Prices and volumes are `f64` at exchange tick precision, exactly as they
//! are written by the collector. Prices are wrapped in [`OrderedFloat`] so
//! they can key a `BTreeMap`; the sorted views built from those maps are the
//! only ordering callers should rely on.

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::timefmt;

/// Map key for a price level.
pub type Price = OrderedFloat<f64>;

/// Price → volume map for one side of the book.
///
/// In a [`crate::BookState`] every stored volume is strictly positive.
/// In a [`Diff`] a volume of `0.0` means "delete this level".
pub type PriceLevels = BTreeMap<Price, f64>;

/// Book side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Buy side
    Bid,
    /// Sell side
    Ask,
}

/// One price level in a sorted view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub price: f64,
    pub volume: f64,
}

impl Level {
    #[inline]
    pub fn new(price: f64, volume: f64) -> Self {
        Self { price, volume }
    }
}

impl From<(&Price, &f64)> for Level {
    fn from((price, volume): (&Price, &f64)) -> Self {
        Level::new(price.into_inner(), *volume)
    }
}

/// Incremental set of price-level changes at one timestamp.
///
/// Each entry is a full replace: a nonzero volume sets the level, zero
/// removes it. Diffs never carry deltas of volume.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diff {
    /// Milliseconds since epoch
    pub time: i64,

    /// Bid-side changes
    pub bid_changes: PriceLevels,

    /// Ask-side changes
    pub ask_changes: PriceLevels,
}

impl Diff {
    /// Create an empty diff at `time`.
    pub fn new(time: i64) -> Self {
        Self {
            time,
            ..Default::default()
        }
    }

    /// Add a bid change (builder style).
    pub fn with_bid(mut self, price: f64, volume: f64) -> Self {
        self.bid_changes.insert(OrderedFloat(price), volume);
        self
    }

    /// Add an ask change (builder style).
    pub fn with_ask(mut self, price: f64, volume: f64) -> Self {
        self.ask_changes.insert(OrderedFloat(price), volume);
        self
    }

    /// Changes for one side.
    #[inline]
    pub fn changes(&self, side: Side) -> &PriceLevels {
        match side {
            Side::Bid => &self.bid_changes,
            Side::Ask => &self.ask_changes,
        }
    }

    /// Total number of level changes on both sides.
    #[inline]
    pub fn change_count(&self) -> usize {
        self.bid_changes.len() + self.ask_changes.len()
    }

    /// Number of changes that delete a level.
    pub fn deletion_count(&self) -> usize {
        self.bid_changes
            .values()
            .chain(self.ask_changes.values())
            .filter(|&&v| v == 0.0)
            .count()
    }

    /// Returns true if the diff carries no changes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bid_changes.is_empty() && self.ask_changes.is_empty()
    }
}

/// Book consistency status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookConsistency {
    /// Book is valid: best_bid < best_ask
    Valid,
    /// Book is empty (no quotes on one or both sides)
    Empty,
    /// Book is locked: best_bid == best_ask (unusual but can occur)
    Locked,
    /// Book is crossed: best_bid > best_ask
    Crossed,
}

impl BookConsistency {
    /// Classify a pair of best prices.
    pub fn classify(best_bid: Option<f64>, best_ask: Option<f64>) -> Self {
        match (best_bid, best_ask) {
            (Some(bid), Some(ask)) => {
                if bid < ask {
                    BookConsistency::Valid
                } else if bid == ask {
                    BookConsistency::Locked
                } else {
                    BookConsistency::Crossed
                }
            }
            _ => BookConsistency::Empty,
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        matches!(self, BookConsistency::Valid)
    }

    #[inline]
    pub fn is_crossed(&self) -> bool {
        matches!(self, BookConsistency::Crossed)
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        matches!(self, BookConsistency::Locked)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, BookConsistency::Empty)
    }
}

/// Fixed-shape query result: a depth-trimmed, sorted book at one instant.
///
/// Bids are ordered best (highest) first, asks best (lowest) first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSnapshot {
    /// Milliseconds since epoch
    pub time: i64,

    /// Bid levels, highest price first
    pub bids: Vec<Level>,

    /// Ask levels, lowest price first
    pub asks: Vec<Level>,
}

impl BookSnapshot {
    /// Highest bid price.
    #[inline]
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.price)
    }

    /// Lowest ask price.
    #[inline]
    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.price)
    }

    /// `best_ask - best_bid`, or `0.0` when either side is empty.
    pub fn spread(&self) -> f64 {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => ask - bid,
            _ => 0.0,
        }
    }

    /// `(best_bid + best_ask) / 2`, or `0.0` when either side is empty.
    pub fn mid_price(&self) -> f64 {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => (bid + ask) / 2.0,
            _ => 0.0,
        }
    }

    /// Spread in basis points of the mid price.
    pub fn spread_bps(&self) -> Option<f64> {
        let mid = self.mid_price();
        if mid > 0.0 {
            Some(self.spread() / mid * 10_000.0)
        } else {
            None
        }
    }

    /// Sum of volumes over the bid levels in this snapshot.
    pub fn total_bid_volume(&self) -> f64 {
        self.bids.iter().map(|l| l.volume).sum()
    }

    /// Sum of volumes over the ask levels in this snapshot.
    pub fn total_ask_volume(&self) -> f64 {
        self.asks.iter().map(|l| l.volume).sum()
    }

    /// Consistency of the top of book.
    pub fn check_consistency(&self) -> BookConsistency {
        BookConsistency::classify(self.best_bid(), self.best_ask())
    }

    /// Snapshot time as an RFC 3339 UTC string.
    pub fn timestamp(&self) -> String {
        timefmt::format_millis(self.time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> BookSnapshot {
        BookSnapshot {
            time: 1_707_318_000_000,
            bids: vec![Level::new(100.0, 2.0), Level::new(99.5, 1.0)],
            asks: vec![Level::new(100.5, 1.5), Level::new(101.0, 3.0)],
        }
    }

    #[test]
    fn test_diff_builder_and_counts() {
        let diff = Diff::new(1005)
            .with_bid(100.0, 0.0)
            .with_ask(101.5, 2.0)
            .with_ask(102.0, 0.0);

        assert_eq!(diff.time, 1005);
        assert_eq!(diff.change_count(), 3);
        assert_eq!(diff.deletion_count(), 2);
        assert_eq!(diff.changes(Side::Ask).len(), 2);
        assert!(!diff.is_empty());
        assert!(Diff::new(1).is_empty());
    }

    #[test]
    fn test_equal_prices_share_a_key() {
        let diff = Diff::new(1).with_bid(100.10, 1.0).with_bid(100.1, 2.0);
        assert_eq!(diff.bid_changes.len(), 1);
        assert_eq!(diff.bid_changes[&OrderedFloat(100.1)], 2.0);
    }

    #[test]
    fn test_snapshot_analytics() {
        let snap = snapshot();
        assert_eq!(snap.best_bid(), Some(100.0));
        assert_eq!(snap.best_ask(), Some(100.5));
        assert!((snap.spread() - 0.5).abs() < 1e-12);
        assert!((snap.mid_price() - 100.25).abs() < 1e-12);
        assert!((snap.spread_bps().unwrap() - 49.875).abs() < 1e-3);
        assert!((snap.total_bid_volume() - 3.0).abs() < 1e-12);
        assert!((snap.total_ask_volume() - 4.5).abs() < 1e-12);
        assert_eq!(snap.check_consistency(), BookConsistency::Valid);
    }

    #[test]
    fn test_snapshot_empty_side_fallbacks() {
        let snap = BookSnapshot {
            time: 0,
            bids: Vec::new(),
            asks: vec![Level::new(101.0, 1.0)],
        };
        assert_eq!(snap.spread(), 0.0);
        assert_eq!(snap.mid_price(), 0.0);
        assert!(snap.spread_bps().is_none());
        assert_eq!(snap.check_consistency(), BookConsistency::Empty);
    }

    #[test]
    fn test_consistency_classification() {
        assert_eq!(
            BookConsistency::classify(Some(100.0), Some(100.0)),
            BookConsistency::Locked
        );
        assert!(BookConsistency::classify(Some(101.0), Some(100.0)).is_crossed());
        assert!(BookConsistency::classify(None, None).is_empty());
    }

    #[test]
    fn test_snapshot_serializes_to_fixed_shape() {
        let json = serde_json::to_value(snapshot()).unwrap();
        assert_eq!(json["time"], 1_707_318_000_000i64);
        assert_eq!(json["bids"][0]["price"], 100.0);
        assert_eq!(json["asks"][1]["volume"], 3.0);
    }

    #[test]
    fn test_snapshot_timestamp() {
        assert_eq!(snapshot().timestamp(), "2024-02-07T15:00:00.000Z");
    }
}
