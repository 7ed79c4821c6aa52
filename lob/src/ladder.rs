//! Sorted price ladder (§4.1, C1): one side of an order book.
//!
//! Depth is bounded (typically ≤ 100 levels), so a plain sorted `Vec` with
//! linear-scan insertion beats a balanced tree here — better cache behavior
//! at this size, and no rebalancing variance on the hot path.

use common::{BookLevel, Price};

/// One side of an order book: a list of [`BookLevel`]s kept sorted by price,
/// descending for bids and ascending for asks.
#[derive(Debug, Clone)]
pub struct PriceLadder {
    levels: Vec<BookLevel>,
    descending: bool,
}

impl PriceLadder {
    /// Construct an empty ladder. `descending` selects bid (true) or ask (false) ordering.
    #[must_use]
    pub fn new(descending: bool) -> Self {
        Self {
            levels: Vec::new(),
            descending,
        }
    }

    /// Number of levels currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// True if the ladder holds no levels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Read-only view over the levels, best-first. Borrowed from the
    /// underlying storage — valid only as long as the caller holds whatever
    /// lock guards this ladder's owning book; it cannot outlive that borrow,
    /// which the borrow checker enforces directly (no runtime check needed).
    #[must_use]
    pub fn view(&self) -> &[BookLevel] {
        &self.levels
    }

    /// Index access, best-first.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&BookLevel> {
        self.levels.get(index)
    }

    /// The best (top-of-book) level, if any.
    #[must_use]
    pub fn best(&self) -> Option<&BookLevel> {
        self.levels.first()
    }

    /// The worst (deepest) level currently held, if any.
    #[must_use]
    pub fn worst(&self) -> Option<&BookLevel> {
        self.levels.last()
    }

    /// First `n` levels, best-first.
    #[must_use]
    pub fn take_first_n(&self, n: usize) -> &[BookLevel] {
        let end = n.min(self.levels.len());
        &self.levels[..end]
    }

    /// Locate a level by exact price (stored precision — no tolerance).
    #[must_use]
    pub fn find_by_price(&self, price: Price) -> Option<usize> {
        self.levels.iter().position(|l| l.price == price)
    }

    /// Locate a level by venue entry id.
    #[must_use]
    pub fn find_by_entry_id(&self, entry_id: u64) -> Option<usize> {
        self.levels.iter().position(|l| l.entry_id == Some(entry_id))
    }

    /// Where `level` would need to be inserted to keep the ladder sorted.
    fn sort_position(&self, price: Price) -> usize {
        if self.descending {
            self.levels.partition_point(|l| l.price > price)
        } else {
            self.levels.partition_point(|l| l.price < price)
        }
    }

    /// Insert `level` in sort position. Returns the index it landed at.
    /// Stable for equal keys (ties broken by pre-existing insertion order).
    pub fn add(&mut self, level: BookLevel) -> usize {
        let idx = self.sort_position(level.price);
        self.levels.insert(idx, level);
        idx
    }

    /// Mutate the level at `index` in place via `f`, returning the previous level.
    pub fn update_at<F: FnOnce(&mut BookLevel)>(&mut self, index: usize, f: F) -> Option<BookLevel> {
        let prev = *self.levels.get(index)?;
        f(&mut self.levels[index]);
        Some(prev)
    }

    /// Mutate the first level satisfying `pred` via `f`; returns the
    /// previous value of the level if one matched.
    pub fn update_by_predicate<P, F>(&mut self, pred: P, f: F) -> Option<BookLevel>
    where
        P: Fn(&BookLevel) -> bool,
        F: FnOnce(&mut BookLevel),
    {
        let index = self.levels.iter().position(pred)?;
        self.update_at(index, f)
    }

    /// Remove the level at `index`.
    pub fn remove_at(&mut self, index: usize) -> Option<BookLevel> {
        if index < self.levels.len() {
            Some(self.levels.remove(index))
        } else {
            None
        }
    }

    /// Remove a level by entry id if present, else by exact price.
    pub fn delete_by_price_or_entry_id(&mut self, price: Price, entry_id: Option<u64>) -> Option<BookLevel> {
        let index = entry_id
            .and_then(|id| self.find_by_entry_id(id))
            .or_else(|| self.find_by_price(price))?;
        self.remove_at(index)
    }

    /// Drop every level from `index` onward (used to enforce max-depth).
    pub fn truncate_after(&mut self, index: usize) -> Vec<BookLevel> {
        if index >= self.levels.len() {
            return Vec::new();
        }
        self.levels.split_off(index)
    }

    /// Remove every level and return them (pool-return is the caller's job).
    pub fn clear(&mut self) -> Vec<BookLevel> {
        std::mem::take(&mut self.levels)
    }

    /// Recompute `cumulative_size` for every level, best-first.
    pub fn recompute_cumulative(&mut self) {
        let mut running = 0i64;
        for level in &mut self.levels {
            running += level.size.scaled_units();
            level.cumulative_size = common::Size(running);
        }
    }

    /// Sum of sizes across the first `depth` levels.
    #[must_use]
    pub fn total_size(&self, depth: usize) -> common::Size {
        let total: i64 = self
            .levels
            .iter()
            .take(depth)
            .map(|l| l.size.scaled_units())
            .sum();
        common::Size(total)
    }

    /// True if levels are sorted per this ladder's ordering, for all `i<j`
    /// (§8 testable property).
    #[must_use]
    pub fn is_sorted(&self) -> bool {
        self.levels.windows(2).all(|w| {
            if self.descending {
                w[0].price >= w[1].price
            } else {
                w[0].price <= w[1].price
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Price, ProviderId, Size, Symbol, Ts};

    fn level(price: f64, size: f64, is_bid: bool) -> BookLevel {
        BookLevel {
            price: Price::from_f64(price, 5),
            size: Size::from_f64(size, 0),
            cumulative_size: Size::ZERO,
            entry_id: None,
            is_bid,
            server_ts: Ts::from_nanos(0),
            local_ts: Ts::from_nanos(0),
            provider: ProviderId::new(1),
            symbol: Symbol::new(1),
            price_dp: 5,
            size_dp: 0,
        }
    }

    #[test]
    fn bids_stay_descending() {
        let mut ladder = PriceLadder::new(true);
        ladder.add(level(1.0, 10.0, true));
        ladder.add(level(1.5, 10.0, true));
        ladder.add(level(1.2, 10.0, true));
        assert!(ladder.is_sorted());
        assert_eq!(ladder.best().unwrap().price, Price::from_f64(1.5, 5));
    }

    #[test]
    fn asks_stay_ascending() {
        let mut ladder = PriceLadder::new(false);
        ladder.add(level(1.0, 10.0, false));
        ladder.add(level(0.5, 10.0, false));
        ladder.add(level(0.8, 10.0, false));
        assert!(ladder.is_sorted());
        assert_eq!(ladder.best().unwrap().price, Price::from_f64(0.5, 5));
    }

    #[test]
    fn truncate_after_drops_tail() {
        let mut ladder = PriceLadder::new(true);
        for p in [3.0, 2.0, 1.0] {
            ladder.add(level(p, 1.0, true));
        }
        let dropped = ladder.truncate_after(2);
        assert_eq!(ladder.len(), 2);
        assert_eq!(dropped.len(), 1);
    }

    #[test]
    fn delete_by_entry_id_prefers_id_over_price() {
        let mut ladder = PriceLadder::new(true);
        let mut a = level(1.0, 1.0, true);
        a.entry_id = Some(42);
        ladder.add(a);
        let removed = ladder.delete_by_price_or_entry_id(Price::from_f64(99.0, 5), Some(42));
        assert!(removed.is_some());
        assert!(ladder.is_empty());
    }

    #[test]
    fn cumulative_size_accumulates_from_top() {
        let mut ladder = PriceLadder::new(true);
        ladder.add(level(2.0, 10.0, true));
        ladder.add(level(1.0, 5.0, true));
        ladder.recompute_cumulative();
        assert_eq!(ladder.get(0).unwrap().cumulative_size, Size::from_f64(10.0, 0));
        assert_eq!(ladder.get(1).unwrap().cumulative_size, Size::from_f64(15.0, 0));
    }
}
