//! Per-symbol order book engine (§4.2, C2): snapshot/delta application under
//! sequence-gap detection, sorted ladders, volume accounting.

use crate::ladder::PriceLadder;
use crate::pool::ObjectPool;
use common::{
    BookLevel, Delta, DeltaAction, DeltaLevel, Price, ProviderId, ProviderStatus, Side, Size,
    Snapshot, Symbol, Ts, WireLevel,
};
use std::sync::atomic::{AtomicU64, Ordering};

/// Errors raised by the order book engine (§7 "Protocol invariant" / "Pool/invariant bug").
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum BookError {
    /// A sequence discontinuity was detected; the book has been reset to
    /// `Empty` and the caller must re-snapshot (§4.2 state machine).
    #[error("sequence gap on {symbol}: expected {expected}, got {got}")]
    SequenceGap {
        /// Symbol the gap was detected on.
        symbol: Symbol,
        /// Sequence the book expected next.
        expected: u64,
        /// Sequence actually observed.
        got: u64,
    },
    /// Applying an update would leave the book crossed (best bid >= best ask).
    #[error("crossed book: bid={bid:?} >= ask={ask:?}")]
    CrossedBook {
        /// Best bid price that would cross.
        bid: Option<Price>,
        /// Best ask price that would cross.
        ask: Option<Price>,
    },
    /// A delta carried neither a side nor enough information to apply.
    #[error("invalid delta: missing side")]
    InvalidDelta,
}

/// Per-book lifecycle state (§4.2 "State machine (per book)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookState {
    /// No snapshot installed yet (or a gap forced a reset).
    Empty,
    /// Snapshot installed, accepting deltas.
    Live,
}

/// Level-change counters, reset on every `apply_snapshot` (§3, §4.2).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LevelCounters {
    /// Levels newly added.
    pub added: u64,
    /// Levels whose size changed without net add/delete classification.
    pub updated: u64,
    /// Levels removed.
    pub deleted: u64,
}

/// Scaled-integer volume counters (§4.2 "Volume accounting").
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VolumeCounters {
    /// Total scaled size added across all levels, lifetime of the book.
    pub added_scaled: u64,
    /// Total scaled size removed across all levels, lifetime of the book.
    pub deleted_scaled: u64,
    /// Count of same-size updates (open question resolution, see DESIGN.md:
    /// declared-but-dormant in the source this is generalized from; here it
    /// counts touches rather than volume, since true size changes are
    /// already captured by `added_scaled`/`deleted_scaled`).
    pub updated_touches: u64,
}

#[derive(Debug, Default)]
struct AtomicLevelCounters {
    added: AtomicU64,
    updated: AtomicU64,
    deleted: AtomicU64,
}

#[derive(Debug, Default)]
struct AtomicVolumeCounters {
    added_scaled: AtomicU64,
    deleted_scaled: AtomicU64,
    updated_touches: AtomicU64,
}

/// A single symbol's order book for one (provider, symbol) pair (§3 `OrderBook`).
#[derive(Debug)]
pub struct OrderBook {
    symbol: Symbol,
    price_dp: u8,
    size_dp: u8,
    max_depth: usize,
    provider: ProviderId,
    provider_name: String,
    provider_status: ProviderStatus,
    bids: PriceLadder,
    asks: PriceLadder,
    last_sequence: u64,
    last_updated: Ts,
    imbalance: Option<f64>,
    state: BookState,
    level_counters: AtomicLevelCounters,
    volume_counters: AtomicVolumeCounters,
    level_pool: ObjectPool<BookLevel>,
}

impl OrderBook {
    /// Construct an empty book for `symbol` on `provider`.
    #[must_use]
    pub fn new(
        symbol: Symbol,
        provider: ProviderId,
        provider_name: impl Into<String>,
        price_dp: u8,
        size_dp: u8,
        max_depth: usize,
    ) -> Self {
        Self {
            symbol,
            price_dp,
            size_dp,
            max_depth,
            provider,
            provider_name: provider_name.into(),
            provider_status: ProviderStatus::Connecting,
            bids: PriceLadder::new(true),
            asks: PriceLadder::new(false),
            last_sequence: 0,
            last_updated: Ts::from_nanos(0),
            imbalance: None,
            state: BookState::Empty,
            level_counters: AtomicLevelCounters::default(),
            volume_counters: AtomicVolumeCounters::default(),
            level_pool: ObjectPool::new(256),
        }
    }

    /// Symbol this book represents.
    #[must_use]
    pub fn symbol(&self) -> Symbol {
        self.symbol
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> BookState {
        self.state
    }

    /// Last sequence number successfully applied.
    #[must_use]
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Bid ladder, best-first.
    #[must_use]
    pub fn bids(&self) -> &PriceLadder {
        &self.bids
    }

    /// Ask ladder, best-first.
    #[must_use]
    pub fn asks(&self) -> &PriceLadder {
        &self.asks
    }

    /// Current provider connection status.
    #[must_use]
    pub fn provider_status(&self) -> ProviderStatus {
        self.provider_status
    }

    /// Update the provider connection status (driven by the connector FSM, C7).
    pub fn set_provider_status(&mut self, status: ProviderStatus) {
        self.provider_status = status;
    }

    /// Mid price: average of best bid and best ask.
    #[must_use]
    pub fn mid(&self) -> Option<Price> {
        let bid = self.bids.best()?.price;
        let ask = self.asks.best()?.price;
        Some(Price((bid.0 + ask.0) / 2))
    }

    /// Spread in ticks between best ask and best bid.
    #[must_use]
    pub fn spread_ticks(&self) -> Option<i64> {
        let bid = self.bids.best()?.price;
        let ask = self.asks.best()?.price;
        Some(ask.0 - bid.0)
    }

    /// True if the book is currently crossed (best bid >= best ask).
    #[must_use]
    pub fn is_crossed(&self) -> bool {
        match (self.bids.best(), self.asks.best()) {
            (Some(b), Some(a)) => b.price >= a.price,
            _ => false,
        }
    }

    /// Replace the entire book state (§4.2 `apply_snapshot`). Atomic from
    /// the caller's point of view: either the whole snapshot lands or an
    /// error is returned and the previous state is discarded in favor of
    /// `Empty` (never a half-applied snapshot).
    pub fn apply_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), BookError> {
        for old in self.bids.clear() {
            self.level_pool.recycle(old);
        }
        for old in self.asks.clear() {
            self.level_pool.recycle(old);
        }

        for wire in &snapshot.bids {
            self.insert_snapshot_level(wire, true);
        }
        for wire in &snapshot.asks {
            self.insert_snapshot_level(wire, false);
        }

        if self.bids.len() > self.max_depth {
            for dropped in self.bids.truncate_after(self.max_depth) {
                self.level_pool.recycle(dropped);
            }
        }
        if self.asks.len() > self.max_depth {
            for dropped in self.asks.truncate_after(self.max_depth) {
                self.level_pool.recycle(dropped);
            }
        }

        self.bids.recompute_cumulative();
        self.asks.recompute_cumulative();

        self.level_counters = AtomicLevelCounters::default();
        self.last_sequence = snapshot.sequence;
        self.state = BookState::Live;
        self.imbalance = self.compute_metrics(self.max_depth);

        if self.is_crossed() {
            let bid = self.bids.best().map(|l| l.price);
            let ask = self.asks.best().map(|l| l.price);
            return Err(BookError::CrossedBook { bid, ask });
        }
        Ok(())
    }

    fn insert_snapshot_level(&mut self, wire: &WireLevel, is_bid: bool) {
        let price = Price::from_f64(wire.price, self.price_dp);
        let size = Size::from_f64(wire.size, self.size_dp);
        // §4.2 apply_snapshot: filter out entries with null price/size.
        if !price.is_valid() || size.is_zero() {
            return;
        }
        let level = BookLevel {
            price,
            size,
            cumulative_size: Size::ZERO,
            entry_id: wire.entry_id,
            is_bid,
            server_ts: self.last_updated,
            local_ts: self.last_updated,
            provider: self.provider,
            symbol: self.symbol,
            price_dp: self.price_dp,
            size_dp: self.size_dp,
        };
        if is_bid {
            self.bids.add(level);
        } else {
            self.asks.add(level);
        }
    }

    /// Apply one incremental level change, enforcing the book's monotonic
    /// sequence rule (§3, §4.2, scenarios 4-6). A stale sequence is a
    /// silent no-op; a gap resets the book to `Empty` and returns an error
    /// asking the caller to re-snapshot.
    pub fn apply_delta(&mut self, delta: &DeltaLevel) -> Result<(), BookError> {
        if delta.sequence <= self.last_sequence {
            return Ok(());
        }
        if delta.sequence > self.last_sequence + 1 {
            self.state = BookState::Empty;
            return Err(BookError::SequenceGap {
                symbol: self.symbol,
                expected: self.last_sequence + 1,
                got: delta.sequence,
            });
        }

        self.add_or_update_level(delta)?;
        self.last_sequence = delta.sequence;
        self.last_updated = delta.local_ts;
        self.bids.recompute_cumulative();
        self.asks.recompute_cumulative();
        self.imbalance = self.compute_metrics(self.max_depth);

        if self.is_crossed() {
            let bid = self.bids.best().map(|l| l.price);
            let ask = self.asks.best().map(|l| l.price);
            return Err(BookError::CrossedBook { bid, ask });
        }
        Ok(())
    }

    /// Apply a batch of deltas covering a venue sequence range (§4.7
    /// connector ordering: dropped if stale, gap-detected against the
    /// range rather than per-level sequence, applied level-by-level
    /// otherwise).
    pub fn apply_delta_batch(&mut self, batch: &Delta) -> Result<(), BookError> {
        if batch.end_seq <= self.last_sequence {
            return Ok(());
        }
        if batch.start_seq > self.last_sequence + 1 {
            self.state = BookState::Empty;
            return Err(BookError::SequenceGap {
                symbol: self.symbol,
                expected: self.last_sequence + 1,
                got: batch.start_seq,
            });
        }

        for level in &batch.side_changes {
            self.add_or_update_level(level)?;
        }
        self.last_sequence = batch.end_seq;
        self.last_updated = batch.side_changes.last().map_or(self.last_updated, |l| l.local_ts);
        self.bids.recompute_cumulative();
        self.asks.recompute_cumulative();
        self.imbalance = self.compute_metrics(self.max_depth);

        if self.is_crossed() {
            let bid = self.bids.best().map(|l| l.price);
            let ask = self.asks.best().map(|l| l.price);
            return Err(BookError::CrossedBook { bid, ask });
        }
        Ok(())
    }

    /// Dispatch a single level change to add/update/delete based on whether
    /// a level already exists at that price and whether the new size
    /// quantizes to zero (§4.2 `add_or_update_level`).
    pub fn add_or_update_level(&mut self, delta: &DeltaLevel) -> Result<(), BookError> {
        let is_bid = match delta.side {
            Some(Side::Bid) => true,
            Some(Side::Ask) => false,
            None => return Err(BookError::InvalidDelta),
        };

        if delta.size.is_zero() || delta.action == DeltaAction::Delete {
            self.delete_level(delta, is_bid);
            return Ok(());
        }

        let existing = if is_bid {
            self.bids.find_by_price(delta.price)
        } else {
            self.asks.find_by_price(delta.price)
        };

        if existing.is_some() {
            self.update_level(delta, is_bid);
        } else {
            self.add_level(delta, is_bid);
        }
        Ok(())
    }

    /// Insert a brand-new level (§4.2 `add_level`), subject to the
    /// max-depth window rule: if the side is already at capacity and the
    /// new entry is worse than the current worst level, the add is dropped
    /// rather than evicting something better to make room.
    pub fn add_level(&mut self, delta: &DeltaLevel, is_bid: bool) {
        let ladder = if is_bid { &mut self.bids } else { &mut self.asks };

        if ladder.len() >= self.max_depth {
            if let Some(worst) = ladder.worst() {
                let worse_than_worst = if is_bid {
                    delta.price <= worst.price
                } else {
                    delta.price >= worst.price
                };
                if worse_than_worst {
                    return;
                }
            }
        }

        let level = BookLevel {
            price: delta.price,
            size: delta.size,
            cumulative_size: Size::ZERO,
            entry_id: delta.entry_id,
            is_bid,
            server_ts: delta.server_ts,
            local_ts: delta.local_ts,
            provider: self.provider,
            symbol: self.symbol,
            price_dp: self.price_dp,
            size_dp: self.size_dp,
        };
        ladder.add(level);

        if ladder.len() > self.max_depth {
            for dropped in ladder.truncate_after(self.max_depth) {
                self.level_pool.recycle(dropped);
            }
        }

        self.level_counters.added.fetch_add(1, Ordering::Relaxed);
        self.volume_counters
            .added_scaled
            .fetch_add(delta.size.scaled_units().unsigned_abs(), Ordering::Relaxed);
    }

    /// Mutate an existing level's size in place (§4.2 `update_level`).
    pub fn update_level(&mut self, delta: &DeltaLevel, is_bid: bool) {
        let ladder = if is_bid { &mut self.bids } else { &mut self.asks };
        let Some(index) = ladder.find_by_price(delta.price) else {
            return;
        };
        let new_size = delta.size;
        let server_ts = delta.server_ts;
        let local_ts = delta.local_ts;
        let Some(prev) = ladder.update_at(index, |lvl| {
            lvl.size = new_size;
            lvl.server_ts = server_ts;
            lvl.local_ts = local_ts;
        }) else {
            return;
        };

        let old = prev.size.scaled_units();
        let new = new_size.scaled_units();
        if old > new {
            self.level_counters.deleted.fetch_add(1, Ordering::Relaxed);
            self.volume_counters
                .deleted_scaled
                .fetch_add((old - new) as u64, Ordering::Relaxed);
        } else if new > old {
            self.level_counters.added.fetch_add(1, Ordering::Relaxed);
            self.volume_counters
                .added_scaled
                .fetch_add((new - old) as u64, Ordering::Relaxed);
        } else {
            self.level_counters.updated.fetch_add(1, Ordering::Relaxed);
            self.volume_counters.updated_touches.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove a level, located by entry id if present, else by price (§4.2 `delete_level`).
    pub fn delete_level(&mut self, delta: &DeltaLevel, is_bid: bool) {
        let ladder = if is_bid { &mut self.bids } else { &mut self.asks };
        let Some(removed) = ladder.delete_by_price_or_entry_id(delta.price, delta.entry_id) else {
            return;
        };
        self.level_counters.deleted.fetch_add(1, Ordering::Relaxed);
        self.volume_counters
            .deleted_scaled
            .fetch_add(removed.size.scaled_units().unsigned_abs(), Ordering::Relaxed);
        self.level_pool.recycle(removed);
    }

    /// Order-book imbalance over the first `depth` levels of each side:
    /// `(bid_qty - ask_qty) / (bid_qty + ask_qty)`, or `None` if both sides
    /// are empty. Pure function of the two sides (§4.2 `compute_metrics`).
    #[must_use]
    pub fn compute_metrics(&self, depth: usize) -> Option<f64> {
        let bid_qty = self.bids.total_size(depth).scaled_units();
        let ask_qty = self.asks.total_size(depth).scaled_units();
        let total = bid_qty + ask_qty;
        if total == 0 {
            None
        } else {
            Some((bid_qty - ask_qty) as f64 / total as f64)
        }
    }

    /// Last computed imbalance (cached on every successful apply).
    #[must_use]
    pub fn imbalance(&self) -> Option<f64> {
        self.imbalance
    }

    /// Atomic snapshot of the level-change counters.
    #[must_use]
    pub fn level_counters(&self) -> LevelCounters {
        LevelCounters {
            added: self.level_counters.added.load(Ordering::Relaxed),
            updated: self.level_counters.updated.load(Ordering::Relaxed),
            deleted: self.level_counters.deleted.load(Ordering::Relaxed),
        }
    }

    /// Atomic snapshot of the scaled-volume counters.
    #[must_use]
    pub fn volume_counters(&self) -> VolumeCounters {
        VolumeCounters {
            added_scaled: self.volume_counters.added_scaled.load(Ordering::Relaxed),
            deleted_scaled: self.volume_counters.deleted_scaled.load(Ordering::Relaxed),
            updated_touches: self.volume_counters.updated_touches.load(Ordering::Relaxed),
        }
    }

    /// Pool rent/return statistics for this book's level pool.
    #[must_use]
    pub fn pool_stats(&self) -> &crate::pool::PoolStats {
        self.level_pool.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Ts, WireLevel};

    fn book() -> OrderBook {
        OrderBook::new(Symbol::new(1), ProviderId::new(1), "test-venue", 5, 0, 5)
    }

    fn snapshot_scenario_1() -> Snapshot {
        Snapshot {
            symbol: Symbol::new(1),
            bids: (1..=5)
                .map(|i| WireLevel {
                    price: 1.00006 - i as f64 * 0.00001,
                    size: 100.0,
                    entry_id: None,
                })
                .collect(),
            asks: (0..5)
                .map(|i| WireLevel {
                    price: 1.00006 + i as f64 * 0.00001,
                    size: 100.0,
                    entry_id: None,
                })
                .collect(),
            sequence: 1,
        }
    }

    fn delta(side: Side, price: f64, size: f64, seq: u64) -> DeltaLevel {
        DeltaLevel {
            side: Some(side),
            price: Price::from_f64(price, 5),
            size: Size::from_f64(size, 0),
            entry_id: None,
            action: DeltaAction::Change,
            server_ts: Ts::from_nanos(seq),
            local_ts: Ts::from_nanos(seq),
            sequence: seq,
        }
    }

    #[test]
    fn scenario_1_snapshot_identity() {
        let mut b = book();
        b.apply_snapshot(&snapshot_scenario_1()).unwrap();
        assert_eq!(b.bids().len(), 5);
        assert_eq!(b.asks().len(), 5);
        assert_eq!(b.bids().best().unwrap().price, Price::from_f64(1.00005, 5));
        assert_eq!(b.asks().best().unwrap().price, Price::from_f64(1.00006, 5));
    }

    #[test]
    fn scenario_2_delete_existing() {
        let mut b = book();
        b.apply_snapshot(&snapshot_scenario_1()).unwrap();
        let d = delta(Side::Ask, 1.00010, 0.0, 2);
        b.apply_delta(&d).unwrap();
        assert_eq!(b.asks().len(), 4);
        assert!(b.asks().find_by_price(Price::from_f64(1.00010, 5)).is_none());
    }

    #[test]
    fn scenario_3_top_of_book_insertion_respects_depth() {
        // `book()`/`delta()` quantize at 5 decimal places, where the
        // snapshot's best bid (1.00005) and best ask (1.00006) already sit
        // on adjacent ticks, leaving no vacant tick between them to insert
        // into. Use 6 decimal places here instead, so 1.000055 lands on a
        // genuinely vacant tick strictly between the two.
        let mut b = OrderBook::new(Symbol::new(1), ProviderId::new(1), "test-venue", 6, 0, 5);
        b.apply_snapshot(&snapshot_scenario_1()).unwrap();
        let prior_worst_bid = b.bids().worst().unwrap().price;
        let d = DeltaLevel {
            side: Some(Side::Bid),
            price: Price(1_000_055),
            size: Size::from_f64(1.0, 0),
            entry_id: None,
            action: DeltaAction::Change,
            server_ts: Ts::from_nanos(2),
            local_ts: Ts::from_nanos(2),
            sequence: 2,
        };
        b.apply_delta(&d).unwrap();
        assert_eq!(b.bids().len(), 5);
        assert_eq!(b.bids().best().unwrap().price, Price(1_000_055));
        assert!(b.bids().find_by_price(prior_worst_bid).is_none());
    }

    #[test]
    fn scenario_4_change_size() {
        let mut b = book();
        b.apply_snapshot(&snapshot_scenario_1()).unwrap();
        let d = delta(Side::Bid, 1.00003, 99.0, 2);
        b.apply_delta(&d).unwrap();
        let lvl = b
            .bids()
            .get(b.bids().find_by_price(Price::from_f64(1.00003, 5)).unwrap())
            .unwrap();
        assert_eq!(lvl.size, Size::from_f64(99.0, 0));
        assert_eq!(b.level_counters().deleted, 1);
    }

    #[test]
    fn scenario_5_out_of_order_drop() {
        let mut b = book();
        b.apply_snapshot(&snapshot_scenario_1()).unwrap();
        b.apply_delta(&delta(Side::Bid, 1.00003, 50.0, 2)).unwrap();
        // force last_sequence to 10 for the scenario
        b.last_sequence = 10;
        let before = b.bids().len();
        let d = delta(Side::Bid, 1.00003, 1.0, 9);
        b.apply_delta(&d).unwrap();
        assert_eq!(b.bids().len(), before);
        assert_eq!(b.last_sequence(), 10);
    }

    #[test]
    fn scenario_6_gap_detection() {
        let mut b = book();
        b.apply_snapshot(&snapshot_scenario_1()).unwrap();
        b.last_sequence = 10;
        let batch = Delta {
            symbol: Symbol::new(1),
            side_changes: vec![],
            start_seq: 12,
            end_seq: 13,
        };
        let err = b.apply_delta_batch(&batch).unwrap_err();
        assert!(matches!(err, BookError::SequenceGap { .. }));
        assert_eq!(b.state(), BookState::Empty);
    }

    #[test]
    fn invariant_bids_never_exceed_max_depth() {
        let mut b = OrderBook::new(Symbol::new(1), ProviderId::new(1), "v", 5, 0, 3);
        b.apply_snapshot(&snapshot_scenario_1()).unwrap();
        assert!(b.bids().len() <= 3);
        assert!(b.asks().len() <= 3);
    }

    #[test]
    fn round_trip_add_then_delete_cancels_volume() {
        // Same precision problem as scenario 3: at `book()`'s 5 decimal
        // places, 1.0000455 quantizes to the same tick as the existing
        // 1.00005 bid, so the "add" silently takes the `update_level` path
        // instead of `add_level`. Use 6 decimal places and a tick strictly
        // between two existing bids (1.000040 and 1.000050) so the add
        // inserts a genuinely new level for the delete to then remove.
        let mut b = OrderBook::new(Symbol::new(1), ProviderId::new(1), "test-venue", 6, 0, 5);
        b.apply_snapshot(&snapshot_scenario_1()).unwrap();
        let add = DeltaLevel {
            side: Some(Side::Bid),
            price: Price(1_000_045),
            size: Size::from_f64(7.0, 0),
            entry_id: None,
            action: DeltaAction::Change,
            server_ts: Ts::from_nanos(2),
            local_ts: Ts::from_nanos(2),
            sequence: 2,
        };
        b.apply_delta(&add).unwrap();
        let del = DeltaLevel {
            side: Some(Side::Bid),
            price: Price(1_000_045),
            size: Size::ZERO,
            entry_id: None,
            action: DeltaAction::Delete,
            server_ts: Ts::from_nanos(3),
            local_ts: Ts::from_nanos(3),
            sequence: 3,
        };
        b.apply_delta(&del).unwrap();
        let vc = b.volume_counters();
        assert_eq!(vc.added_scaled, vc.deleted_scaled);
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use common::{Ts, WireLevel};
    use proptest::prelude::*;

    const MAX_DEPTH: usize = 10;

    fn arb_price_ticks() -> impl Strategy<Value = i64> {
        1i64..2_000i64
    }

    fn arb_size_ticks() -> impl Strategy<Value = i64> {
        1i64..500i64
    }

    fn arb_side() -> impl Strategy<Value = Side> {
        prop_oneof![Just(Side::Bid), Just(Side::Ask)]
    }

    /// One synthetic delta: side/price/size only, sequence assigned by the caller.
    fn arb_raw_delta() -> impl Strategy<Value = (Side, i64, i64)> {
        (arb_side(), arb_price_ticks(), arb_size_ticks())
    }

    fn widely_separated_snapshot() -> Snapshot {
        Snapshot {
            symbol: Symbol::new(1),
            bids: (0..MAX_DEPTH)
                .map(|i| WireLevel {
                    price: 1.0 - i as f64 * 0.10,
                    size: 10.0,
                    entry_id: None,
                })
                .collect(),
            asks: (0..MAX_DEPTH)
                .map(|i| WireLevel {
                    price: 2.0 + i as f64 * 0.10,
                    size: 10.0,
                    entry_id: None,
                })
                .collect(),
            sequence: 1,
        }
    }

    proptest! {
        /// A book is never left crossed without it being surfaced: if
        /// `bids.best().price >= asks.best().price` holds after a delta,
        /// that delta's `apply_delta` call must have returned `CrossedBook`.
        #[test]
        fn crossing_is_always_surfaced(raw_deltas in prop::collection::vec(arb_raw_delta(), 0..50)) {
            let mut b = OrderBook::new(Symbol::new(1), ProviderId::new(1), "prop-venue", 2, 0, MAX_DEPTH);
            b.apply_snapshot(&widely_separated_snapshot()).unwrap();

            for (seq, (side, price_ticks, size_ticks)) in raw_deltas.into_iter().enumerate() {
                let d = DeltaLevel {
                    side: Some(side),
                    price: Price(price_ticks),
                    size: Size(size_ticks),
                    entry_id: None,
                    action: DeltaAction::Change,
                    server_ts: Ts::from_nanos(seq as u64 + 2),
                    local_ts: Ts::from_nanos(seq as u64 + 2),
                    sequence: seq as u64 + 2,
                };
                let result = b.apply_delta(&d);
                if b.is_crossed() {
                    prop_assert!(matches!(result, Err(BookError::CrossedBook { .. })));
                }
            }
        }

        /// Both ladders stay sorted (descending bids, ascending asks) and
        /// within `max_depth` after any sequence of accepted inserts.
        #[test]
        fn ladders_stay_sorted_and_bounded(raw_deltas in prop::collection::vec(arb_raw_delta(), 0..50)) {
            let mut b = OrderBook::new(Symbol::new(1), ProviderId::new(1), "prop-venue", 2, 0, MAX_DEPTH);
            b.apply_snapshot(&widely_separated_snapshot()).unwrap();

            for (seq, (side, price_ticks, size_ticks)) in raw_deltas.into_iter().enumerate() {
                let d = DeltaLevel {
                    side: Some(side),
                    price: Price(price_ticks),
                    size: Size(size_ticks),
                    entry_id: None,
                    action: DeltaAction::Change,
                    server_ts: Ts::from_nanos(seq as u64 + 2),
                    local_ts: Ts::from_nanos(seq as u64 + 2),
                    sequence: seq as u64 + 2,
                };
                let _ = b.apply_delta(&d);

                prop_assert!(b.bids().is_sorted());
                prop_assert!(b.asks().is_sorted());
                prop_assert!(b.bids().len() <= MAX_DEPTH);
                prop_assert!(b.asks().len() <= MAX_DEPTH);
            }
        }

        /// Deleting a level (size quantizes to zero) always removes it, and
        /// never leaves a duplicate-priced entry behind.
        #[test]
        fn delete_then_lookup_misses(
            side in arb_side(),
            price_ticks in arb_price_ticks(),
            size_ticks in arb_size_ticks(),
        ) {
            let mut b = OrderBook::new(Symbol::new(1), ProviderId::new(1), "prop-venue", 2, 0, MAX_DEPTH);
            b.apply_snapshot(&widely_separated_snapshot()).unwrap();

            let price = Price(price_ticks);
            let add = DeltaLevel {
                side: Some(side),
                price,
                size: Size(size_ticks),
                entry_id: None,
                action: DeltaAction::Change,
                server_ts: Ts::from_nanos(2),
                local_ts: Ts::from_nanos(2),
                sequence: 2,
            };
            let _ = b.apply_delta(&add);

            let del = DeltaLevel {
                side: Some(side),
                price,
                size: Size::ZERO,
                entry_id: None,
                action: DeltaAction::Delete,
                server_ts: Ts::from_nanos(3),
                local_ts: Ts::from_nanos(3),
                sequence: 3,
            };
            b.apply_delta(&del).unwrap();

            let ladder = if side == Side::Bid { b.bids() } else { b.asks() };
            prop_assert!(ladder.find_by_price(price).is_none());
        }
    }
}
