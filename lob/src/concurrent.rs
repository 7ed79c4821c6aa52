//! Thread-safe order book handle with deterministic cross-book lock
//! ordering (§4.2 `compute_delta_against`, §5, §9 "Two-lock cross-book diff").

use crate::book::{BookError, OrderBook};
use crate::pool::ObjectPool;
use common::{DeltaAction, DeltaLevel, Side};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A reference-counted, lock-guarded [`OrderBook`]. Mutating operations
/// take the write lock; `compute_delta_against` locks two books in a
/// deterministic order (by construction-order id, not memory address) so
/// two threads diffing the same pair in opposite argument order never
/// deadlock.
#[derive(Clone)]
pub struct SharedOrderBook {
    id: u64,
    inner: Arc<RwLock<OrderBook>>,
}

impl SharedOrderBook {
    /// Wrap an [`OrderBook`] for concurrent access.
    #[must_use]
    pub fn new(book: OrderBook) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            inner: Arc::new(RwLock::new(book)),
        }
    }

    /// Take a read lock and run `f` against the book.
    pub fn read<R>(&self, f: impl FnOnce(&OrderBook) -> R) -> R {
        f(&self.inner.read())
    }

    /// Take a write lock and run `f` against the book.
    pub fn write<R>(&self, f: impl FnOnce(&mut OrderBook) -> R) -> R {
        f(&mut self.inner.write())
    }

    /// True if `self` and `other` are handles to the same underlying book.
    #[must_use]
    pub fn same_book(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Diff `self` against `other`, emitting one pooled [`DeltaLevel`] per
    /// differing price on each side via an O(N+M) two-pointer merge over
    /// the sorted ladders. Each emitted delta is returned to `pool`
    /// immediately after `emit` returns — callers must copy synchronously,
    /// they may not retain a reference to the pooled value.
    pub fn compute_delta_against(
        &self,
        other: &Self,
        pool: &ObjectPool<DeltaLevel>,
        mut emit: impl FnMut(&DeltaLevel),
    ) -> Result<(), BookError> {
        if self.same_book(other) {
            return Ok(());
        }

        // Deterministic identity-ordered acquisition avoids deadlock when
        // two threads diff the same pair with swapped arguments.
        if self.id < other.id {
            let a = self.inner.read();
            let b = other.inner.read();
            Self::diff_locked(&a, &b, pool, &mut emit);
        } else {
            let b = other.inner.read();
            let a = self.inner.read();
            Self::diff_locked(&a, &b, pool, &mut emit);
        }
        Ok(())
    }

    fn diff_locked(
        a: &OrderBook,
        b: &OrderBook,
        pool: &ObjectPool<DeltaLevel>,
        emit: &mut impl FnMut(&DeltaLevel),
    ) {
        Self::diff_side(a.bids().view(), b.bids().view(), Side::Bid, true, pool, emit);
        Self::diff_side(a.asks().view(), b.asks().view(), Side::Ask, false, pool, emit);
    }

    /// Two-pointer merge of two sorted (by this side's ordering) level
    /// lists, emitting NEW/CHANGE/DELETE for every differing price.
    fn diff_side(
        from: &[common::BookLevel],
        to: &[common::BookLevel],
        side: Side,
        descending: bool,
        pool: &ObjectPool<DeltaLevel>,
        emit: &mut impl FnMut(&DeltaLevel),
    ) {
        let better = |x: common::Price, y: common::Price| if descending { x > y } else { x < y };

        let (mut i, mut j) = (0usize, 0usize);
        while i < from.len() || j < to.len() {
            let take_from = j >= to.len() || (i < from.len() && better(from[i].price, to[j].price));
            let take_to = i >= from.len() || (j < to.len() && better(to[j].price, from[i].price));

            if take_from {
                Self::emit_one(pool, emit, side, from[i].price, common::Size::ZERO, DeltaAction::Delete, from[i].entry_id);
                i += 1;
            } else if take_to {
                Self::emit_one(pool, emit, side, to[j].price, to[j].size, DeltaAction::New, to[j].entry_id);
                j += 1;
            } else {
                // Same price on both sides.
                if from[i].size != to[j].size {
                    Self::emit_one(pool, emit, side, to[j].price, to[j].size, DeltaAction::Change, to[j].entry_id);
                }
                i += 1;
                j += 1;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_one(
        pool: &ObjectPool<DeltaLevel>,
        emit: &mut impl FnMut(&DeltaLevel),
        side: Side,
        price: common::Price,
        size: common::Size,
        action: DeltaAction,
        entry_id: Option<u64>,
    ) {
        let mut d = pool.rent();
        d.side = Some(side);
        d.price = price;
        d.size = size;
        d.action = action;
        d.entry_id = entry_id;
        emit(&d);
        pool.recycle(d);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::OrderBook;
    use common::{ProviderId, Snapshot, Symbol, WireLevel};

    fn book_with(bids: &[(f64, f64)], asks: &[(f64, f64)]) -> SharedOrderBook {
        let mut b = OrderBook::new(Symbol::new(1), ProviderId::new(1), "v", 5, 0, 50);
        let snap = Snapshot {
            symbol: Symbol::new(1),
            bids: bids.iter().map(|&(p, s)| WireLevel { price: p, size: s, entry_id: None }).collect(),
            asks: asks.iter().map(|&(p, s)| WireLevel { price: p, size: s, entry_id: None }).collect(),
            sequence: 1,
        };
        b.apply_snapshot(&snap).unwrap();
        SharedOrderBook::new(b)
    }

    #[test]
    fn diff_emits_add_change_delete() {
        let a = book_with(&[(1.0, 10.0), (0.9, 5.0)], &[(1.1, 10.0)]);
        let b = book_with(&[(1.0, 20.0)], &[(1.1, 10.0), (1.2, 3.0)]);
        let pool: ObjectPool<DeltaLevel> = ObjectPool::new(16);

        let mut seen = Vec::new();
        a.compute_delta_against(&b, &pool, |d| seen.push((d.side, d.price, d.size, d.action))).unwrap();

        assert!(seen.iter().any(|(_, p, _, act)| *p == common::Price::from_f64(0.9, 5) && *act == DeltaAction::Delete));
        assert!(seen.iter().any(|(_, p, _, act)| *p == common::Price::from_f64(1.0, 5) && *act == DeltaAction::Change));
        assert!(seen.iter().any(|(_, p, _, act)| *p == common::Price::from_f64(1.2, 5) && *act == DeltaAction::New));
    }

    #[test]
    fn same_book_diff_is_noop() {
        let a = book_with(&[(1.0, 10.0)], &[(1.1, 5.0)]);
        let pool: ObjectPool<DeltaLevel> = ObjectPool::new(4);
        let mut count = 0;
        a.compute_delta_against(&a.clone(), &pool, |_| count += 1).unwrap();
        assert_eq!(count, 0);
    }
}
