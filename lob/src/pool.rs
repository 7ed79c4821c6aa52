//! Object and array pools (§4.3, C3): typed free-lists that keep the hot
//! ingress/egress path allocation-free.
//!
//! `BookLevel`, `DeltaLevel` and `Trade` are rented on ingress and returned
//! on egress (after the consumer has synchronously copied whatever it
//! needs, per the pooled-delta borrow contract in §4.2/§9).

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Array capacity buckets a [`ArrayPool`] rounds requests up to.
pub const CAPACITY_BUCKETS: [usize; 8] = [5, 10, 20, 50, 100, 200, 500, 1000];

fn bucket_for(min: usize) -> usize {
    CAPACITY_BUCKETS
        .iter()
        .copied()
        .find(|&cap| cap >= min)
        .unwrap_or_else(|| CAPACITY_BUCKETS[CAPACITY_BUCKETS.len() - 1].max(min))
}

/// Rent/return counters, readable without taking the free-list lock.
#[derive(Debug, Default)]
pub struct PoolStats {
    rents: AtomicU64,
    returns: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    outstanding: AtomicU64,
}

impl PoolStats {
    /// Total successful `rent` calls.
    #[must_use]
    pub fn rents(&self) -> u64 {
        self.rents.load(Ordering::Relaxed)
    }

    /// Total `return` calls that were accepted back into the free-list.
    #[must_use]
    pub fn returns(&self) -> u64 {
        self.returns.load(Ordering::Relaxed)
    }

    /// Rents satisfied from the free-list rather than freshly allocated.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Rents that required a fresh allocation because the free-list/bucket was empty.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Items currently rented out and not yet returned.
    #[must_use]
    pub fn outstanding(&self) -> u64 {
        self.outstanding.load(Ordering::Relaxed)
    }
}

/// A typed free-list for scalar objects (`BookLevel`, `DeltaLevel`, `Trade`).
pub struct ObjectPool<T: Default> {
    free: Mutex<Vec<T>>,
    soft_cap: usize,
    stats: PoolStats,
}

impl<T: Default> ObjectPool<T> {
    /// Construct a pool that retains at most `soft_cap` idle objects.
    #[must_use]
    pub fn new(soft_cap: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            soft_cap,
            stats: PoolStats::default(),
        }
    }

    /// Rent an object, reused from the free-list if one is available, else
    /// freshly allocated via `T::default()`.
    pub fn rent(&self) -> T {
        self.stats.rents.fetch_add(1, Ordering::Relaxed);
        self.stats.outstanding.fetch_add(1, Ordering::Relaxed);
        let mut free = self.free.lock();
        if let Some(obj) = free.pop() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            obj
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            T::default()
        }
    }

    /// Return an object to the pool. Dropped (not retained) if the
    /// free-list is already at `soft_cap`.
    pub fn recycle(&self, mut obj: T) {
        self.stats.returns.fetch_add(1, Ordering::Relaxed);
        self.stats.outstanding.fetch_sub(1, Ordering::Relaxed);
        obj = T::default();
        let mut free = self.free.lock();
        if free.len() < self.soft_cap {
            free.push(obj);
        }
    }

    /// Rent/return statistics.
    #[must_use]
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }
}

/// A typed free-list for fixed-capacity arrays (`Vec<T>` rounded up to one
/// of [`CAPACITY_BUCKETS`]), one bucket per capacity tier.
pub struct ArrayPool<T> {
    buckets: Vec<Mutex<Vec<Vec<T>>>>,
    soft_cap: usize,
    stats: PoolStats,
}

impl<T> ArrayPool<T> {
    /// Construct an array pool retaining at most `soft_cap` idle arrays per bucket.
    #[must_use]
    pub fn new(soft_cap: usize) -> Self {
        Self {
            buckets: CAPACITY_BUCKETS.iter().map(|_| Mutex::new(Vec::new())).collect(),
            soft_cap,
            stats: PoolStats::default(),
        }
    }

    fn bucket_index(min: usize) -> usize {
        CAPACITY_BUCKETS
            .iter()
            .position(|&cap| cap >= min)
            .unwrap_or(CAPACITY_BUCKETS.len() - 1)
    }

    /// Rent an array with capacity >= `min` (rounded up to the nearest
    /// bucket), contents cleared.
    pub fn rent(&self, min: usize) -> Vec<T> {
        self.stats.rents.fetch_add(1, Ordering::Relaxed);
        self.stats.outstanding.fetch_add(1, Ordering::Relaxed);
        let idx = Self::bucket_index(min);
        let mut bucket = self.buckets[idx].lock();
        if let Some(mut arr) = bucket.pop() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            arr.clear();
            arr
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            Vec::with_capacity(bucket_for(min))
        }
    }

    /// Return an array to its bucket, clearing it first. Dropped if the
    /// bucket is already at `soft_cap`.
    pub fn recycle(&self, mut arr: Vec<T>) {
        self.stats.returns.fetch_add(1, Ordering::Relaxed);
        self.stats.outstanding.fetch_sub(1, Ordering::Relaxed);
        arr.clear();
        let idx = Self::bucket_index(arr.capacity());
        let mut bucket = self.buckets[idx].lock();
        if bucket.len() < self.soft_cap {
            bucket.push(arr);
        }
    }

    /// Rent/return statistics.
    #[must_use]
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_pool_reuses_after_recycle() {
        let pool: ObjectPool<Vec<u8>> = ObjectPool::new(8);
        let a = pool.rent();
        pool.recycle(a);
        let _b = pool.rent();
        assert_eq!(pool.stats().misses(), 1);
        assert_eq!(pool.stats().hits(), 1);
    }

    #[test]
    fn array_pool_rounds_up_to_bucket() {
        let pool: ArrayPool<u64> = ArrayPool::new(4);
        let arr = pool.rent(7);
        assert!(arr.capacity() >= 10);
    }

    #[test]
    fn array_pool_respects_soft_cap() {
        let pool: ArrayPool<u64> = ArrayPool::new(1);
        let a = pool.rent(5);
        let b = pool.rent(5);
        pool.recycle(a);
        pool.recycle(b);
        assert_eq!(pool.stats().returns(), 2);
    }
}
