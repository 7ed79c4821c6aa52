//! Time-bucketed aggregated series (§4.8, C8): a bounded ring of derived
//! points built by folding new samples into the current bucket, or opening
//! a fresh one once `bucket_width` has elapsed. Deliberately has no
//! dependency on the bus or connector — it's a leaf component that anything
//! producing timestamped points can use (§4.9 is its first consumer).

use common::Ts;
use std::collections::VecDeque;

/// A point carried by an [`AggregatedSeries`] must expose the timestamp the
/// series buckets on.
pub trait TimestampedPoint {
    /// The bucket key for this point.
    fn timestamp(&self) -> Ts;
}

type Hook<P> = Box<dyn FnMut(&P) + Send>;

/// Folds a newly-arriving point into the current tail bucket. `count` is the
/// number of points already folded into that bucket, not counting `new`.
/// An aggregator that wants the bucket key to stay anchored to whichever
/// point opened the bucket must leave `tail`'s timestamp untouched — only
/// `add`'s own opens-new-bucket check ever changes which bucket is current.
pub type Aggregator<P> = Box<dyn FnMut(&mut P, &P, usize) + Send>;

/// A bounded, time-bucketed series of derived points (§4.8 `AggregatedSeries`).
pub struct AggregatedSeries<P: Clone + TimestampedPoint> {
    bucket_width_ns: u64,
    max_points: usize,
    points: VecDeque<P>,
    tail_count: usize,
    aggregator: Aggregator<P>,
    on_adding: Option<Hook<P>>,
    on_added: Option<Hook<P>>,
    on_removing: Option<Hook<P>>,
    on_removed: Option<Hook<P>>,
}

impl<P: Clone + TimestampedPoint> AggregatedSeries<P> {
    /// Construct a series with the given bucket width and retention bound.
    /// `aggregator` folds a new sample into the tail bucket when it falls
    /// inside the current bucket width.
    pub fn new(
        bucket_width_ns: u64,
        max_points: usize,
        aggregator: impl FnMut(&mut P, &P, usize) + Send + 'static,
    ) -> Self {
        Self {
            bucket_width_ns,
            max_points,
            points: VecDeque::new(),
            tail_count: 0,
            aggregator: Box::new(aggregator),
            on_adding: None,
            on_added: None,
            on_removing: None,
            on_removed: None,
        }
    }

    /// Set the hook invoked just before a point is appended as a new bucket.
    pub fn on_adding(&mut self, hook: impl FnMut(&P) + Send + 'static) {
        self.on_adding = Some(Box::new(hook));
    }

    /// Set the hook invoked just after a point is appended as a new bucket.
    pub fn on_added(&mut self, hook: impl FnMut(&P) + Send + 'static) {
        self.on_added = Some(Box::new(hook));
    }

    /// Set the hook invoked just before the oldest point is evicted.
    pub fn on_removing(&mut self, hook: impl FnMut(&P) + Send + 'static) {
        self.on_removing = Some(Box::new(hook));
    }

    /// Set the hook invoked just after the oldest point is evicted.
    pub fn on_removed(&mut self, hook: impl FnMut(&P) + Send + 'static) {
        self.on_removed = Some(Box::new(hook));
    }

    /// Add `item`, folding it into the current bucket if it falls within
    /// `bucket_width` of the tail, otherwise opening a new bucket (§4.8
    /// contract). Evicts from the front if this pushes the series over
    /// `max_points`.
    pub fn add(&mut self, item: P) {
        let opens_new_bucket = match self.points.back() {
            Some(tail) => item.timestamp().since(tail.timestamp()) >= self.bucket_width_ns,
            None => true,
        };
        if opens_new_bucket {
            self.append_bucket(item);
        } else {
            let tail = self.points.back_mut().expect("checked above");
            (self.aggregator)(tail, &item, self.tail_count);
            self.tail_count += 1;
        }
    }

    /// Append `item` as a new bucket unconditionally, bypassing the
    /// fold-into-tail contract.
    pub fn force_add(&mut self, item: P) {
        self.append_bucket(item);
    }

    fn append_bucket(&mut self, item: P) {
        if let Some(hook) = self.on_adding.as_mut() {
            hook(&item);
        }
        self.points.push_back(item.clone());
        self.tail_count = 1;
        if let Some(hook) = self.on_added.as_mut() {
            hook(&item);
        }
        self.evict_if_over_capacity();
    }

    fn evict_if_over_capacity(&mut self) {
        while self.points.len() > self.max_points {
            if let Some(front) = self.points.front() {
                if let Some(hook) = self.on_removing.as_mut() {
                    hook(front);
                }
            }
            if let Some(removed) = self.points.pop_front() {
                if let Some(hook) = self.on_removed.as_mut() {
                    hook(&removed);
                }
            }
        }
    }

    /// Discard every point.
    pub fn clear(&mut self) {
        self.points.clear();
        self.tail_count = 0;
    }

    /// Number of buckets currently retained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True if no buckets are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Most recent bucket.
    #[must_use]
    pub fn last(&self) -> Option<&P> {
        self.points.back()
    }

    /// Oldest retained bucket.
    #[must_use]
    pub fn first(&self) -> Option<&P> {
        self.points.front()
    }

    /// The bucket at `index`, oldest-first.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&P> {
        self.points.get(index)
    }

    /// Iterate buckets oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = &P> {
        self.points.iter()
    }
}
