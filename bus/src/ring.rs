//! Multicast ring buffer (§4.4, C4): a bounded, power-of-two-capacity log
//! with a single wait-free publisher and many independently-paced reader
//! cursors. Overwrites are allowed by design — this is a lossy multicast
//! log, not a guaranteed-delivery queue.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Errors raised constructing or reading a [`RingBuffer`].
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone, Copy)]
pub enum RingBufferError {
    /// Requested capacity was not a power of two.
    #[error("ring buffer capacity {0} is not a power of two")]
    NotPowerOfTwo(usize),
}

fn is_power_of_two(n: usize) -> bool {
    n != 0 && (n & (n - 1)) == 0
}

struct Slot<T> {
    seq: u64,
    value: Option<T>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self { seq: 0, value: None }
    }
}

/// A reader's position in a [`RingBuffer`]. Sequence numbers are 1-based;
/// `seq() == 0` means nothing has been read yet.
pub struct Cursor {
    name: String,
    seq: AtomicU64,
    lost: AtomicU64,
}

impl Cursor {
    /// Name this cursor was registered under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last sequence number successfully read.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq.load(Ordering::Relaxed)
    }

    /// Cumulative count of messages lost to lapping.
    #[must_use]
    pub fn lost_count(&self) -> u64 {
        self.lost.load(Ordering::Relaxed)
    }
}

/// A snapshot of one consumer's standing against the ring (§3 `ConsumerCursor`).
#[derive(Debug, Clone, PartialEq)]
pub struct CursorStats {
    /// Name the cursor was registered under.
    pub name: String,
    /// Last sequence number read.
    pub current_seq: u64,
    /// Highest sequence number published, observed at the time of this snapshot.
    pub highest_published: u64,
    /// Unread backlog: `highest_published - current_seq`.
    pub lag: u64,
    /// Cumulative messages lost to lapping.
    pub lost_count: u64,
    /// `lag` as a percentage of capacity is below the warning threshold (<50%).
    pub is_healthy: bool,
    /// `lag` as a percentage of capacity has reached the critical threshold (>=90%).
    pub is_critical: bool,
}

const WARNING_LAG_PERCENT: u64 = 50;
const CRITICAL_LAG_PERCENT: u64 = 90;

/// Bounded single-producer, multi-consumer ring buffer over immutable
/// messages (§4.4). `T` must be `Clone` so [`RingBuffer::try_read`] can hand
/// the consumer an owned copy without holding a slot lock across the call.
pub struct RingBuffer<T: Clone + Send + Sync> {
    capacity: usize,
    mask: usize,
    slots: Vec<RwLock<Slot<T>>>,
    published_seq: AtomicU64,
}

impl<T: Clone + Send + Sync> RingBuffer<T> {
    /// Construct a ring buffer with the given power-of-two capacity.
    pub fn new(capacity: usize) -> Result<Self, RingBufferError> {
        if !is_power_of_two(capacity) {
            return Err(RingBufferError::NotPowerOfTwo(capacity));
        }
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || RwLock::new(Slot::default()));
        Ok(Self {
            capacity,
            mask: capacity - 1,
            slots,
            published_seq: AtomicU64::new(0),
        })
    }

    /// Ring capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Highest sequence number published so far (0 if nothing has been published).
    #[must_use]
    pub fn published_seq(&self) -> u64 {
        self.published_seq.load(Ordering::Acquire)
    }

    /// Publish a value, single-producer, wait-free. Writes the slot first,
    /// then advances `published_seq` with release ordering so a consumer
    /// that observes the new sequence is guaranteed to see the slot write.
    pub fn publish(&self, value: T) -> u64 {
        let seq = self.published_seq.load(Ordering::Relaxed) + 1;
        let idx = ((seq - 1) as usize) & self.mask;
        {
            let mut slot = self.slots[idx].write();
            slot.seq = seq;
            slot.value = Some(value);
        }
        self.published_seq.store(seq, Ordering::Release);
        seq
    }

    /// Register a new reader cursor, starting either at the current head
    /// (`start_from_latest`) or from the very beginning of the log.
    #[must_use]
    pub fn subscribe(&self, name: impl Into<String>, start_from_latest: bool) -> Cursor {
        let start = if start_from_latest {
            self.published_seq.load(Ordering::Acquire)
        } else {
            0
        };
        Cursor {
            name: name.into(),
            seq: AtomicU64::new(start),
            lost: AtomicU64::new(0),
        }
    }

    /// Attempt to read the next message for `cursor`. Returns `None` if the
    /// cursor is caught up to `published_seq`. If the cursor has fallen
    /// behind by a full lap, it jumps forward to the oldest still-valid
    /// sequence and records the skipped messages as lost (§4.4 `TryRead`,
    /// §8 scenario 7).
    pub fn try_read(&self, cursor: &Cursor) -> Option<T> {
        let published = self.published_seq.load(Ordering::Acquire);
        let cur = cursor.seq.load(Ordering::Relaxed);
        if cur >= published {
            return None;
        }

        let capacity = self.capacity as u64;
        let lag_distance = published - cur;
        let next_seq = if lag_distance >= capacity {
            let lost = lag_distance - capacity;
            if lost > 0 {
                cursor.lost.fetch_add(lost, Ordering::Relaxed);
            }
            published - capacity + 1
        } else {
            cur + 1
        };

        let idx = ((next_seq - 1) as usize) & self.mask;
        let value = {
            let slot = self.slots[idx].read();
            if slot.seq != next_seq {
                // The producer lapped us again between the check above and
                // taking this lock; nothing valid to return this pass.
                return None;
            }
            slot.value.clone()
        };

        cursor.seq.store(next_seq, Ordering::Relaxed);
        value
    }

    /// Snapshot `cursor`'s standing against the ring (§3 `ConsumerCursor`).
    #[must_use]
    pub fn cursor_stats(&self, cursor: &Cursor) -> CursorStats {
        let published = self.published_seq.load(Ordering::Acquire);
        let current = cursor.seq();
        let lag = published.saturating_sub(current);
        let lag_percent = if self.capacity == 0 {
            0
        } else {
            lag.saturating_mul(100) / self.capacity as u64
        };
        CursorStats {
            name: cursor.name.clone(),
            current_seq: current,
            highest_published: published,
            lag,
            lost_count: cursor.lost_count(),
            is_healthy: lag_percent < WARNING_LAG_PERCENT,
            is_critical: lag_percent >= CRITICAL_LAG_PERCENT,
        }
    }
}
