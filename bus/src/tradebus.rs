//! Trade/quote fan-out bus (§4.5, C5): a process-wide facade over one
//! [`RingBuffer`] carrying both trade and order-book events under a single
//! monotonic sequence, plus push-style subscriber dispatch with per-message
//! error isolation.

use crate::ring::{Cursor, CursorStats, RingBuffer, RingBufferError};
use common::Trade;
use lob::OrderBook;
use parking_lot::RwLock;
use std::sync::Arc;

/// Errors raised managing bus subscriptions.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum BusError {
    /// A subscriber with this name is already registered.
    #[error("subscriber {0:?} is already registered")]
    DuplicateSubscription(String),
    /// Ring buffer construction failed.
    #[error(transparent)]
    Ring(#[from] RingBufferError),
}

/// One message published onto the bus: an executed trade or a new order
/// book state, carried under one global sequence (§4.5 supplement).
#[derive(Clone)]
pub enum BusEvent {
    /// An executed trade.
    Trade(Trade),
    /// A fresh order-book state, shared zero-copy with every subscriber.
    BookUpdate(Arc<OrderBook>),
}

type Handler = dyn Fn(&BusEvent) -> anyhow::Result<()> + Send + Sync;

#[derive(Clone)]
struct Subscriber {
    name: String,
    handler: Arc<Handler>,
}

struct Inner {
    ring: RingBuffer<BusEvent>,
    subscribers: RwLock<Arc<Vec<Subscriber>>>,
}

/// Fan-out facade over the raw ring buffer (§4.5).
#[derive(Clone)]
pub struct TradeBus(Arc<Inner>);

impl TradeBus {
    /// Construct a bus backed by a ring of the given power-of-two capacity.
    pub fn new(capacity: usize) -> Result<Self, BusError> {
        Ok(Self(Arc::new(Inner {
            ring: RingBuffer::new(capacity)?,
            subscribers: RwLock::new(Arc::new(Vec::new())),
        })))
    }

    /// Publish a trade or book-update event. Writes it onto the underlying
    /// ring (for pull-based consumers) and synchronously dispatches it to
    /// every registered push subscriber, isolating and logging any handler
    /// failure rather than letting it interrupt delivery to the rest
    /// (§4.5, §7 "Subscriber exception").
    pub fn publish(&self, event: BusEvent) -> u64 {
        let seq = self.0.ring.publish(event.clone());
        let subscribers = self.0.subscribers.read().clone();
        for sub in subscribers.iter() {
            if let Err(err) = (sub.handler)(&event) {
                tracing::warn!(subscriber = %sub.name, error = %err, "bus subscriber failed, continuing dispatch");
            }
        }
        seq
    }

    /// Register a push subscriber. Rejects a duplicate name rather than
    /// silently deduplicating (see Open Question resolution in DESIGN.md).
    pub fn subscribe(
        &self,
        name: impl Into<String>,
        handler: impl Fn(&BusEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Result<SubscriptionHandle, BusError> {
        let name = name.into();
        let mut guard = self.0.subscribers.write();
        if guard.iter().any(|s| s.name == name) {
            return Err(BusError::DuplicateSubscription(name));
        }
        let mut next: Vec<Subscriber> = (**guard).clone();
        next.push(Subscriber {
            name: name.clone(),
            handler: Arc::new(handler),
        });
        *guard = Arc::new(next);
        Ok(SubscriptionHandle {
            bus: Arc::clone(&self.0),
            name,
        })
    }

    /// Remove a push subscriber by name, idempotent if already absent.
    pub fn unsubscribe(&self, name: &str) {
        Inner::remove(&self.0, name);
    }

    /// Register a pull-based cursor over the raw event log, for consumers
    /// that want to pace themselves rather than be pushed to.
    #[must_use]
    pub fn subscribe_cursor(&self, name: impl Into<String>, start_from_latest: bool) -> Cursor {
        self.0.ring.subscribe(name, start_from_latest)
    }

    /// Pull the next event for a cursor registered via [`Self::subscribe_cursor`].
    pub fn try_read(&self, cursor: &Cursor) -> Option<BusEvent> {
        self.0.ring.try_read(cursor)
    }

    /// Health snapshot for a cursor.
    #[must_use]
    pub fn cursor_stats(&self, cursor: &Cursor) -> CursorStats {
        self.0.ring.cursor_stats(cursor)
    }
}

impl Inner {
    fn remove(inner: &Arc<Inner>, name: &str) {
        let mut guard = inner.subscribers.write();
        if !guard.iter().any(|s| s.name == name) {
            return;
        }
        let next: Vec<Subscriber> = guard.iter().filter(|s| s.name != name).cloned().collect();
        *guard = Arc::new(next);
    }
}

/// A live push-subscription. Dropping it unregisters the handler; an
/// explicit [`SubscriptionHandle::dispose`] is also provided for symmetry
/// with call sites that prefer an explicit disposal call.
pub struct SubscriptionHandle {
    bus: Arc<Inner>,
    name: String,
}

impl SubscriptionHandle {
    /// Explicitly unsubscribe. Equivalent to dropping the handle.
    pub fn dispose(self) {}
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        Inner::remove(&self.bus, &self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Price, ProviderId, Side, Size, Symbol, Ts};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn trade() -> Trade {
        Trade {
            symbol: Symbol::new(1),
            price: Price::from_f64(1.0, 4),
            size: Size::from_f64(1.0, 0),
            is_buy: true,
            server_ts: Ts::from_nanos(1),
            provider: ProviderId::new(1),
            mid_price_at_trade: None,
        }
    }

    #[test]
    fn duplicate_subscription_is_rejected() {
        let bus = TradeBus::new(16).unwrap();
        let _h1 = bus.subscribe("s1", |_| Ok(())).unwrap();
        let err = bus.subscribe("s1", |_| Ok(())).unwrap_err();
        assert_eq!(err, BusError::DuplicateSubscription("s1".into()));
    }

    #[test]
    fn subscriber_error_does_not_block_others() {
        let bus = TradeBus::new(16).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        let _h1 = bus.subscribe("failing", |_| anyhow::bail!("boom")).unwrap();
        let _h2 = bus
            .subscribe("counting", move |_| {
                hits2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        bus.publish(BusEvent::Trade(trade()));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_handle_unsubscribes() {
        let bus = TradeBus::new(16).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        let handle = bus
            .subscribe("transient", move |_| {
                hits2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        drop(handle);
        bus.publish(BusEvent::Trade(trade()));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cursor_consumer_sees_published_events() {
        let bus = TradeBus::new(16).unwrap();
        let cursor = bus.subscribe_cursor("puller", false);
        bus.publish(BusEvent::Trade(trade()));
        assert!(bus.try_read(&cursor).is_some());
        assert!(bus.try_read(&cursor).is_none());
    }
}
