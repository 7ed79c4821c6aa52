//! In-process notification events (§6 `Notification`, §AMBIENT "Notification
//! events (not sinks)"): a push-style fan-out of `Notification` values with
//! no destination (UI, file, webhook) implemented — only the in-process
//! channel the embedding application subscribes to. Mirrors
//! [`crate::tradebus::TradeBus`]'s copy-on-write subscriber-list pattern so
//! dispatch never holds a lock across a handler call.

use crate::tradebus::BusError;
use common::{Notification, NotificationLevel};
use parking_lot::RwLock;
use std::sync::Arc;

type Handler = dyn Fn(&Notification) -> anyhow::Result<()> + Send + Sync;

#[derive(Clone)]
struct Subscriber {
    name: String,
    handler: Arc<Handler>,
}

struct Inner {
    subscribers: RwLock<Arc<Vec<Subscriber>>>,
}

/// Fan-out channel for `Notification` events raised by the core (sequence
/// gaps, reconnect exhaustion, backpressure warnings). Cheaply cloneable;
/// every clone shares the same subscriber list.
#[derive(Clone)]
pub struct NotificationBus(Arc<Inner>);

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBus {
    /// Construct an empty notification bus.
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(Inner {
            subscribers: RwLock::new(Arc::new(Vec::new())),
        }))
    }

    /// Raise a notification, dispatching it to every registered subscriber
    /// and isolating a handler failure the same way [`crate::TradeBus`]
    /// does: log it and keep delivering to the rest (§7 "Subscriber
    /// exception").
    pub fn publish(&self, notification: Notification) {
        let subscribers = self.0.subscribers.read().clone();
        for sub in subscribers.iter() {
            if let Err(err) = (sub.handler)(&notification) {
                tracing::warn!(subscriber = %sub.name, error = %err, "notification subscriber failed, continuing dispatch");
            }
        }
    }

    /// Convenience over [`Self::publish`] for the common case of a one-line message.
    pub fn notify(&self, level: NotificationLevel, category: impl Into<String>, text: impl Into<String>) {
        self.publish(Notification::new(level, category, text));
    }

    /// Register a subscriber. Rejects a duplicate name rather than silently
    /// deduplicating, matching [`crate::TradeBus::subscribe`]'s policy.
    pub fn subscribe(
        &self,
        name: impl Into<String>,
        handler: impl Fn(&Notification) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Result<NotificationSubscription, BusError> {
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
        Ok(NotificationSubscription {
            bus: Arc::clone(&self.0),
            name,
        })
    }

    /// Remove a subscriber by name, idempotent if already absent.
    pub fn unsubscribe(&self, name: &str) {
        Inner::remove(&self.0, name);
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

/// A live notification subscription. Dropping it unregisters the handler.
pub struct NotificationSubscription {
    bus: Arc<Inner>,
    name: String,
}

impl NotificationSubscription {
    /// Explicitly unsubscribe. Equivalent to dropping the handle.
    pub fn dispose(self) {}
}

impl Drop for NotificationSubscription {
    fn drop(&mut self) {
        Inner::remove(&self.bus, &self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn subscriber_receives_published_notification() {
        let bus = NotificationBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = Arc::clone(&seen);
        let _h = bus
            .subscribe("s1", move |n: &Notification| {
                assert_eq!(n.category, "backpressure");
                seen2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        bus.notify(NotificationLevel::Warning, "backpressure", "queue depth high");
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn duplicate_subscription_is_rejected() {
        let bus = NotificationBus::new();
        let _h1 = bus.subscribe("dup", |_| Ok(())).unwrap();
        let err = bus.subscribe("dup", |_| Ok(())).unwrap_err();
        assert_eq!(err, BusError::DuplicateSubscription("dup".into()));
    }

    #[test]
    fn subscriber_error_does_not_block_others() {
        let bus = NotificationBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        let _h1 = bus.subscribe("failing", |_| anyhow::bail!("boom")).unwrap();
        let _h2 = bus
            .subscribe("counting", move |_| {
                hits2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        bus.notify(NotificationLevel::Info, "cat", "text");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let bus = NotificationBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = Arc::clone(&seen);
        let sub = bus
            .subscribe("transient", move |_| {
                seen2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        drop(sub);
        bus.notify(NotificationLevel::Info, "cat", "text");
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }
}
