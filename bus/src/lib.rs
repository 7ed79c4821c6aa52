//! Fan-out and intake primitives for the market-data plane: the lock-free
//! multicast ring buffer (C4), the trade/quote bus built on top of it (C5),
//! the work queue that decouples network callbacks from the book engine
//! (C6), and the in-process `Notification` fan-out channel (§6/§AMBIENT).

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(dead_code)]
#![deny(unused)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod notifications;
pub mod ring;
pub mod tradebus;
pub mod workqueue;

pub use notifications::{NotificationBus, NotificationSubscription};
pub use ring::{Cursor, CursorStats, RingBuffer, RingBufferError};
pub use tradebus::{BusError, BusEvent, SubscriptionHandle, TradeBus};
pub use workqueue::WorkQueue;
