//! Core types, configuration and time shapes shared by the market-data plane.
//!
//! This crate is deliberately I/O-free and has no notion of a specific
//! venue's wire format — it only carries the internal canonical shapes that
//! the LOB engine ([`lob`]), fan-out bus ([`bus`]) and connector FSM
//! ([`feeds`]) agree on.

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(dead_code)]
#![deny(unused)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod clock;
pub mod config;
pub mod market;
pub mod types;

pub use clock::{Clock, SystemClock, TestClock};
pub use config::{AggregationLevel, ConnectorConfig, Environment, RingBufferConfig, WorkQueueConfig};
pub use market::{
    BookLevel, ConnectorMessage, Delta, DeltaAction, DeltaLevel, ExchangeError, Notification,
    NotificationLevel, ProviderStatus, RawTrade, Snapshot, SubscriptionAck, Trade, WireLevel,
};
pub use types::{DecimalPlaces, Price, ProviderId, Side, Size, Symbol, Ts};
