//! Limit order book engine for the market-data plane: sorted price ladders
//! (C1), the snapshot/delta order-book engine (C2), and the object/array
//! pools that keep the ingress/egress path allocation-free (C3).

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(dead_code)]
#![deny(unused)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod book;
pub mod concurrent;
pub mod ladder;
pub mod pool;

pub use book::{BookError, BookState, LevelCounters, OrderBook, VolumeCounters};
pub use concurrent::SharedOrderBook;
pub use ladder::PriceLadder;
pub use pool::{ArrayPool, ObjectPool, PoolStats};
