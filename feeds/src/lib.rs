//! Connector state machine (C7), time-bucketed aggregation (C8), and the
//! order-to-trade-ratio derivation engine (C9) that rides on top of the
//! [`lob`] and [`bus`] crates.

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(dead_code)]
#![deny(unused)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod adapter;
pub mod connector;
pub mod otr;
pub mod series;
pub mod simulated;

pub use adapter::{AdapterResult, ConnectorAdapter};
pub use connector::{Connector, ConnectorError, ConnectorState};
pub use otr::{L3Event, OtrEngine, OtrPoint};
pub use series::{AggregatedSeries, Aggregator, TimestampedPoint};
pub use simulated::{SimulatedAdapter, SimulatedControls};
