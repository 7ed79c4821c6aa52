//! Venue adapter contract (§4.7 supplement). One real implementation exists
//! per exchange (out of scope here, per §1 "exchange-specific JSON schemas")
//! — the connector state machine only ever depends on this trait.

use common::{ConnectorMessage, Snapshot, Symbol};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

/// Errors a [`ConnectorAdapter`] implementation may raise. Transport and
/// protocol failures are carried as `anyhow::Error` at this boundary (§7
/// "application/binary boundaries" use `anyhow`); the connector FSM
/// classifies them into its own typed [`crate::connector::ConnectorError`].
pub type AdapterResult<T> = anyhow::Result<T>;

/// A venue-specific market-data connection, generalized from the teacher's
/// `FeedAdapter` trait (`connect`/`subscribe`/`run`/`disconnect`) with a
/// `fetch_snapshot` step added so the FSM can enforce snapshot-before-delta
/// ordering, and `run`'s sink widened from a fixed update type to the
/// canonical [`ConnectorMessage`] envelope so one FSM serves any venue.
#[async_trait::async_trait]
pub trait ConnectorAdapter: Send + Sync {
    /// Establish the transport connection (socket handshake, auth).
    async fn connect(&mut self) -> AdapterResult<()>;

    /// Request a REST order-book snapshot for one symbol.
    async fn fetch_snapshot(&mut self, symbol: Symbol) -> AdapterResult<Snapshot>;

    /// Subscribe to incremental updates for the given symbols.
    async fn subscribe(&mut self, symbols: Vec<Symbol>) -> AdapterResult<()>;

    /// Pump incoming messages into `tx` until the connection ends or `cancel`
    /// fires. Implementations must race their transport read against
    /// `cancel.notified()` (the connector checks the adapter out of its
    /// shared mutex for the duration of this call, so a `run` that never
    /// returns would otherwise starve the heartbeat loop and block
    /// `stop`/`reconnect` indefinitely).
    async fn run(&mut self, tx: mpsc::Sender<ConnectorMessage>, cancel: Arc<Notify>) -> AdapterResult<()>;

    /// Lightweight liveness probe, used by the 3-second heartbeat (§4.7).
    async fn heartbeat(&mut self) -> AdapterResult<()>;

    /// Tear down the transport connection.
    async fn disconnect(&mut self) -> AdapterResult<()>;
}
