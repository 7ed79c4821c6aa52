//! An in-process [`ConnectorAdapter`] that plays back a fixed script of
//! messages. Exists so the connector FSM's sequencing and reconnection
//! logic can be exercised without a real socket, the way the teacher's
//! adapter tests substitute a canned transport.

use crate::adapter::{AdapterResult, ConnectorAdapter};
use common::{ConnectorMessage, Snapshot, Symbol, WireLevel};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

/// Shared knobs a test can flip while a [`SimulatedAdapter`] is running.
#[derive(Default)]
pub struct SimulatedControls {
    /// Number of `connect` calls that should fail before one succeeds.
    pub fail_connects: AtomicU32,
    /// Number of `heartbeat` calls that should fail before one succeeds.
    pub fail_heartbeats: AtomicU32,
    connect_count: AtomicU64,
    heartbeat_count: AtomicU64,
}

/// A scripted [`ConnectorAdapter`] for unit tests: serves an empty snapshot
/// for every symbol and then pushes a fixed sequence of messages into the
/// connector's work queue.
pub struct SimulatedAdapter {
    script: Arc<Mutex<Vec<ConnectorMessage>>>,
    controls: Arc<SimulatedControls>,
}

impl SimulatedAdapter {
    /// Build an adapter that will push `script`, in order, once `run` starts.
    #[must_use]
    pub fn new(script: Vec<ConnectorMessage>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script)),
            controls: Arc::new(SimulatedControls::default()),
        }
    }

    /// A handle to the knobs this adapter reads from `connect`/`heartbeat`.
    #[must_use]
    pub fn controls(&self) -> Arc<SimulatedControls> {
        Arc::clone(&self.controls)
    }
}

#[async_trait::async_trait]
impl ConnectorAdapter for SimulatedAdapter {
    async fn connect(&mut self) -> AdapterResult<()> {
        let attempt = self.controls.connect_count.fetch_add(1, Ordering::AcqRel);
        let budget = self.controls.fail_connects.load(Ordering::Acquire) as u64;
        if attempt < budget {
            anyhow::bail!("simulated connect failure {attempt}/{budget}");
        }
        Ok(())
    }

    async fn fetch_snapshot(&mut self, symbol: Symbol) -> AdapterResult<Snapshot> {
        Ok(Snapshot {
            symbol,
            bids: Vec::<WireLevel>::new(),
            asks: Vec::<WireLevel>::new(),
            sequence: 0,
        })
    }

    async fn subscribe(&mut self, _symbols: Vec<Symbol>) -> AdapterResult<()> {
        Ok(())
    }

    async fn run(&mut self, tx: mpsc::Sender<ConnectorMessage>, cancel: Arc<Notify>) -> AdapterResult<()> {
        let script = std::mem::take(&mut *self.script.lock());
        for msg in script {
            tokio::select! {
                result = tx.send(msg) => {
                    if result.is_err() {
                        break;
                    }
                }
                () = cancel.notified() => break,
            }
        }
        Ok(())
    }

    async fn heartbeat(&mut self) -> AdapterResult<()> {
        let attempt = self.controls.heartbeat_count.fetch_add(1, Ordering::AcqRel);
        let budget = self.controls.fail_heartbeats.load(Ordering::Acquire) as u64;
        if attempt < budget {
            anyhow::bail!("simulated heartbeat failure {attempt}/{budget}");
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> AdapterResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{Connector, ConnectorState};
    use common::{ConnectorConfig, ProviderId, RawTrade, Ts};
    use std::collections::HashMap;
    use std::time::Duration;

    fn config(symbol: Symbol) -> ConnectorConfig {
        let mut symbols = HashMap::new();
        symbols.insert(symbol, "TEST".to_string());
        ConnectorConfig {
            symbols,
            max_reconnect_attempts: 2,
            ..ConnectorConfig::default()
        }
    }

    #[tokio::test]
    async fn start_reaches_started_and_populates_book() {
        let symbol = Symbol::new(1);
        let script = vec![ConnectorMessage::Trade(RawTrade {
            symbol,
            price: 100.0,
            size: 1.0,
            is_buy: true,
            server_ts: Ts::from_nanos(1),
        })];
        let adapter = SimulatedAdapter::new(script);
        let bus = bus::TradeBus::new(16).unwrap();
        let connector = Connector::new(ProviderId::new(1), "sim", config(symbol), adapter, bus, bus::NotificationBus::new());

        connector.start().await.unwrap();
        assert_eq!(connector.state(), ConnectorState::Started);
        let book = connector.book(symbol).unwrap();
        assert_eq!(book.read(|b| b.provider_status()), common::ProviderStatus::Connected);

        tokio::time::sleep(Duration::from_millis(50)).await;
        connector.stop().await;
        assert_eq!(connector.state(), ConnectorState::Stopped);
        assert!(connector.book(symbol).is_none());
        assert_eq!(book.read(|b| b.provider_status()), common::ProviderStatus::Disconnected);
    }

    #[tokio::test]
    async fn failed_connect_surfaces_as_cant_connect_and_stopped_failed() {
        let symbol = Symbol::new(1);
        let adapter = SimulatedAdapter::new(Vec::new());
        let controls = adapter.controls();
        controls.fail_connects.store(10, Ordering::Release);
        let bus = bus::TradeBus::new(16).unwrap();
        let notifications = bus::NotificationBus::new();
        let seen = Arc::new(AtomicU32::new(0));
        let seen2 = Arc::clone(&seen);
        let _sub = notifications
            .subscribe("test", move |_: &common::Notification| {
                seen2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        let connector = Connector::new(ProviderId::new(1), "sim", config(symbol), adapter, bus, notifications);

        let err = connector.start().await.unwrap_err();
        assert!(matches!(err, crate::connector::ConnectorError::CantConnect(_)));
        assert_eq!(connector.state(), ConnectorState::StoppedFailed);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
