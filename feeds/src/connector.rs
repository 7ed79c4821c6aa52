//! Connector state machine (§4.7, C7): owns snapshot-before-delta
//! ordering, reconnection coalescing, and the heartbeat that drives it.

use crate::adapter::ConnectorAdapter;
use common::{
    ConnectorConfig, ConnectorMessage, NotificationLevel, Price, ProviderId, ProviderStatus, Size,
    Symbol, Trade, WorkQueueConfig,
};
use lob::{BookError, OrderBook, SharedOrderBook};
use parking_lot::{Mutex as SyncMutex, RwLock};
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

/// Errors surfaced by the connector state machine (§6 "Errors as values", §7).
#[derive(Debug, thiserror::Error, Clone)]
pub enum ConnectorError {
    /// The venue does not support incremental deltas for this instrument.
    #[error("deltas not supported by exchange")]
    DeltasNotSupportedByExchange,
    /// The venue does not stamp a usable sequence number.
    #[error("sequence numbers not supported by exchange")]
    SequenceNotSupportedByExchange,
    /// The requested scenario (e.g. depth, symbol) isn't supported.
    #[error("scenario not supported by exchange")]
    ScenarioNotSupportedByExchange,
    /// Transport-level connect failed and is not expected to self-heal.
    #[error("cannot connect: {0}")]
    CantConnect(String),
    /// A sequence gap was detected applying a delta (re-exported from the book engine).
    #[error(transparent)]
    Book(#[from] BookError),
    /// A duplicate named subscription was requested.
    #[error("duplicate subscription: {0:?}")]
    DuplicateSubscription(String),
    /// The reconnect budget was exhausted.
    #[error("reconnect attempts exhausted after {0} tries")]
    ReconnectExhausted(u32),
    /// The adapter was checked out by the run loop when a control operation needed it.
    #[error("adapter unavailable")]
    AdapterUnavailable,
}

/// Per-connector lifecycle state (§4.7 state diagram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    /// Constructed, not yet started.
    Loaded,
    /// Connecting, fetching snapshots, not yet serving updates.
    Starting,
    /// Live and serving book/trade updates.
    Started,
    /// Tearing down in response to `stop` or a fatal error.
    Stopping,
    /// Cleanly stopped; can be started again.
    Stopped,
    /// Stopped after exhausting the reconnect budget; requires operator action.
    StoppedFailed,
}

struct Shared {
    state: RwLock<ConnectorState>,
    config: ConnectorConfig,
    books: RwLock<FxHashMap<Symbol, SharedOrderBook>>,
    provider: ProviderId,
    provider_name: String,
    bus: bus::TradeBus,
    notifications: bus::NotificationBus,
    reconnecting: AtomicBool,
    heartbeat_failures: AtomicU32,
    /// Bumped by every `start()`/successful reconnect cycle. Background
    /// loops spawned by an older generation compare against this and retire
    /// quietly instead of running alongside their replacement (§5
    /// "all long-running tasks take a cancellation signal" generalized to
    /// "stale generations self-retire" so `reconnect` never piles up
    /// duplicate heartbeat/run loops).
    generation: AtomicU64,
    /// Notified on `stop()` (permanently, alongside `cancelled`) and on every
    /// reconnect (transiently, to retire the current generation's run loop
    /// without tearing the whole connector down).
    cancel: Arc<Notify>,
    cancelled: AtomicBool,
    /// Signalled by `trigger_reconnect` to wake the reconnect supervisor
    /// spawned in `start()` (§4.7 "drives reconnection on any fatal error").
    reconnect_signal: Arc<Notify>,
    work_queue: RwLock<Option<Arc<bus::WorkQueue<ConnectorMessage>>>>,
    /// The currently-running `spawn_run_loop_for` task, if any. Awaited by
    /// `stop`/`run_reconnect` before touching the adapter, so control
    /// operations never race the run loop's own check-out/check-in of it.
    run_handle: SyncMutex<Option<JoinHandle<()>>>,
}

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(3);
const HEARTBEAT_FAILURE_THRESHOLD: u32 = 5;

/// Drives one venue adapter through the connector lifecycle for a fixed set
/// of symbols, applying its messages to per-symbol order books and
/// publishing trades onto the shared [`bus::TradeBus`] (§4.7, data flow in §2).
pub struct Connector<A: ConnectorAdapter + 'static> {
    shared: Arc<Shared>,
    /// `None` while the run loop has it checked out for streaming (§5 "the
    /// streaming loop must not hold the adapter mutex" — see
    /// `spawn_run_loop_for`); `Some` otherwise, including while idle.
    adapter: Arc<AsyncMutex<Option<A>>>,
}

impl<A: ConnectorAdapter + 'static> Connector<A> {
    /// Construct a connector for `provider`, not yet started (`LOADED`).
    /// `notifications` is where `STOPPED_FAILED` transitions and other
    /// operator-facing events are raised (§6 `Notification`); pass a fresh
    /// [`bus::NotificationBus`] if the embedding application has no shared
    /// one to reuse.
    #[must_use]
    pub fn new(
        provider: ProviderId,
        provider_name: impl Into<String>,
        config: ConnectorConfig,
        adapter: A,
        bus: bus::TradeBus,
        notifications: bus::NotificationBus,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(ConnectorState::Loaded),
                config,
                books: RwLock::new(FxHashMap::default()),
                provider,
                provider_name: provider_name.into(),
                bus,
                notifications,
                reconnecting: AtomicBool::new(false),
                heartbeat_failures: AtomicU32::new(0),
                generation: AtomicU64::new(0),
                cancel: Arc::new(Notify::new()),
                cancelled: AtomicBool::new(false),
                reconnect_signal: Arc::new(Notify::new()),
                work_queue: RwLock::new(None),
                run_handle: SyncMutex::new(None),
            }),
            adapter: Arc::new(AsyncMutex::new(Some(adapter))),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectorState {
        *self.shared.state.read()
    }

    /// A shared handle to the book for `symbol`, if it has been created by a
    /// successful `start`.
    #[must_use]
    pub fn book(&self, symbol: Symbol) -> Option<SharedOrderBook> {
        self.shared.books.read().get(&symbol).cloned()
    }

    /// The notification channel this connector raises `STOPPED_FAILED` and
    /// backpressure events on (§6 `Notification`).
    #[must_use]
    pub fn notifications(&self) -> bus::NotificationBus {
        self.shared.notifications.clone()
    }

    fn set_state(&self, state: ConnectorState) {
        *self.shared.state.write() = state;
    }

    /// Bring the connector up: connect, snapshot every configured symbol in
    /// order, then start streaming deltas (§4.7 "Snapshot/delta ordering").
    /// A non-recoverable failure here (e.g. `CantConnect`) moves the
    /// connector straight to `STOPPED_FAILED` and surfaces a notification,
    /// per the `STARTING ──non-recoverable──▶ STOPPED_FAILED` edge (§4.7
    /// state diagram) — distinct from a failure mid-`reconnect`, which still
    /// has backoff attempts left to try.
    pub async fn start(&self) -> Result<(), ConnectorError> {
        match Self::start_with(&self.shared, &self.adapter).await {
            Ok(()) => Ok(()),
            Err(err) => {
                *self.shared.state.write() = ConnectorState::StoppedFailed;
                self.shared.notifications.notify(
                    NotificationLevel::Error,
                    "connector",
                    format!("{} failed to start: {err}", self.shared.provider_name),
                );
                Err(err)
            }
        }
    }

    fn apply_message(shared: &Arc<Shared>, msg: ConnectorMessage) {
        match msg {
            ConnectorMessage::Snapshot(snapshot) => {
                let books = shared.books.read();
                if let Some(book) = books.get(&snapshot.symbol) {
                    book.write(|b| {
                        if let Err(err) = b.apply_snapshot(&snapshot) {
                            tracing::warn!(symbol = %snapshot.symbol, error = %err, "snapshot re-apply failed");
                        }
                    });
                }
            }
            ConnectorMessage::Delta(delta) => {
                let books = shared.books.read();
                if let Some(book) = books.get(&delta.symbol) {
                    match book.write(|b| b.apply_delta_batch(&delta)) {
                        Ok(()) => {}
                        Err(BookError::SequenceGap { symbol, expected, got }) => {
                            tracing::warn!(%symbol, expected, got, "sequence gap detected, scheduling resync");
                            Shared::trigger_reconnect(shared);
                        }
                        Err(err) => {
                            tracing::warn!(symbol = %delta.symbol, error = %err, "delta rejected");
                        }
                    }
                }
            }
            ConnectorMessage::Trade(raw) => {
                let books = shared.books.read();
                let mid = books.get(&raw.symbol).and_then(|b| b.read(OrderBook::mid));
                let trade = Trade {
                    symbol: raw.symbol,
                    price: Price::from_f64(raw.price, 4),
                    size: Size::from_f64(raw.size, 0),
                    is_buy: raw.is_buy,
                    server_ts: raw.server_ts,
                    provider: shared.provider,
                    mid_price_at_trade: mid,
                };
                shared.bus.publish(bus::BusEvent::Trade(trade));
            }
            ConnectorMessage::Heartbeat => {
                shared.heartbeat_failures.store(0, Ordering::Relaxed);
            }
            ConnectorMessage::SubscriptionAck(ack) => {
                tracing::debug!(symbol = %ack.symbol, "subscription acknowledged");
            }
            ConnectorMessage::Error(err) => {
                tracing::error!(code = %err.code, message = %err.message, "venue reported an error");
            }
        }
    }

    /// Stop the connector: halt the heartbeat, disconnect the adapter, and
    /// release book state, in the order §5 specifies.
    pub async fn stop(&self) {
        self.set_state(ConnectorState::Stopping);
        self.shared.cancelled.store(true, Ordering::Release);
        self.shared.cancel.notify_waiters();

        // Wait for the run loop to observe the cancellation and check the
        // adapter back in before we try to lock it — otherwise a streaming
        // adapter's `run` would still hold it checked out and `disconnect`
        // would silently skip (see `spawn_run_loop_for`).
        if let Some(handle) = self.shared.run_handle.lock().take() {
            let _ = handle.await;
        }

        {
            let mut guard = self.adapter.lock().await;
            if let Some(adapter) = guard.as_mut() {
                if let Err(err) = adapter.disconnect().await {
                    tracing::warn!(error = %err, "adapter disconnect failed during stop");
                }
            }
        }

        // Pause first so nothing new gets applied while we drain; dropping
        // the last `Arc` runs `WorkQueue::drop`, which blocks up to 2s for
        // the consumer thread to finish whatever it was mid-handling.
        if let Some(queue) = self.shared.work_queue.write().take() {
            queue.pause();
            drop(queue);
        }

        // Mark every book disconnected before dropping it from the map, so a
        // caller holding a `SharedOrderBook` clone (via `Connector::book`)
        // observes the transition instead of a status frozen at `Connected`.
        Shared::mark_all_books(&self.shared, ProviderStatus::Disconnected);
        self.shared.books.write().clear();
        self.set_state(ConnectorState::Stopped);
    }

    /// Attempt the configured number of reconnects with exponential backoff
    /// and jitter (§4.7 "Reconnection retry policy"). Coalesced: concurrent
    /// callers collapse onto the single in-flight attempt.
    pub async fn reconnect(&self) -> Result<(), ConnectorError> {
        Self::run_reconnect(&self.shared, &self.adapter).await
    }

    /// Shared reconnect body used both by the public [`Self::reconnect`] and
    /// the background supervisor woken by [`Shared::trigger_reconnect`].
    async fn run_reconnect(
        shared: &Arc<Shared>,
        adapter: &Arc<AsyncMutex<Option<A>>>,
    ) -> Result<(), ConnectorError> {
        if shared.reconnecting.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        *shared.state.write() = ConnectorState::Stopping;
        Shared::mark_all_books(shared, ProviderStatus::Disconnected);

        // Retire this generation's run loop (if any is still checked out
        // streaming) before touching the adapter, same as `stop`.
        shared.cancel.notify_waiters();
        if let Some(handle) = shared.run_handle.lock().take() {
            let _ = handle.await;
        }

        {
            let mut guard = adapter.lock().await;
            if let Some(a) = guard.as_mut() {
                let _ = a.disconnect().await;
            }
        }

        let max_attempts = shared.config.max_reconnect_attempts;
        let mut attempt = 0u32;
        let result = loop {
            if attempt >= max_attempts {
                break Err(ConnectorError::ReconnectExhausted(max_attempts));
            }
            attempt += 1;
            let backoff_ms = backoff_with_jitter(attempt);
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;

            *shared.state.write() = ConnectorState::Starting;
            match Self::start_with(shared, adapter).await {
                Ok(()) => break Ok(()),
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "reconnect attempt failed");
                }
            }
        };

        shared.reconnecting.store(false, Ordering::Release);
        match &result {
            Ok(()) => {}
            Err(err) => {
                *shared.state.write() = ConnectorState::StoppedFailed;
                Shared::mark_all_books(shared, ProviderStatus::DisconnectedFailed);
                tracing::error!(error = %err, "reconnect budget exhausted, giving up");
                shared.notifications.notify(
                    NotificationLevel::Error,
                    "connector",
                    format!("{} exhausted its reconnect budget: {err}", shared.provider_name),
                );
            }
        }
        result
    }

    /// The body of [`Self::start`], usable from contexts that only hold
    /// `Shared`/`adapter` (the reconnect path) rather than a full `&Self`.
    async fn start_with(
        shared: &Arc<Shared>,
        adapter: &Arc<AsyncMutex<Option<A>>>,
    ) -> Result<(), ConnectorError> {
        *shared.state.write() = ConnectorState::Starting;
        let my_generation = shared.generation.fetch_add(1, Ordering::AcqRel) + 1;

        let symbols: Vec<Symbol> = shared.config.symbols.keys().copied().collect();

        {
            let mut lock = adapter.lock().await;
            let guard = lock.as_mut().ok_or(ConnectorError::AdapterUnavailable)?;
            guard
                .connect()
                .await
                .map_err(|e| ConnectorError::CantConnect(e.to_string()))?;
            guard
                .subscribe(symbols.clone())
                .await
                .map_err(|e| ConnectorError::CantConnect(e.to_string()))?;

            for &symbol in &symbols {
                let snapshot = guard
                    .fetch_snapshot(symbol)
                    .await
                    .map_err(|e| ConnectorError::CantConnect(e.to_string()))?;
                let mut book = OrderBook::new(
                    symbol,
                    shared.provider,
                    shared.provider_name.clone(),
                    4,
                    0,
                    shared.config.depth_levels as usize,
                );
                book.set_provider_status(ProviderStatus::Connected);
                book.apply_snapshot(&snapshot)?;
                shared.books.write().insert(symbol, SharedOrderBook::new(book));
            }
        }

        let (net_tx, mut net_rx) = mpsc::channel::<ConnectorMessage>(1024);
        let apply_shared = Arc::clone(shared);
        let queue = Arc::new(bus::WorkQueue::new(WorkQueueConfig::default(), move |msg: ConnectorMessage| {
            Self::apply_message(&apply_shared, msg);
        }));
        queue.attach_notifications(shared.notifications.clone());
        queue.pause();

        let bridge_queue = Arc::clone(&queue);
        tokio::spawn(async move {
            while let Some(msg) = net_rx.recv().await {
                bridge_queue.add(msg);
            }
        });

        queue.resume();
        *shared.work_queue.write() = Some(queue);

        Self::spawn_run_loop_for(shared, adapter, net_tx, my_generation);
        Self::spawn_heartbeat_loop_for(shared, adapter, my_generation);
        Self::spawn_reconnect_supervisor_for(shared, adapter, my_generation);

        *shared.state.write() = ConnectorState::Started;
        Ok(())
    }

    /// Checks the adapter out of `adapter` for the duration of `run`, so the
    /// mutex is never held while the adapter streams — only while it is
    /// being taken out and put back. This is what lets `spawn_heartbeat_loop_for`,
    /// `stop`, and `reconnect` make progress instead of blocking on a lock a
    /// long-lived `run` would otherwise hold forever (§4.7, §5 "long-running
    /// tasks take a cancellation signal"). `run` is handed a clone of
    /// `shared.cancel` and is expected to race its transport read against it
    /// so it returns promptly once `stop`/`reconnect` fires.
    fn spawn_run_loop_for(
        shared: &Arc<Shared>,
        adapter: &Arc<AsyncMutex<Option<A>>>,
        tx: mpsc::Sender<ConnectorMessage>,
        generation: u64,
    ) {
        let adapter = Arc::clone(adapter);
        let shared = Arc::clone(shared);
        let handle = tokio::spawn(async move {
            let checked_out = adapter.lock().await.take();
            let Some(mut a) = checked_out else {
                tracing::warn!("adapter already checked out, run loop exiting");
                return;
            };

            let cancel = Arc::clone(&shared.cancel);
            let result = a.run(tx, cancel).await;
            *adapter.lock().await = Some(a);

            if let Err(err) = result {
                if shared.generation.load(Ordering::Acquire) != generation {
                    return;
                }
                tracing::warn!(error = %err, "adapter run loop ended");
                Shared::trigger_reconnect(&shared);
            }
        });
        *shared.run_handle.lock() = Some(handle);
    }

    fn spawn_heartbeat_loop_for(shared: &Arc<Shared>, adapter: &Arc<AsyncMutex<Option<A>>>, generation: u64) {
        let adapter = Arc::clone(adapter);
        let shared = Arc::clone(shared);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    () = shared.cancel.notified() => break,
                }
                if shared.cancelled.load(Ordering::Acquire) {
                    break;
                }
                if shared.generation.load(Ordering::Acquire) != generation {
                    break;
                }
                // The adapter is briefly `None` while the run loop has it
                // checked out for streaming (see `spawn_run_loop_for`); skip
                // this tick rather than block on it; messages still flowing
                // through `run` reset `heartbeat_failures` on their own via
                // `ConnectorMessage::Heartbeat`.
                let result = {
                    let mut guard = adapter.lock().await;
                    match guard.as_mut() {
                        Some(a) => Some(a.heartbeat().await),
                        None => None,
                    }
                };
                match result {
                    Some(Ok(())) => {
                        shared.heartbeat_failures.store(0, Ordering::Relaxed);
                    }
                    Some(Err(err)) => {
                        let failures = shared.heartbeat_failures.fetch_add(1, Ordering::AcqRel) + 1;
                        tracing::warn!(error = %err, failures, "heartbeat failed");
                        if failures >= HEARTBEAT_FAILURE_THRESHOLD {
                            Shared::trigger_reconnect(&shared);
                            break;
                        }
                    }
                    None => {}
                }
            }
        });
    }

    fn spawn_reconnect_supervisor_for(shared: &Arc<Shared>, adapter: &Arc<AsyncMutex<Option<A>>>, generation: u64) {
        let adapter = Arc::clone(adapter);
        let shared = Arc::clone(shared);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shared.reconnect_signal.notified() => {}
                    () = shared.cancel.notified() => break,
                }
                if shared.cancelled.load(Ordering::Acquire) {
                    break;
                }
                if shared.generation.load(Ordering::Acquire) != generation {
                    break;
                }
                let _ = Self::run_reconnect(&shared, &adapter).await;
                break;
            }
        });
    }
}

impl Shared {
    /// Stamp `status` onto every currently-tracked book (§6
    /// `ProviderStatusChanged`). Books are read through their shared handle
    /// so a consumer holding a clone from [`Connector::book`] sees the
    /// transition even after the connector drops its own reference.
    fn mark_all_books(shared: &Arc<Shared>, status: ProviderStatus) {
        for book in shared.books.read().values() {
            book.write(|b| b.set_provider_status(status));
        }
    }

    /// Marks a fatal condition and wakes the reconnect supervisor, which
    /// coalesces any number of concurrent triggers onto the single
    /// in-flight attempt guarded by `reconnecting` (§4.7 "Reconnection
    /// coalescing"): exceptions raised while a reconnect is already running
    /// are logged here and otherwise dropped, never stacking a second retry
    /// loop on top of the first.
    fn trigger_reconnect(shared: &Arc<Shared>) {
        if shared.reconnecting.load(Ordering::Acquire) {
            tracing::debug!("reconnect already in flight, coalescing");
            return;
        }
        tracing::warn!("reconnect scheduled after a fatal condition");
        shared.reconnect_signal.notify_one();
    }
}

/// Exponential backoff with full jitter, in milliseconds, for attempt `n` (1-based).
fn backoff_with_jitter(attempt: u32) -> u64 {
    let base = 200u64.saturating_mul(1u64 << attempt.min(10));
    let capped = base.min(30_000);
    rand::Rng::gen_range(&mut rand::thread_rng(), 0..=capped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_stays_bounded() {
        for attempt in 1..=12 {
            let delay = backoff_with_jitter(attempt);
            assert!(delay <= 30_000);
        }
    }
}
