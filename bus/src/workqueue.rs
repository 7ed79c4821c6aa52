//! Work queue (§4.6, C6): an unbounded MPSC intake queue with a single
//! consumer thread, pause/resume, clear, and depth-threshold warnings. Sits
//! between network-callback threads and the book engine so a slow book
//! apply never blocks the socket read loop.

use crate::notifications::NotificationBus;
use common::{NotificationLevel, WorkQueueConfig};
use crossbeam::channel::{self, RecvTimeoutError};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const STOP_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Out-of-band control signals, delivered on their own channel so `pause`
/// never blocks `clear`/`stop` behind buffered data items.
enum Control {
    Clear,
    Stop,
}

struct Shared {
    depth: AtomicUsize,
    paused: AtomicBool,
    stopped: AtomicBool,
    finished: AtomicBool,
    config: WorkQueueConfig,
    notifications: RwLock<Option<NotificationBus>>,
}

/// An unbounded, single-consumer work queue (§4.6).
pub struct WorkQueue<T: Send + 'static> {
    sender: channel::Sender<T>,
    control: channel::Sender<Control>,
    shared: Arc<Shared>,
    worker_thread: Thread,
}

impl<T: Send + 'static> WorkQueue<T> {
    /// Spawn the consumer thread and start accepting work. `handler` runs
    /// on the dedicated consumer thread for every item, in FIFO order,
    /// except while paused.
    pub fn new(config: WorkQueueConfig, mut handler: impl FnMut(T) + Send + 'static) -> Self {
        let (sender, receiver) = channel::unbounded::<T>();
        let (control, control_rx) = channel::unbounded::<Control>();
        let shared = Arc::new(Shared {
            depth: AtomicUsize::new(0),
            paused: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            config,
            notifications: RwLock::new(None),
        });
        let worker_shared = Arc::clone(&shared);

        let join = thread::Builder::new()
            .name("work-queue".to_string())
            .spawn(move || {
                'outer: loop {
                    while let Ok(signal) = control_rx.try_recv() {
                        match signal {
                            Control::Clear => {
                                let mut cleared = 0usize;
                                while receiver.try_recv().is_ok() {
                                    cleared += 1;
                                }
                                worker_shared.depth.fetch_sub(cleared, Ordering::AcqRel);
                            }
                            Control::Stop => break 'outer,
                        }
                    }

                    if worker_shared.paused.load(Ordering::Acquire) {
                        thread::park_timeout(POLL_INTERVAL);
                        continue;
                    }

                    match receiver.recv_timeout(POLL_INTERVAL) {
                        Ok(item) => {
                            handler(item);
                            worker_shared.depth.fetch_sub(1, Ordering::AcqRel);
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break 'outer,
                    }
                }
                worker_shared.finished.store(true, Ordering::Release);
            })
            .expect("failed to spawn work-queue consumer thread");

        let worker_thread = join.thread().clone();
        // The thread is intentionally not joined here; `stop` waits on the
        // `finished` flag instead so callers get the bounded 2s drain wait
        // from §4.6 without blocking forever on a misbehaving handler.
        std::mem::forget(join);

        Self { sender, control, shared, worker_thread }
    }

    /// Route depth-threshold warnings onto `bus` in addition to the
    /// structured log record (§4.6 "the system logs and raises a
    /// notification"). Optional: a queue with nothing attached just logs.
    pub fn attach_notifications(&self, bus: NotificationBus) {
        *self.shared.notifications.write() = Some(bus);
    }

    /// Enqueue an item. Never blocks; the queue is unbounded.
    pub fn add(&self, item: T) {
        if self.sender.send(item).is_err() {
            return;
        }
        let depth = self.shared.depth.fetch_add(1, Ordering::AcqRel) + 1;
        self.check_thresholds(depth);
        if !self.shared.paused.load(Ordering::Acquire) {
            self.worker_thread.unpark();
        }
    }

    /// Current queue depth (items enqueued but not yet handled).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.shared.depth.load(Ordering::Acquire)
    }

    /// Stop invoking the handler. Items keep enqueuing; nothing is dropped.
    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::Release);
    }

    /// Resume invoking the handler at full rate.
    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::Release);
        self.worker_thread.unpark();
    }

    /// Discard everything currently buffered without invoking the handler.
    pub fn clear(&self) {
        let _ = self.control.send(Control::Clear);
        self.worker_thread.unpark();
    }

    /// Mark no-more-writes, wake the consumer, and wait up to 2s for it to
    /// drain and exit (§4.6 `stop`). Idempotent.
    pub fn stop(&self) {
        if self.shared.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.control.send(Control::Stop);
        self.worker_thread.unpark();

        let deadline = Instant::now() + STOP_DRAIN_TIMEOUT;
        while !self.shared.finished.load(Ordering::Acquire) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
    }

    fn check_thresholds(&self, depth: usize) {
        let (level, text) = if depth >= self.shared.config.critical_threshold {
            tracing::error!(depth, threshold = self.shared.config.critical_threshold, "work queue depth critical");
            (NotificationLevel::Error, format!("work queue depth {depth} at or above critical threshold"))
        } else if depth >= self.shared.config.warning_threshold {
            tracing::warn!(depth, threshold = self.shared.config.warning_threshold, "work queue depth above warning threshold");
            (NotificationLevel::Warning, format!("work queue depth {depth} above warning threshold"))
        } else {
            return;
        };
        if let Some(bus) = self.shared.notifications.read().as_ref() {
            bus.notify(level, "backpressure", text);
        }
    }
}

impl<T: Send + 'static> Drop for WorkQueue<T> {
    fn drop(&mut self) {
        self.stop();
    }
}
