//! # Priority-ordered event bus with two delivery paths.
//!
//! ```text
//!                      publish(LifecycleEvent)
//!                               │
//!              ┌────────────────┴─────────────────┐
//!        is_blocking()                       otherwise
//!              │                                  │
//!   await each listener in priority      try_send ► [bounded queue] ► worker
//!   order (caller waits; safety first)            │ full → FAILED waits for room,
//!                                                 │        others dropped + counted
//!              │                                  ▼
//!   return to caller, which then         worker awaits each listener
//!   commits the transition               in priority order, FIFO
//! ```
//!
//! ## Guarantees
//! - Listener order is fixed at construction (stable sort on priority).
//! - Deferred events are delivered in enqueue order by a single worker.
//! - A panicking listener is logged and skipped; the rest still run.
//! - Publishing a deferred event waits only when the queue is full and the
//!   event is FAILED; FAILED events are never dropped while the bus is open.
//!
//! ## Non-guarantees
//! - A blocking event may overtake deferred events still sitting in the queue.
//!   Use `seq` to restore global order.
//! - Deferred events other than FAILED are dropped when the queue is full.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::{EventKind, LifecycleEvent, Listener};

enum Deferred {
    Event(Arc<LifecycleEvent>),
    Flush(oneshot::Sender<()>),
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    blocking: AtomicU64,
    deferred: AtomicU64,
    dropped: AtomicU64,
    listener_panics: AtomicU64,
}

/// Point-in-time bus counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BusStats {
    /// Events handed to `publish`.
    pub published: u64,
    /// Events delivered synchronously.
    pub blocking: u64,
    /// Events accepted by the deferred queue.
    pub deferred: u64,
    /// Events dropped because the queue was full or closed.
    pub dropped: u64,
    /// Listener invocations that panicked.
    pub listener_panics: u64,
}

/// Fan-out of lifecycle events to a fixed, priority-ordered set of listeners.
pub struct EventBus {
    listeners: Arc<[Arc<dyn Listener>]>,
    tx: Mutex<Option<mpsc::Sender<Deferred>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl EventBus {
    /// Creates the bus and spawns its deferred-delivery worker.
    ///
    /// Must be called from within a Tokio runtime. `capacity` is clamped to 1.
    pub fn new(mut listeners: Vec<Arc<dyn Listener>>, capacity: usize) -> Self {
        listeners.sort_by_key(|l| l.priority());
        let listeners: Arc<[Arc<dyn Listener>]> = listeners.into();
        let counters = Arc::new(Counters::default());

        let (tx, mut rx) = mpsc::channel::<Deferred>(capacity.max(1));
        let worker_listeners = Arc::clone(&listeners);
        let worker_counters = Arc::clone(&counters);

        let handle = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                match msg {
                    Deferred::Event(ev) => {
                        for l in worker_listeners.iter() {
                            deliver(l.as_ref(), &ev, &worker_counters).await;
                        }
                    }
                    Deferred::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });

        Self {
            listeners,
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(handle)),
            counters,
        }
    }

    /// Publishes one event.
    ///
    /// Blocking events are delivered to every listener before this returns.
    /// Other events are enqueued; this returns immediately.
    pub async fn publish(&self, event: LifecycleEvent) {
        self.counters.published.fetch_add(1, Ordering::Relaxed);
        if event.is_blocking() {
            self.counters.blocking.fetch_add(1, Ordering::Relaxed);
            for l in self.listeners.iter() {
                deliver(l.as_ref(), &event, &self.counters).await;
            }
        } else {
            self.enqueue(event).await;
        }
    }

    async fn enqueue(&self, event: LifecycleEvent) {
        let tx = self.tx.lock().clone();
        let Some(tx) = tx else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(service = %event.service, kind = %event.kind, "event bus closed; event dropped");
            return;
        };
        match tx.try_send(Deferred::Event(Arc::new(event))) {
            Ok(()) => {
                self.counters.deferred.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(Deferred::Event(ev)))
                if ev.kind == EventKind::Failed =>
            {
                debug!(
                    service = %ev.service,
                    seq = ev.seq,
                    "event queue full; waiting to enqueue FAILED"
                );
                let counter = match tx.send(Deferred::Event(ev)).await {
                    Ok(()) => &self.counters.deferred,
                    Err(_) => &self.counters.dropped,
                };
                counter.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(Deferred::Event(ev))) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    service = %ev.service,
                    kind = %ev.kind,
                    seq = ev.seq,
                    "event queue full; event dropped"
                );
            }
            Err(_) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Waits until every event enqueued before this call has been delivered.
    pub async fn flush(&self) {
        let tx = self.tx.lock().clone();
        let Some(tx) = tx else { return };
        let (done_tx, done_rx) = oneshot::channel();
        if tx.send(Deferred::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Closes the queue and waits for the worker to drain it.
    ///
    /// Later deferred events are dropped; blocking delivery keeps working.
    pub async fn shutdown(&self) {
        drop(self.tx.lock().take());
        let handle = self.worker.lock().take();
        if let Some(h) = handle {
            let _ = h.await;
        }
    }

    /// Current counters.
    pub fn stats(&self) -> BusStats {
        let c = &self.counters;
        BusStats {
            published: c.published.load(Ordering::Relaxed),
            blocking: c.blocking.load(Ordering::Relaxed),
            deferred: c.deferred.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            listener_panics: c.listener_panics.load(Ordering::Relaxed),
        }
    }

    /// Listener names in dispatch order.
    pub fn listener_names(&self) -> Vec<&'static str> {
        self.listeners.iter().map(|l| l.name()).collect()
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn deliver(listener: &dyn Listener, event: &LifecycleEvent, counters: &Counters) {
    let fut = listener.on_event(event);
    if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
        counters.listener_panics.fetch_add(1, Ordering::Relaxed);
        let info = panic_message(panic_err.as_ref());
        error!(
            listener = listener.name(),
            service = %event.service,
            kind = %event.kind,
            panic = %info,
            "listener panicked"
        );
    }
}
