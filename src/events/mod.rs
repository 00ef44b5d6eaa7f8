//! Soft-limit event bus.
//!
//! The broker reports every subscriber add/remove as a signed delta; the
//! bus tracks the aggregate crossing a threshold and fans the resulting
//! edge-triggered event out to registered sinks from a single dedicated
//! worker thread, so a slow or blocking sink never stalls the packet
//! fan-out path.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;

/// A soft-limit crossing, reported once per crossing (not per connection).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitEvent {
    /// The aggregate connection count crossed the soft limit upward.
    LimitHit,
    /// The aggregate connection count crossed back below the soft limit.
    LimitMiss,
}

type Handler = Box<dyn Fn(LimitEvent) + Send>;

/// Bounded capacity of the dispatcher's internal queue. Once full, further
/// notifications are dropped rather than blocking the broker that produced
/// them — the bus reports *that* a threshold was crossed, not a precise
/// log of every crossing.
const QUEUE_CAPACITY: usize = 256;

/// Registered-handler dispatcher for [`LimitEvent`]s.
pub struct EventBus {
    soft_limit: i64,
    aggregate: AtomicI64,
    tx: SyncSender<LimitEvent>,
    handlers: Arc<Mutex<Vec<Handler>>>,
}

impl EventBus {
    /// Start the bus's background dispatcher. `soft_limit <= 0` disables
    /// crossing detection entirely (every `notify_connect` is a no-op).
    #[must_use]
    pub fn start(soft_limit: i64) -> Self {
        let (tx, rx): (SyncSender<LimitEvent>, Receiver<LimitEvent>) = sync_channel(QUEUE_CAPACITY);
        let handlers: Arc<Mutex<Vec<Handler>>> = Arc::new(Mutex::new(Vec::new()));
        let worker_handlers = Arc::clone(&handlers);
        thread::spawn(move || {
            for event in rx {
                let handlers = worker_handlers.lock().unwrap_or_else(|e| e.into_inner());
                for handler in handlers.iter() {
                    handler(event);
                }
            }
        });
        Self { soft_limit, aggregate: AtomicI64::new(0), tx, handlers }
    }

    /// Register a sink. Sinks may block; they run sequentially on the
    /// bus's single dispatcher thread.
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(LimitEvent) + Send + 'static,
    {
        self.handlers.lock().unwrap_or_else(|e| e.into_inner()).push(Box::new(handler));
    }

    /// Report a subscriber add (`+1`) or remove (`-1`). Fires [`LimitEvent`]
    /// only on the transition across `soft_limit`, never on every call.
    pub fn notify_connect(&self, delta: i64) {
        if self.soft_limit <= 0 {
            self.aggregate.fetch_add(delta, Ordering::SeqCst);
            return;
        }
        let before = self.aggregate.fetch_add(delta, Ordering::SeqCst);
        let after = before + delta;
        let event = if before < self.soft_limit && after >= self.soft_limit {
            Some(LimitEvent::LimitHit)
        } else if before >= self.soft_limit && after < self.soft_limit {
            Some(LimitEvent::LimitMiss)
        } else {
            None
        };
        if let Some(event) = event {
            // Non-blocking: a saturated dispatcher queue drops the event
            // rather than stalling the broker's add/remove path.
            let _ = self.tx.try_send(event);
        }
    }
}
