//! Cooperative cancellation shared by a worker and whoever stops it.

use crossbeam::channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable halt token.
///
/// Triggering sets a flag checked once per worker loop and closes a channel,
/// which wakes every receive blocked in [`HaltSignal::waiter`].
#[derive(Debug, Clone)]
pub struct HaltSignal {
    inner: Arc<HaltInner>,
}

#[derive(Debug)]
struct HaltInner {
    halted: AtomicBool,
    trigger: Mutex<Option<Sender<()>>>,
    waiter: Receiver<()>,
}

impl HaltSignal {
    /// Creates an untriggered signal.
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            inner: Arc::new(HaltInner {
                halted: AtomicBool::new(false),
                trigger: Mutex::new(Some(tx)),
                waiter: rx,
            }),
        }
    }

    /// Requests a halt. Idempotent.
    pub fn trigger(&self) {
        self.inner.halted.store(true, Ordering::SeqCst);
        self.inner.trigger.lock().take();
    }

    /// Returns true once [`trigger`](Self::trigger) has been called.
    pub fn is_set(&self) -> bool {
        self.inner.halted.load(Ordering::SeqCst)
    }

    /// A receiver that becomes ready (disconnected) when the halt fires.
    ///
    /// Intended for use in a `select!` next to the channel being read.
    pub fn waiter(&self) -> &Receiver<()> {
        &self.inner.waiter
    }
}

impl Default for HaltSignal {
    fn default() -> Self {
        Self::new()
    }
}
