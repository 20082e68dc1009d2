//! Frame transport between a worker and its controller.

use crate::error::{TransportError, TransportResult};
use crate::halt::HaltSignal;
use bytes::Bytes;
use crossbeam::channel::{select, Receiver};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A multi-part message.
pub type Frames = Vec<Bytes>;

/// Identifies one connected worker within a controller.
pub type WorkerId = u64;

/// The worker's end of a connection to the controller.
///
/// A transport is owned by exactly one worker and is closed on every exit
/// path of that worker.
pub trait WorkerTransport: Send {
    /// Sends one multi-part message. Never blocks on the peer.
    fn send(&self, frames: Frames) -> TransportResult<()>;

    /// Blocks until a multi-part message arrives.
    ///
    /// Returns [`TransportError::Interrupted`] as soon as `halt` fires.
    fn recv_multipart(&self, halt: &HaltSignal) -> TransportResult<Frames>;

    /// Closes the transport. Idempotent.
    fn close(&self);
}

/// The controller's side: receives every frame a worker sends.
pub trait FrameRouter: Send + Sync {
    /// Handles a message from `worker`.
    fn route(&self, worker: WorkerId, frames: Frames) -> TransportResult<()>;

    /// Called once when `worker` closes its transport.
    fn disconnect(&self, worker: WorkerId);
}

/// In-process transport over crossbeam channels.
///
/// Outbound messages are routed straight into the controller; inbound
/// messages arrive on a channel the controller holds the sender of.
pub struct ChannelTransport {
    worker: WorkerId,
    router: Arc<dyn FrameRouter>,
    inbound: Receiver<Frames>,
    closed: AtomicBool,
}

impl ChannelTransport {
    /// Creates a transport for `worker`.
    pub fn new(worker: WorkerId, router: Arc<dyn FrameRouter>, inbound: Receiver<Frames>) -> Self {
        Self {
            worker,
            router,
            inbound,
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the worker id this transport was issued for.
    pub fn worker_id(&self) -> WorkerId {
        self.worker
    }

    /// Returns true once closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl WorkerTransport for ChannelTransport {
    fn send(&self, frames: Frames) -> TransportResult<()> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.router.route(self.worker, frames)
    }

    fn recv_multipart(&self, halt: &HaltSignal) -> TransportResult<Frames> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if halt.is_set() {
            return Err(TransportError::Interrupted);
        }
        select! {
            recv(self.inbound) -> frames => frames.map_err(|_| TransportError::Disconnected),
            recv(halt.waiter()) -> _ => Err(TransportError::Interrupted),
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.router.disconnect(self.worker);
        }
    }
}

impl Drop for ChannelTransport {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ChannelTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelTransport")
            .field("worker", &self.worker)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
