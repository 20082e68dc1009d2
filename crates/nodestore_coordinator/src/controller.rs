//! The I/O controller: sole owner of queueing and assignment.
//!
//! Workers pull. A worker announces `ready-for-work`; if a submission is
//! waiting it is assigned at once, otherwise the worker is parked until the
//! next [`IoController::submit`]. Every decision is made under one mutex, so
//! a descriptor is handed to exactly one worker.

use crate::config::ControllerConfig;
use crate::error::{CoordinatorError, CoordinatorResult, TransportError, TransportResult};
use crate::io::SegmentIo;
use crate::messages::{
    CompletionStatus, IoOutcome, SegmentDescriptor, WorkEnvelope, WorkerMessage,
};
use crate::transport::{ChannelTransport, FrameRouter, Frames, WorkerId};
use crossbeam::channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

type ReplySender = Sender<CoordinatorResult<IoOutcome>>;

/// Runs segment I/O somewhere and waits for the outcome.
pub trait SegmentDispatch: Send + Sync {
    /// Executes one descriptor, blocking until it completes.
    fn dispatch(&self, descriptor: SegmentDescriptor) -> CoordinatorResult<IoOutcome>;
}

/// Runs segment I/O on the calling thread.
#[derive(Debug, Clone)]
pub struct InlineDispatch<S: SegmentIo> {
    io: S,
}

impl<S: SegmentIo> InlineDispatch<S> {
    /// Wraps a segment I/O implementation.
    pub fn new(io: S) -> Self {
        Self { io }
    }
}

impl<S: SegmentIo> SegmentDispatch for InlineDispatch<S> {
    fn dispatch(&self, descriptor: SegmentDescriptor) -> CoordinatorResult<IoOutcome> {
        self.io.execute(&descriptor)
    }
}

/// Counters kept by the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerStats {
    /// Descriptors accepted by `submit`.
    pub submitted: u64,
    /// Descriptors handed to a worker.
    pub assigned: u64,
    /// Assignments completed successfully.
    pub completed: u64,
    /// Assignments that ended in an error.
    pub failed: u64,
}

/// Handle for one submitted descriptor.
#[derive(Debug)]
pub struct PendingIo {
    assignment_id: u64,
    receiver: Receiver<CoordinatorResult<IoOutcome>>,
}

impl PendingIo {
    /// Assignment id given to the descriptor.
    pub fn assignment_id(&self) -> u64 {
        self.assignment_id
    }

    /// Blocks until a worker completes the descriptor.
    pub fn wait(self) -> CoordinatorResult<IoOutcome> {
        self.receiver
            .recv()
            .map_err(|_| CoordinatorError::Shutdown)?
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<CoordinatorResult<IoOutcome>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(CoordinatorError::Shutdown)),
        }
    }
}

struct Queued {
    assignment_id: u64,
    frames: Frames,
    reply: ReplySender,
}

struct InFlight {
    worker: WorkerId,
    reply: ReplySender,
}

struct ControllerState {
    pending: VecDeque<Queued>,
    ready: VecDeque<WorkerId>,
    in_flight: HashMap<u64, InFlight>,
    workers: HashMap<WorkerId, Sender<Frames>>,
    next_worker: WorkerId,
    stats: ControllerStats,
    shut_down: bool,
}

impl ControllerState {
    /// Sends `item` to `worker`. Gives the item back if the worker is gone.
    fn assign(&mut self, worker: WorkerId, item: Queued) -> Result<(), Queued> {
        let Some(outbound) = self.workers.get(&worker) else {
            return Err(item);
        };
        match outbound.send(item.frames) {
            Ok(()) => {
                debug!(worker, assignment_id = item.assignment_id, "assigned");
                self.in_flight.insert(
                    item.assignment_id,
                    InFlight {
                        worker,
                        reply: item.reply,
                    },
                );
                self.stats.assigned += 1;
                Ok(())
            }
            Err(returned) => {
                self.workers.remove(&worker);
                Err(Queued {
                    assignment_id: item.assignment_id,
                    frames: returned.0,
                    reply: item.reply,
                })
            }
        }
    }

    fn is_ready_or_busy(&self, worker: WorkerId) -> bool {
        self.ready.contains(&worker) || self.in_flight.values().any(|f| f.worker == worker)
    }
}

struct Shared {
    config: ControllerConfig,
    next_assignment: AtomicU64,
    state: Mutex<ControllerState>,
}

impl Shared {
    fn on_ready(&self, worker: WorkerId, volume_name: &str) -> TransportResult<()> {
        if volume_name != self.config.volume_name {
            warn!(worker, volume_name, "ready-for-work for another volume");
            return Err(TransportError::Rejected(format!(
                "controller serves volume {}, not {volume_name}",
                self.config.volume_name
            )));
        }

        let mut state = self.state.lock();
        if !state.workers.contains_key(&worker) {
            return Err(TransportError::Disconnected);
        }
        if state.is_ready_or_busy(worker) {
            return Err(TransportError::Rejected(
                "ready-for-work while already ready or busy".into(),
            ));
        }

        match state.pending.pop_front() {
            Some(item) => {
                if let Err(item) = state.assign(worker, item) {
                    state.pending.push_front(item);
                    return Err(TransportError::Disconnected);
                }
            }
            None => state.ready.push_back(worker),
        }
        Ok(())
    }

    fn on_complete(
        &self,
        worker: WorkerId,
        assignment_id: u64,
        outcome: CompletionStatus,
        data: Option<&bytes::Bytes>,
    ) -> TransportResult<()> {
        let mut state = self.state.lock();
        let entry = match state.in_flight.remove(&assignment_id) {
            Some(entry) if entry.worker == worker => entry,
            Some(entry) => {
                state.in_flight.insert(assignment_id, entry);
                warn!(worker, assignment_id, "completion from a worker not holding it");
                return Err(TransportError::Rejected(format!(
                    "assignment {assignment_id} is not held by worker {worker}"
                )));
            }
            None => {
                warn!(worker, assignment_id, "completion for unknown assignment");
                return Err(TransportError::Rejected(format!(
                    "unknown assignment {assignment_id}"
                )));
            }
        };

        let result = match outcome {
            CompletionStatus::Written { offset, length } => Ok(IoOutcome::Written { offset, length }),
            CompletionStatus::Read { length } => {
                let data = data.cloned().unwrap_or_default();
                if data.len() as u64 == length {
                    Ok(IoOutcome::Read { data })
                } else {
                    Err(CoordinatorError::malformed(format!(
                        "read completion declares {length} bytes, carries {}",
                        data.len()
                    )))
                }
            }
            CompletionStatus::Failed { message } => Err(CoordinatorError::IoFailed(message)),
        };
        if result.is_ok() {
            state.stats.completed += 1;
        } else {
            state.stats.failed += 1;
        }
        debug!(worker, assignment_id, ok = result.is_ok(), "completed");
        // The submitter may have stopped waiting.
        let _ = entry.reply.send(result);
        Ok(())
    }
}

impl FrameRouter for Shared {
    fn route(&self, worker: WorkerId, frames: Frames) -> TransportResult<()> {
        let first = frames
            .first()
            .ok_or_else(|| TransportError::Rejected("empty message".into()))?;
        let message = WorkerMessage::from_frame(first).map_err(|err| {
            warn!(worker, error = %err, "unparseable worker message");
            TransportError::Rejected(err.to_string())
        })?;

        match message {
            WorkerMessage::ReadyForWork { volume_name } => self.on_ready(worker, &volume_name),
            WorkerMessage::WorkComplete {
                assignment_id,
                outcome,
                ..
            } => self.on_complete(worker, assignment_id, outcome, frames.get(1)),
        }
    }

    fn disconnect(&self, worker: WorkerId) {
        let mut state = self.state.lock();
        state.workers.remove(&worker);
        state.ready.retain(|w| *w != worker);

        let lost: Vec<u64> = state
            .in_flight
            .iter()
            .filter(|(_, f)| f.worker == worker)
            .map(|(id, _)| *id)
            .collect();
        for assignment_id in lost {
            if let Some(entry) = state.in_flight.remove(&assignment_id) {
                warn!(worker, assignment_id, "worker lost with assignment in flight");
                state.stats.failed += 1;
                let _ = entry.reply.send(Err(CoordinatorError::WorkerLost {
                    worker,
                    assignment_id,
                }));
            }
        }
        debug!(worker, "worker disconnected");
    }
}

/// Hands segment I/O to a pool of pull-based workers.
#[derive(Clone)]
pub struct IoController {
    shared: Arc<Shared>,
}

impl IoController {
    /// Creates a controller with no workers.
    pub fn new(config: ControllerConfig) -> Self {
        info!(volume = %config.volume_name, "io controller starts");
        Self {
            shared: Arc::new(Shared {
                config,
                next_assignment: AtomicU64::new(1),
                state: Mutex::new(ControllerState {
                    pending: VecDeque::new(),
                    ready: VecDeque::new(),
                    in_flight: HashMap::new(),
                    workers: HashMap::new(),
                    next_worker: 1,
                    stats: ControllerStats::default(),
                    shut_down: false,
                }),
            }),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ControllerConfig {
        &self.shared.config
    }

    /// Registers a new worker and returns its transport.
    pub fn connect(&self) -> ChannelTransport {
        let (tx, rx) = unbounded();
        let worker = {
            let mut state = self.shared.state.lock();
            let worker = state.next_worker;
            state.next_worker += 1;
            state.workers.insert(worker, tx);
            worker
        };
        debug!(worker, "worker connected");
        let router: Arc<dyn FrameRouter> = self.shared.clone();
        ChannelTransport::new(worker, router, rx)
    }

    /// Queues a descriptor for the next ready worker.
    ///
    /// # Errors
    ///
    /// - [`CoordinatorError::Shutdown`] after [`shutdown`](Self::shutdown)
    /// - [`CoordinatorError::QueueFull`] if no worker is ready and the
    ///   pending queue is at capacity
    pub fn submit(&self, descriptor: SegmentDescriptor) -> CoordinatorResult<PendingIo> {
        let assignment_id = self.shared.next_assignment.fetch_add(1, Ordering::Relaxed);
        let envelope = WorkEnvelope {
            command: descriptor.operation.command(),
            assignment_id,
        };
        let frames = vec![envelope.to_frame()?, descriptor.marshall()?];
        let (reply, receiver) = bounded(1);
        let mut item = Queued {
            assignment_id,
            frames,
            reply,
        };

        let mut state = self.shared.state.lock();
        if state.shut_down {
            return Err(CoordinatorError::Shutdown);
        }
        while let Some(worker) = state.ready.pop_front() {
            match state.assign(worker, item) {
                Ok(()) => {
                    state.stats.submitted += 1;
                    return Ok(PendingIo {
                        assignment_id,
                        receiver,
                    });
                }
                Err(returned) => item = returned,
            }
        }
        if state.pending.len() >= self.shared.config.max_pending {
            return Err(CoordinatorError::QueueFull {
                capacity: self.shared.config.max_pending,
            });
        }
        state.pending.push_back(item);
        state.stats.submitted += 1;
        Ok(PendingIo {
            assignment_id,
            receiver,
        })
    }

    /// Rejects further submissions and fails everything still queued.
    ///
    /// Assignments already held by workers run to completion.
    pub fn shutdown(&self) {
        let mut state = self.shared.state.lock();
        state.shut_down = true;
        let drained: Vec<Queued> = state.pending.drain(..).collect();
        for item in drained {
            state.stats.failed += 1;
            let _ = item.reply.send(Err(CoordinatorError::Shutdown));
        }
        info!(volume = %self.shared.config.volume_name, "io controller shut down");
    }

    /// Number of submissions waiting for a worker.
    pub fn pending_len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Number of parked workers.
    pub fn ready_workers(&self) -> usize {
        self.shared.state.lock().ready.len()
    }

    /// Number of assignments held by workers.
    pub fn in_flight_len(&self) -> usize {
        self.shared.state.lock().in_flight.len()
    }

    /// Number of connected workers.
    pub fn connected_workers(&self) -> usize {
        self.shared.state.lock().workers.len()
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> ControllerStats {
        self.shared.state.lock().stats.clone()
    }
}

impl SegmentDispatch for IoController {
    fn dispatch(&self, descriptor: SegmentDescriptor) -> CoordinatorResult<IoOutcome> {
        self.submit(descriptor)?.wait()
    }
}
