//! The pull-based I/O worker.
//!
//! A worker loops: announce `ready-for-work`, block until the controller
//! assigns something, perform the I/O, report `work-complete`, repeat. It
//! holds at most one assignment at a time.
//!
//! Stopping is cooperative. The halt flag is checked at the top of every
//! iteration and the blocking receive wakes when the halt fires; an
//! interrupted receive during a requested halt is a normal exit. Any other
//! error is reported once to the event sink and the worker exits with
//! [`WorkerExit::Failed`].

use crate::config::WorkerConfig;
use crate::error::{CoordinatorError, CoordinatorResult, TransportError};
use crate::events::{EventSink, UNHANDLED_EXCEPTION_TOPIC};
use crate::halt::HaltSignal;
use crate::io::SegmentIo;
use crate::messages::{
    CompletionStatus, IoOutcome, SegmentDescriptor, WorkEnvelope, WorkerMessage,
};
use crate::transport::{Frames, WorkerTransport};
use bytes::Bytes;
use tracing::{debug, error, info, warn};

/// Where a worker is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Announced ready and waiting for an assignment.
    Requesting,
    /// Performing the I/O of an assignment.
    Processing,
    /// Shut down; the transport and event sink are closed.
    Terminating,
}

/// How a worker ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Halt requested, or the loop ended on its own.
    Normal,
    /// An unhandled error was reported.
    Failed,
}

impl WorkerExit {
    /// Process exit status.
    pub fn code(self) -> i32 {
        match self {
            WorkerExit::Normal => 0,
            WorkerExit::Failed => 1,
        }
    }
}

/// One member of a volume's I/O worker pool.
pub struct IoWorker<T: WorkerTransport, S: SegmentIo, E: EventSink> {
    config: WorkerConfig,
    transport: T,
    io: S,
    events: E,
    halt: HaltSignal,
    state: WorkerState,
    completed: u64,
}

impl<T: WorkerTransport, S: SegmentIo, E: EventSink> IoWorker<T, S, E> {
    /// Creates a worker. Nothing is sent until [`run`](Self::run).
    pub fn new(config: WorkerConfig, transport: T, io: S, events: E, halt: HaltSignal) -> Self {
        Self {
            config,
            transport,
            io,
            events,
            halt,
            state: WorkerState::Requesting,
            completed: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Number of assignments completed.
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Runs until halted or until an unhandled error.
    ///
    /// The transport and event sink are closed before this returns, whatever
    /// the outcome.
    pub fn run(&mut self) -> WorkerExit {
        info!(
            volume = %self.config.volume_name,
            index = self.config.worker_index,
            node = %self.config.node_name,
            "io worker starts"
        );

        let result = self.work_loop();
        self.state = WorkerState::Terminating;

        let exit = match result {
            Ok(()) => {
                info!("io worker terminates normally");
                WorkerExit::Normal
            }
            Err(CoordinatorError::Transport(TransportError::Interrupted))
                if self.halt.is_set() =>
            {
                info!("io worker terminates normally with interrupted receive");
                WorkerExit::Normal
            }
            Err(err) => {
                error!(error = %err, kind = err.kind(), "error processing request");
                self.events
                    .exception(UNHANDLED_EXCEPTION_TOPIC, &err.to_string(), err.kind());
                WorkerExit::Failed
            }
        };

        self.transport.close();
        self.events.close();
        exit
    }

    fn work_loop(&mut self) -> CoordinatorResult<()> {
        while !self.halt.is_set() {
            self.state = WorkerState::Requesting;
            self.send_ready()?;

            debug!("waiting for work assignment");
            let frames = self.transport.recv_multipart(&self.halt)?;

            self.state = WorkerState::Processing;
            self.process(frames)?;
        }
        Ok(())
    }

    fn send_ready(&self) -> CoordinatorResult<()> {
        let message = WorkerMessage::ReadyForWork {
            volume_name: self.config.volume_name.clone(),
        };
        self.transport.send(vec![message.to_frame()?])?;
        Ok(())
    }

    fn process(&mut self, frames: Frames) -> CoordinatorResult<()> {
        let [envelope, descriptor]: [Bytes; 2] = frames.try_into().map_err(|f: Frames| {
            CoordinatorError::malformed(format!(
                "work assignment must have 2 frames, got {}",
                f.len()
            ))
        })?;
        let envelope = WorkEnvelope::from_frame(&envelope)?;
        let descriptor = SegmentDescriptor::unmarshall(&descriptor)?;
        if envelope.command != descriptor.operation.command() {
            return Err(CoordinatorError::malformed(format!(
                "command {:?} does not match descriptor operation",
                envelope.command
            )));
        }
        debug!(
            assignment_id = envelope.assignment_id,
            key = %descriptor.key,
            version = descriptor.version_number,
            segment = descriptor.segment_number,
            "processing assignment"
        );

        let (outcome, data) = match self.io.execute(&descriptor) {
            Ok(IoOutcome::Written { offset, length }) => {
                (CompletionStatus::Written { offset, length }, Bytes::new())
            }
            Ok(IoOutcome::Read { data }) => (
                CompletionStatus::Read {
                    length: data.len() as u64,
                },
                data,
            ),
            Err(err) => {
                warn!(
                    assignment_id = envelope.assignment_id,
                    error = %err,
                    "segment I/O failed"
                );
                (
                    CompletionStatus::Failed {
                        message: err.to_string(),
                    },
                    Bytes::new(),
                )
            }
        };

        let complete = WorkerMessage::WorkComplete {
            volume_name: self.config.volume_name.clone(),
            assignment_id: envelope.assignment_id,
            outcome,
        };
        self.transport.send(vec![complete.to_frame()?, data])?;
        self.completed += 1;
        Ok(())
    }
}
