//! # NodeStore Coordinator
//!
//! Pull-based I/O worker pool for one storage volume.
//!
//! This crate provides:
//! - The worker/controller messages (`ready-for-work`, `work-assignment`,
//!   `work-complete`) and the binary segment descriptor
//! - A frame transport with a cancellable blocking receive
//! - The [`IoController`], which owns every queueing and assignment decision
//! - The [`IoWorker`] loop and its exit codes
//! - Exception event sinks
//!
//! ## Architecture
//!
//! ```text
//!  submit(descriptor)            ready-for-work
//!  ──────────────────▶ IoController ◀─────────── IoWorker ──▶ SegmentIo
//!  ◀────── PendingIo   (one mutex)  ───────────▶  (thread)      (volume)
//!                                   work-assignment
//! ```
//!
//! ## Key Invariants
//!
//! - A worker holds at most one assignment
//! - A descriptor is assigned to exactly one worker
//! - A worker that disconnects fails its assignment instead of losing it
//! - A halt during a blocked receive is a clean exit, never an error event

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod controller;
mod error;
mod events;
mod halt;
mod io;
mod messages;
mod transport;
mod worker;

pub use config::{ControllerConfig, WorkerConfig, DEFAULT_NODE_NAME, LOG_DIR_VAR, NODE_NAME_VAR};
pub use controller::{ControllerStats, InlineDispatch, IoController, PendingIo, SegmentDispatch};
pub use error::{CoordinatorError, CoordinatorResult, TransportError, TransportResult};
pub use events::{Event, EventSink, MemoryEventSink, TracingEventSink, UNHANDLED_EXCEPTION_TOPIC};
pub use halt::HaltSignal;
pub use io::{SegmentIo, VolumeIo};
pub use messages::{
    CompletionStatus, ControllerMessage, IoCommand, IoOperation, IoOutcome, SegmentDescriptor,
    WorkEnvelope, WorkerMessage,
};
pub use transport::{ChannelTransport, FrameRouter, Frames, WorkerId, WorkerTransport};
pub use worker::{IoWorker, WorkerExit, WorkerState};
