//! # NodeStore Server
//!
//! Request handling for one storage node volume.
//!
//! This crate provides:
//! - Sequencing of archive and retrieve "next" calls per request-id
//! - The record index, persisted as an append-only record log
//! - Handlers that turn every outcome into a typed reply
//! - A [`NodeServer`] facade that also speaks the encoded request envelope
//!
//! # Architecture
//!
//! ```text
//!  request bytes ──▶ NodeServer ──▶ RequestHandler ──▶ RequestTracker
//!                                        │
//!                                        ├──▶ RecordIndex ──▶ record log
//!                                        └──▶ SegmentDispatch ──▶ worker pool ──▶ volume
//! ```
//!
//! # Sequencing
//!
//! A transfer is identified by its request-id. Its first call must carry
//! segment 0 and each following call the next segment:
//! - a segment already handled is a duplicate
//! - a segment past the expected one is out of sequence and leaves the
//!   transfer waiting for the expected segment
//! - an archive segment whose segment count differs from segment 0's is
//!   rejected
//! - any other failure rewinds the transfer, so the same request-id can send
//!   the failed segment again
//!
//! A retrieve of version 0 resolves the latest version on segment 0 and
//! reads every later segment from that same version.
//!
//! Archive replies use `error_out_of_sequence` and `error_invalid_duplicate`.
//! Retrieve has no out-of-sequence code and reports it as `error_exception`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod index;
mod server;
mod tracker;

pub use config::{
    ServerConfig, DEFAULT_COMPLETED_REQUEST_CAPACITY, DEFAULT_MAX_ACTIVE_TRANSFERS,
    DEFAULT_MAX_SEGMENT_SIZE,
};
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use index::{replay_log, IndexEntry, LogReplay, RecordIndex, SegmentLocation};
pub use server::NodeServer;
pub use tracker::{Direction, RequestTracker, SequenceError};
