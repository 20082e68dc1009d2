//! # NodeStore Protocol
//!
//! Request and reply messages for sequenced, multi-part archive and
//! retrieve transfers.
//!
//! A client writes or reads a large object as a series of "next" calls that
//! share one [`RequestId`]. Each call is answered by a typed reply carrying a
//! result code, and either a payload or an error message.
//!
//! ## Reply layout
//!
//! Every reply starts with the 32 ASCII hex bytes of the request-id and one
//! result byte. What follows depends on the reply type and the result:
//!
//! - archive success: nothing
//! - retrieve success: the raw segment bytes
//! - any error: a length-prefixed message
//!
//! Ordering is not checked here; the storage node decides whether a segment
//! number is in sequence and answers with the matching error code.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod archive;
mod error;
mod header;
mod request;
mod request_id;
mod retrieve;

pub use archive::{ArchiveKeyNext, ArchiveKeyNextReply, ArchiveResult, MAX_SEGMENT_COUNT};
pub use error::{ProtocolError, ProtocolResult};
pub use header::REPLY_HEADER_SIZE;
pub use request::{peek_request_id, Request, ARCHIVE_KEY_NEXT_KIND, RETRIEVE_KEY_NEXT_KIND};
pub use request_id::{RequestId, REQUEST_ID_LEN};
pub use retrieve::{RetrieveKeyNext, RetrieveKeyNextReply, RetrieveResult};
