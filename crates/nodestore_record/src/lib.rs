//! # NodeStore Record
//!
//! The binary content record: one metadata entry per stored segment.
//!
//! A record has a fixed 58-byte big-endian header followed by a
//! length-prefixed file name. Numeric fields wider than their wire width
//! are masked on encode (see [`truncate`]); decoding rejects any format
//! version other than [`CURRENT_FORMAT_VERSION`].
//!
//! ## Usage
//!
//! ```
//! use nodestore_record::{ContentFields, ContentRecord};
//!
//! let record = ContentRecord::from_fields(ContentFields {
//!     timestamp: 1_700_000_000,
//!     version_number: 1,
//!     segment_number: 0,
//!     segment_count: 1,
//!     segment_size: 5,
//!     total_size: 5,
//!     adler32: 0x062C_0215,
//!     md5: [0u8; 16],
//!     file_name: "hello.txt".into(),
//! });
//!
//! let bytes = record.encode().unwrap();
//! let (decoded, end) = ContentRecord::decode(&bytes, 0).unwrap();
//! assert_eq!(decoded, record);
//! assert_eq!(end, bytes.len());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod error;
pub mod marshalling;
mod record;
pub mod truncate;

pub use codec::{decode, decode_all, encode, encode_into, HEADER_SIZE};
pub use error::{RecordError, RecordResult};
pub use record::{ContentFields, ContentRecord, CURRENT_FORMAT_VERSION, EMPTY_MD5};
