//! # NodeStore Storage
//!
//! Append-only byte stores used by a NodeStore node.
//!
//! A node keeps two kinds of data on a volume:
//! - segment bytes, appended by I/O workers and read back by offset
//! - the record log, one encoded content record per accepted segment
//!
//! Backends do not interpret either. They hand out offsets on append and
//! return exactly those bytes on read.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For tests and throwaway volumes
//! - [`FileBackend`] - For persistent volumes using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use nodestore_storage::{StorageBackend, InMemoryBackend};
//!
//! let backend = InMemoryBackend::new();
//! let offset = backend.append(b"segment bytes").unwrap();
//! let data = backend.read_at(offset, 13).unwrap();
//! assert_eq!(&data, b"segment bytes");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{SharedBackend, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
