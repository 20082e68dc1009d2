//! # NodeStore Testkit
//!
//! Test utilities for NodeStore.
//!
//! This crate provides:
//! - Test fixtures and storage node helpers
//! - Property-based test generators using proptest
//! - Fuzz testing harnesses
//! - Stress testing utilities for the worker pool and request handler
//! - Wire-format test vectors
//!
//! ## Usage
//!
//! ```rust,ignore
//! use nodestore_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_node() {
//!     with_temp_node(|node| {
//!         let segments = segment_payloads("obj", 2);
//!         node.archive("obj", 1, &segments);
//!         assert_eq!(node.retrieve("obj", 1, 2).unwrap(), segments);
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod fuzz;
pub mod generators;
pub mod stress;
pub mod vectors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::fuzz::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
    pub use crate::vectors::*;
}

pub use fixtures::*;
pub use fuzz::*;
pub use generators::*;
pub use stress::*;
pub use vectors::*;
