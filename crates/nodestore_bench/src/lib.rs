//! Shared helpers for the NodeStore benchmarks.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod utils;
