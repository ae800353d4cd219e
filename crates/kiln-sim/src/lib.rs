//! # kiln-sim
//!
//! An in-process model host for tests and dry runs.
//!
//! Behaves like a deployed llama2 host: owner-only uploads, `initialize`
//! decodes the model header and sizes the host, generation admits a caller
//! only while one more run state fits the memory budget, a start with a
//! prompt only ingests the prompt, and stories have a fixed length so the
//! continue loop terminates. [`Faults`] injects the
//! failures the upload and generation paths must survive.

pub mod config;
pub mod host;
pub mod story;

pub use config::{Faults, SimConfig};
pub use host::{Caller, SimClient, SimHost, CALL_LOG_LIMIT};
