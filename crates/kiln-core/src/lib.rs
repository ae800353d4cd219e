//! # kiln-core
//!
//! Shared vocabulary for the kiln deployment tools.
//!
//! The model host (the process that owns the weights and runs inference) is
//! an external collaborator. Everything in kiln talks to it through the
//! [`HostApi`] trait defined here, and every failure it reports is a
//! [`HostError`].
//!
//! Provides:
//! - [`HostApi`]: the named host operations consumed by upload and generation
//! - [`GenerationParams`]: sampling parameters for start/continue calls
//! - [`HostError`]: the canonical host failure, including `Unauthorized`

pub mod error;
pub mod host;
pub mod params;

pub use error::HostError;
pub use host::{Blob, Generated, HostApi, TargetId};
pub use params::{GenerationParams, ParamError};

/// Result of a single host call.
pub type HostResult<T> = std::result::Result<T, HostError>;
