//! # kiln-session
//!
//! Resumable story generation against a model host.
//!
//! A story is produced by one `start_generation` call followed by
//! `continue_generation` calls until [`classify`] reports a terminal
//! verdict. [`GenerationSession`] steps one story; [`SessionRegistry`] keeps
//! one session per target and lets different targets run concurrently.

pub mod error;
pub mod generation;
pub mod registry;
pub mod termination;

pub use error::{GenerationError, Result};
pub use generation::{GenerationSession, StoryOutcome};
pub use registry::SessionRegistry;
pub use termination::{classify, Verdict};
