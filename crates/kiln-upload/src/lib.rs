//! # kiln-upload
//!
//! Moves a tokenizer and a model into a model host in bounded chunks.
//!
//! ```text
//! is_healthy ─▶ reset_tokenizer ─▶ chunk… ─▶ reset_model ─▶ chunk… ─▶ initialize ─▶ is_ready*
//! ```
//!
//! Each blob follows the lifecycle in [`lifecycle`]; the deployment as a whole
//! is driven by [`Deployer`]. Every step waits for the host's acknowledgment
//! under a deadline, and the first failure aborts.

pub mod chunk;
pub mod config;
pub mod deploy;
pub mod error;
pub mod lifecycle;
pub mod source;

pub use chunk::{chunks, Chunk, ChunkSize, Chunks};
pub use config::{CapacityCheck, UploadConfig};
pub use deploy::{BlobReport, DeployReport, Deployer};
pub use error::{DeployError, Result};
pub use lifecycle::{BlobStage, BlobState, LifecycleError, SessionStage, UploadSession};
pub use source::read_blob;
