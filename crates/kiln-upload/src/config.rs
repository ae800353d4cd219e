//! Upload configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chunk::ChunkSize;

fn default_chunk_size_mib() -> f64 {
    1.9
}

fn default_ack_timeout_ms() -> u64 {
    30_000
}

fn default_ready_timeout_ms() -> u64 {
    120_000
}

fn default_poll_interval_ms() -> u64 {
    500
}

/// Optional pre-flight capacity check against the host budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityCheck {
    /// Total host memory available for the model and all callers.
    pub budget_bytes: u64,
    /// Concurrent callers the deployment must be able to serve.
    pub callers: u64,
}

/// Knobs for one deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Upper bound on one upload message, in MiB. Fractions allowed.
    #[serde(default = "default_chunk_size_mib")]
    pub chunk_size_mib: f64,

    /// Deadline for the host to acknowledge a reset or a chunk.
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,

    /// Deadline for the host to report ready after `initialize`.
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,

    /// Delay between `is_ready` polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub capacity: Option<CapacityCheck>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size_mib: default_chunk_size_mib(),
            ack_timeout_ms: default_ack_timeout_ms(),
            ready_timeout_ms: default_ready_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            capacity: None,
        }
    }
}

impl UploadConfig {
    /// Chunk size in bytes, or `None` if the configured MiB value is not positive.
    pub fn chunk_size(&self) -> Option<ChunkSize> {
        ChunkSize::from_mib(self.chunk_size_mib)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}
