//! Deployment errors.

use std::path::PathBuf;
use std::time::Duration;

use kiln_core::{Blob, HostError};
use kiln_sizer::MalformedHeader;

use crate::lifecycle::LifecycleError;

/// Why a deployment stopped.
///
/// The first failure aborts the whole deployment; nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("cannot read {blob} source {}: {source}", .path.display())]
    SourceUnreadable {
        blob: Blob,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("chunk size must be positive, got {0} MiB")]
    InvalidChunkSize(f64),

    #[error("{blob} source is empty")]
    EmptySource { blob: Blob },

    #[error("host reported itself unhealthy")]
    Unhealthy,

    #[error("health check failed: {0}")]
    HealthCheck(#[source] HostError),

    #[error("{blob} upload rejected at offset {offset}: {source}")]
    ChunkRejected {
        blob: Blob,
        offset: usize,
        #[source]
        source: HostError,
    },

    #[error("{blob} chunk at offset {offset} not acknowledged within {timeout:?}")]
    AckTimeout { blob: Blob, offset: usize, timeout: Duration },

    #[error("initialize rejected: {0}")]
    InitializeRejected(#[source] HostError),

    #[error("readiness check failed: {0}")]
    ReadinessCheck(#[source] HostError),

    #[error("host not ready after {waited:?}")]
    ActivationTimeout { waited: Duration },

    #[error("unauthorized to {operation}")]
    Unauthorized { operation: &'static str },

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Header(#[from] MalformedHeader),

    #[error("model needs {required} bytes for the configured callers, budget is {budget}")]
    WontFit { required: u64, budget: u64 },
}

impl DeployError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, DeployError::Unauthorized { .. })
    }

    /// Offset at which the upload stopped, for chunk-level failures.
    pub fn failing_offset(&self) -> Option<(Blob, usize)> {
        match self {
            DeployError::ChunkRejected { blob, offset, .. }
            | DeployError::AckTimeout { blob, offset, .. } => Some((*blob, *offset)),
            _ => None,
        }
    }

    /// Wrap a host error raised by `operation`, lifting `Unauthorized` out.
    pub(crate) fn from_host(operation: &'static str, err: HostError, other: impl FnOnce(HostError) -> Self) -> Self {
        if err.is_unauthorized() {
            DeployError::Unauthorized { operation }
        } else {
            other(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, DeployError>;
