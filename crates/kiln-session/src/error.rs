//! Generation errors.

use kiln_core::{HostError, ParamError, TargetId};

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("invalid generation parameters: {0}")]
    InvalidParams(#[from] ParamError),

    /// The host claimed a full step budget but returned no text.
    #[error("host reported {tokens_produced} of {steps} tokens with empty text")]
    Inconsistency { tokens_produced: u32, steps: u32 },

    #[error("unauthorized to {operation}")]
    Unauthorized { operation: &'static str },

    #[error("{operation} failed: {source}")]
    Host {
        operation: &'static str,
        #[source]
        source: HostError,
    },

    #[error("a generation session for {target} is still running")]
    SessionActive { target: TargetId },

    #[error("no generation session for {target}")]
    UnknownTarget { target: TargetId },

    #[error("generation session for {target} already ended with an error")]
    Aborted { target: TargetId },

    #[error("story not finished after {calls} continue calls")]
    CallLimit { calls: u32 },
}

impl GenerationError {
    pub(crate) fn from_host(operation: &'static str, source: HostError) -> Self {
        if source.is_unauthorized() {
            GenerationError::Unauthorized { operation }
        } else {
            GenerationError::Host { operation, source }
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, GenerationError::Unauthorized { .. })
    }
}

pub type Result<T> = std::result::Result<T, GenerationError>;
