//! The model host as seen from kiln.
//!
//! Message transport is not implemented here. A concrete client (network,
//! in-process simulation, test double) implements [`HostApi`] and the upload
//! and generation components drive it.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{GenerationParams, HostResult};

/// One of the two binary blobs a deployment transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Blob {
    Tokenizer,
    Model,
}

impl Blob {
    pub fn as_str(&self) -> &'static str {
        match self {
            Blob::Tokenizer => "tokenizer",
            Blob::Model => "model",
        }
    }
}

impl fmt::Display for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the content item a generation session writes into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TargetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payload of a successful start or continue call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generated {
    /// Number of tokens the host produced during this call.
    pub tokens_produced: u32,
    /// Text decoded from those tokens.
    pub text: String,
}

/// Named operations exposed by the model host.
///
/// Every call either succeeds with its payload or fails with a [`HostError`].
/// Implementations must not retry internally: the callers own the retry and
/// abort policy.
///
/// [`HostError`]: crate::HostError
pub trait HostApi: Send + Sync {
    /// Liveness check.
    fn is_healthy(&self) -> impl Future<Output = HostResult<bool>> + Send;

    /// Discard any tokenizer bytes held by the host.
    fn reset_tokenizer(&self) -> impl Future<Output = HostResult<()>> + Send;

    /// Append one chunk to the host's tokenizer buffer.
    fn upload_tokenizer_chunk(&self, chunk: &[u8]) -> impl Future<Output = HostResult<()>> + Send;

    /// Discard any model bytes held by the host.
    fn reset_model(&self) -> impl Future<Output = HostResult<()>> + Send;

    /// Append one chunk to the host's model buffer.
    fn upload_model_chunk(&self, chunk: &[u8]) -> impl Future<Output = HostResult<()>> + Send;

    /// Activate the uploaded tokenizer and weights.
    fn initialize(&self) -> impl Future<Output = HostResult<()>> + Send;

    /// Whether activation has completed and inference may start.
    fn is_ready(&self) -> impl Future<Output = HostResult<bool>> + Send;

    /// Open a fresh generation context for `target` and feed it `prompt`.
    fn start_generation(
        &self,
        target: &TargetId,
        prompt: &str,
        params: &GenerationParams,
    ) -> impl Future<Output = HostResult<Generated>> + Send;

    /// Advance the existing generation context for `target`.
    fn continue_generation(
        &self,
        target: &TargetId,
        params: &GenerationParams,
    ) -> impl Future<Output = HostResult<Generated>> + Send;
}

impl<T: HostApi> HostApi for Arc<T> {
    fn is_healthy(&self) -> impl Future<Output = HostResult<bool>> + Send {
        (**self).is_healthy()
    }

    fn reset_tokenizer(&self) -> impl Future<Output = HostResult<()>> + Send {
        (**self).reset_tokenizer()
    }

    fn upload_tokenizer_chunk(&self, chunk: &[u8]) -> impl Future<Output = HostResult<()>> + Send {
        (**self).upload_tokenizer_chunk(chunk)
    }

    fn reset_model(&self) -> impl Future<Output = HostResult<()>> + Send {
        (**self).reset_model()
    }

    fn upload_model_chunk(&self, chunk: &[u8]) -> impl Future<Output = HostResult<()>> + Send {
        (**self).upload_model_chunk(chunk)
    }

    fn initialize(&self) -> impl Future<Output = HostResult<()>> + Send {
        (**self).initialize()
    }

    fn is_ready(&self) -> impl Future<Output = HostResult<bool>> + Send {
        (**self).is_ready()
    }

    fn start_generation(
        &self,
        target: &TargetId,
        prompt: &str,
        params: &GenerationParams,
    ) -> impl Future<Output = HostResult<Generated>> + Send {
        (**self).start_generation(target, prompt, params)
    }

    fn continue_generation(
        &self,
        target: &TargetId,
        params: &GenerationParams,
    ) -> impl Future<Output = HostResult<Generated>> + Send {
        (**self).continue_generation(target, params)
    }
}
