//! Upload lifecycle: one state machine per blob plus the session stage.
//!
//! ```text
//!          reset           first chunk           last chunk
//! Empty ─────────▶ Resetting ─────────▶ Uploading ─────────▶ Uploaded
//!   ▲                  │ (single-chunk blob) ──────────────────▲
//!   │                  ▼ rejected ack
//!   └──────────── Aborted { offset }  (only `reset` leaves it)
//! ```
//!
//! The session moves `Uploading → Initialized → Ready` once both blobs are
//! `Uploaded`. Tokenizer always goes first. Every transition function is
//! total: an illegal call returns a [`LifecycleError`] and leaves the state
//! untouched.

use kiln_core::Blob;
use serde::Serialize;

/// Stage of a single blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlobStage {
    /// Nothing sent, no reset acknowledged.
    Empty,
    /// Host acknowledged the reset; waiting for the first chunk.
    Resetting,
    /// Some but not all chunks acknowledged.
    Uploading,
    /// Every byte acknowledged.
    Uploaded,
    /// A chunk was rejected at `offset`; the blob restarts from `reset`.
    Aborted { offset: usize },
}

/// Stage of the whole deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionStage {
    Uploading,
    /// `initialize` acknowledged; activation may still be running.
    Initialized,
    /// Host reported ready for inference.
    Ready,
}

/// Illegal lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("{blob} chunk refused in stage {stage:?}")]
    ChunkRefused { blob: Blob, stage: BlobStage },

    #[error("{blob} chunk of {len} bytes at offset {offset} overruns blob of {total} bytes")]
    Overrun { blob: Blob, offset: usize, len: usize, total: usize },

    #[error("model upload cannot start before the tokenizer is uploaded")]
    TokenizerFirst,

    #[error("cannot initialize: tokenizer {tokenizer:?}, model {model:?}")]
    NotUploaded { tokenizer: BlobStage, model: BlobStage },

    #[error("session is {stage:?}, expected {expected:?}")]
    WrongStage { stage: SessionStage, expected: SessionStage },
}

/// Progress of one blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlobState {
    pub blob: Blob,
    stage: BlobStage,
    offset: usize,
    total: usize,
}

impl BlobState {
    pub fn new(blob: Blob) -> Self {
        Self { blob, stage: BlobStage::Empty, offset: 0, total: 0 }
    }

    pub fn stage(&self) -> BlobStage {
        self.stage
    }

    /// Bytes acknowledged so far.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length of the blob announced at reset.
    pub fn total(&self) -> usize {
        self.total
    }

    /// The host acknowledged a reset; a blob of `total` bytes follows.
    /// Legal from every stage.
    pub fn reset(&mut self, total: usize) {
        self.stage = BlobStage::Resetting;
        self.offset = 0;
        self.total = total;
    }

    /// Check whether a chunk of `len` bytes may be sent now.
    pub fn admit(&self, len: usize) -> Result<(), LifecycleError> {
        match self.stage {
            BlobStage::Resetting | BlobStage::Uploading => {}
            stage => return Err(LifecycleError::ChunkRefused { blob: self.blob, stage }),
        }
        if len == 0 || self.offset + len > self.total {
            return Err(LifecycleError::Overrun {
                blob: self.blob,
                offset: self.offset,
                len,
                total: self.total,
            });
        }
        Ok(())
    }

    /// Record an acknowledged chunk of `len` bytes.
    pub fn advance(&mut self, len: usize) -> Result<BlobStage, LifecycleError> {
        self.admit(len)?;
        self.offset += len;
        self.stage = if self.offset == self.total {
            BlobStage::Uploaded
        } else {
            BlobStage::Uploading
        };
        Ok(self.stage)
    }

    /// A chunk or its acknowledgment failed; pin the failing offset.
    pub fn abort(&mut self) -> usize {
        self.stage = BlobStage::Aborted { offset: self.offset };
        self.offset
    }

    pub fn is_uploaded(&self) -> bool {
        self.stage == BlobStage::Uploaded
    }
}

/// All lifecycle state of one deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadSession {
    pub tokenizer: BlobState,
    pub model: BlobState,
    stage: SessionStage,
}

impl Default for UploadSession {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadSession {
    pub fn new() -> Self {
        Self {
            tokenizer: BlobState::new(Blob::Tokenizer),
            model: BlobState::new(Blob::Model),
            stage: SessionStage::Uploading,
        }
    }

    pub fn stage(&self) -> SessionStage {
        self.stage
    }

    pub fn blob(&self, blob: Blob) -> &BlobState {
        match blob {
            Blob::Tokenizer => &self.tokenizer,
            Blob::Model => &self.model,
        }
    }

    pub fn blob_mut(&mut self, blob: Blob) -> &mut BlobState {
        match blob {
            Blob::Tokenizer => &mut self.tokenizer,
            Blob::Model => &mut self.model,
        }
    }

    /// Check that a reset of `blob` may be sent.
    pub fn admit_reset(&self, blob: Blob) -> Result<(), LifecycleError> {
        if blob == Blob::Model && !self.tokenizer.is_uploaded() {
            return Err(LifecycleError::TokenizerFirst);
        }
        Ok(())
    }

    /// Record a reset acknowledgment for `blob`.
    ///
    /// Any reset drops the session back to `Uploading`, since the host no
    /// longer holds a complete pair. The model may only be reset once the
    /// tokenizer is uploaded.
    pub fn reset(&mut self, blob: Blob, total: usize) -> Result<(), LifecycleError> {
        self.admit_reset(blob)?;
        self.blob_mut(blob).reset(total);
        self.stage = SessionStage::Uploading;
        Ok(())
    }

    /// Check that `initialize` may be sent.
    pub fn admit_initialize(&self) -> Result<(), LifecycleError> {
        if self.stage != SessionStage::Uploading {
            return Err(LifecycleError::WrongStage {
                stage: self.stage,
                expected: SessionStage::Uploading,
            });
        }
        if !(self.tokenizer.is_uploaded() && self.model.is_uploaded()) {
            return Err(LifecycleError::NotUploaded {
                tokenizer: self.tokenizer.stage(),
                model: self.model.stage(),
            });
        }
        Ok(())
    }

    pub fn mark_initialized(&mut self) -> Result<(), LifecycleError> {
        self.admit_initialize()?;
        self.stage = SessionStage::Initialized;
        Ok(())
    }

    pub fn mark_ready(&mut self) -> Result<(), LifecycleError> {
        if self.stage != SessionStage::Initialized {
            return Err(LifecycleError::WrongStage {
                stage: self.stage,
                expected: SessionStage::Initialized,
            });
        }
        self.stage = SessionStage::Ready;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_refused_while_empty() {
        let mut s = BlobState::new(Blob::Tokenizer);
        let err = s.advance(4).unwrap_err();
        assert_eq!(err, LifecycleError::ChunkRefused { blob: Blob::Tokenizer, stage: BlobStage::Empty });
        assert_eq!(s.stage(), BlobStage::Empty);
        assert_eq!(s.offset(), 0);
    }

    #[test]
    fn test_full_blob_walk() {
        let mut s = BlobState::new(Blob::Model);
        s.reset(10);
        assert_eq!(s.stage(), BlobStage::Resetting);
        assert_eq!(s.advance(4).unwrap(), BlobStage::Uploading);
        assert_eq!(s.advance(4).unwrap(), BlobStage::Uploading);
        assert_eq!(s.offset(), 8);
        assert_eq!(s.advance(2).unwrap(), BlobStage::Uploaded);
        assert!(s.is_uploaded());
    }

    #[test]
    fn test_single_chunk_blob_goes_straight_to_uploaded() {
        let mut s = BlobState::new(Blob::Tokenizer);
        s.reset(3);
        assert_eq!(s.advance(3).unwrap(), BlobStage::Uploaded);
    }

    #[test]
    fn test_no_chunk_after_uploaded_without_reset() {
        let mut s = BlobState::new(Blob::Tokenizer);
        s.reset(2);
        s.advance(2).unwrap();
        assert!(matches!(
            s.advance(1),
            Err(LifecycleError::ChunkRefused { stage: BlobStage::Uploaded, .. })
        ));
        s.reset(1);
        assert_eq!(s.advance(1).unwrap(), BlobStage::Uploaded);
    }

    #[test]
    fn test_overrun_refused() {
        let mut s = BlobState::new(Blob::Model);
        s.reset(4);
        assert!(matches!(s.advance(5), Err(LifecycleError::Overrun { .. })));
        assert!(matches!(s.advance(0), Err(LifecycleError::Overrun { .. })));
        assert_eq!(s.stage(), BlobStage::Resetting);
    }

    #[test]
    fn test_aborted_blob_needs_reset() {
        let mut s = BlobState::new(Blob::Model);
        s.reset(8);
        s.advance(4).unwrap();
        assert_eq!(s.abort(), 4);
        assert_eq!(s.stage(), BlobStage::Aborted { offset: 4 });
        assert!(s.admit(4).is_err());
        s.reset(8);
        assert_eq!(s.offset(), 0);
        assert!(s.admit(4).is_ok());
    }

    #[test]
    fn test_model_reset_requires_tokenizer() {
        let mut session = UploadSession::new();
        assert_eq!(session.reset(Blob::Model, 4), Err(LifecycleError::TokenizerFirst));
        session.reset(Blob::Tokenizer, 2).unwrap();
        session.tokenizer.advance(2).unwrap();
        session.reset(Blob::Model, 4).unwrap();
        assert_eq!(session.model.stage(), BlobStage::Resetting);
    }

    #[test]
    fn test_initialize_and_ready_are_distinct() {
        let mut session = UploadSession::new();
        assert!(matches!(session.mark_initialized(), Err(LifecycleError::NotUploaded { .. })));
        assert!(session.mark_ready().is_err());

        session.reset(Blob::Tokenizer, 1).unwrap();
        session.tokenizer.advance(1).unwrap();
        session.reset(Blob::Model, 1).unwrap();
        session.model.advance(1).unwrap();

        session.mark_initialized().unwrap();
        assert_eq!(session.stage(), SessionStage::Initialized);
        assert!(session.mark_initialized().is_err());

        session.mark_ready().unwrap();
        assert_eq!(session.stage(), SessionStage::Ready);
    }

    #[test]
    fn test_reset_drops_session_back_to_uploading() {
        let mut session = UploadSession::new();
        session.reset(Blob::Tokenizer, 1).unwrap();
        session.tokenizer.advance(1).unwrap();
        session.reset(Blob::Model, 1).unwrap();
        session.model.advance(1).unwrap();
        session.mark_initialized().unwrap();

        session.reset(Blob::Tokenizer, 1).unwrap();
        assert_eq!(session.stage(), SessionStage::Uploading);
        assert!(session.mark_ready().is_err());
    }
}
