//! Per-target session bookkeeping.
//!
//! Each target has at most one live session. Sessions for different targets
//! step concurrently; steps of one session are serialized by its own lock.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;

use kiln_core::{Generated, GenerationParams, HostApi, TargetId};

use crate::error::{GenerationError, Result};
use crate::generation::{GenerationSession, StoryOutcome};

type Slot<H> = Arc<AsyncMutex<GenerationSession<H>>>;

pub struct SessionRegistry<H> {
    host: H,
    sessions: Mutex<HashMap<TargetId, Slot<H>>>,
}

impl<H: HostApi + Clone> SessionRegistry<H> {
    pub fn new(host: H) -> Self {
        Self { host, sessions: Mutex::new(HashMap::new()) }
    }

    /// Open a session for `target`.
    ///
    /// Refused with `SessionActive` while the target's previous session is
    /// still running (or mid-step). A finished session is replaced.
    pub fn start(&self, target: TargetId, prompt: impl Into<String>, params: GenerationParams) -> Result<()> {
        let mut sessions = self.sessions.lock();
        if let Some(slot) = sessions.get(&target) {
            let running = match slot.try_lock() {
                Ok(session) => !session.is_terminal(),
                Err(_) => true,
            };
            if running {
                return Err(GenerationError::SessionActive { target });
            }
        }
        let session = GenerationSession::new(self.host.clone(), target.clone(), prompt, params)?;
        tracing::debug!(target_id = %target, "session opened");
        sessions.insert(target, Arc::new(AsyncMutex::new(session)));
        Ok(())
    }

    /// Drop the session for `target`, running or not. Returns whether one existed.
    pub fn reset(&self, target: &TargetId) -> bool {
        self.sessions.lock().remove(target).is_some()
    }

    fn slot(&self, target: &TargetId) -> Result<Slot<H>> {
        self.sessions
            .lock()
            .get(target)
            .cloned()
            .ok_or_else(|| GenerationError::UnknownTarget { target: target.clone() })
    }

    /// Advance the session for `target` by one host call.
    ///
    /// `Ok(None)` once the session is terminal.
    pub async fn step(&self, target: &TargetId) -> Result<Option<Generated>> {
        let slot = self.slot(target)?;
        let mut session = slot.lock().await;
        session.next_step().await.transpose()
    }

    /// Update the parameters used by the following continue calls.
    pub async fn set_params(&self, target: &TargetId, params: GenerationParams) -> Result<()> {
        let slot = self.slot(target)?;
        let mut session = slot.lock().await;
        session.set_params(params)
    }

    /// Drive the session for `target` to its end.
    pub async fn run_to_end(&self, target: &TargetId, max_continues: Option<u32>) -> Result<StoryOutcome> {
        let slot = self.slot(target)?;
        let mut session = slot.lock().await;
        session.run_to_end(max_continues).await
    }

    /// Whether `target` has a session that can still make progress.
    pub fn is_active(&self, target: &TargetId) -> bool {
        match self.sessions.lock().get(target) {
            Some(slot) => slot.try_lock().map(|s| !s.is_terminal()).unwrap_or(true),
            None => false,
        }
    }

    /// Text generated so far for `target`, if it is not mid-step.
    pub fn text(&self, target: &TargetId) -> Option<String> {
        let slot = self.sessions.lock().get(target).cloned()?;
        let text = slot.try_lock().ok().map(|s| s.text().to_string());
        text
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}
