//! Resumable generation session.
//!
//! A story longer than one host call is produced by a `start` followed by
//! any number of `continue` calls. [`GenerationSession`] is the stepper: each
//! [`next_step`](GenerationSession::next_step) issues exactly one host call
//! and yields its reply, until the termination policy says the story is over.

use serde::Serialize;

use kiln_core::{Generated, GenerationParams, HostApi, TargetId};

use crate::error::{GenerationError, Result};
use crate::termination::{classify, Verdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    NotStarted,
    Running,
    Finished,
    Failed,
}

/// A completed story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoryOutcome {
    pub target: TargetId,
    pub text: String,
    pub tokens: u64,
    /// Host calls issued, including the start.
    pub calls: u32,
}

pub struct GenerationSession<H> {
    host: H,
    target: TargetId,
    prompt: String,
    params: GenerationParams,
    phase: Phase,
    tokens: u64,
    text: String,
    calls: u32,
}

impl<H: HostApi> GenerationSession<H> {
    /// Prepare a session. No host call is made until the first step.
    pub fn new(host: H, target: TargetId, prompt: impl Into<String>, params: GenerationParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            host,
            target,
            prompt: prompt.into(),
            params,
            phase: Phase::NotStarted,
            tokens: 0,
            text: String::new(),
            calls: 0,
        })
    }

    pub fn target(&self) -> &TargetId {
        &self.target
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    /// Use different parameters for the following continue calls.
    pub fn set_params(&mut self, params: GenerationParams) -> Result<()> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    /// True once the story ended or a step failed. No further host calls are made.
    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, Phase::Finished | Phase::Failed)
    }

    /// True when the session ended because a step failed.
    pub fn has_failed(&self) -> bool {
        self.phase == Phase::Failed
    }

    pub fn is_started(&self) -> bool {
        self.phase != Phase::NotStarted
    }

    /// Tokens produced across all calls so far.
    pub fn tokens(&self) -> u64 {
        self.tokens
    }

    /// Text produced across all calls so far, in order.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn calls(&self) -> u32 {
        self.calls
    }

    /// Issue the next host call.
    ///
    /// Returns `None` once the session is terminal. A failed call, including
    /// an inconsistent reply, is returned once and ends the session.
    pub async fn next_step(&mut self) -> Option<Result<Generated>> {
        let (operation, reply) = match self.phase {
            Phase::Finished | Phase::Failed => return None,
            Phase::NotStarted => (
                "start generation",
                self.host.start_generation(&self.target, &self.prompt, &self.params).await,
            ),
            Phase::Running => (
                "continue generation",
                self.host.continue_generation(&self.target, &self.params).await,
            ),
        };
        self.calls += 1;

        let reply = match reply {
            Ok(reply) => reply,
            Err(err) => {
                self.phase = Phase::Failed;
                tracing::warn!(target_id = %self.target, "{} failed: {}", operation, err);
                return Some(Err(GenerationError::from_host(operation, err)));
            }
        };

        // A start with a prompt only ingests the prompt, so its token count
        // says nothing about the story. Only continue replies are classified.
        let steps = self.params.steps;
        let verdict = match self.phase {
            Phase::NotStarted => Verdict::Continue,
            _ => classify(&reply, steps),
        };
        match verdict {
            Verdict::Continue => self.phase = Phase::Running,
            Verdict::NaturalEnd => self.phase = Phase::Finished,
            Verdict::Inconsistent => {
                self.phase = Phase::Failed;
                return Some(Err(GenerationError::Inconsistency {
                    tokens_produced: reply.tokens_produced,
                    steps,
                }));
            }
        }

        self.tokens += u64::from(reply.tokens_produced);
        self.text.push_str(&reply.text);
        tracing::debug!(
            target_id = %self.target,
            call = self.calls,
            tokens = reply.tokens_produced,
            terminal = self.is_terminal(),
            "generation step"
        );
        Some(Ok(reply))
    }

    /// Step until terminal and return the whole story.
    ///
    /// `max_continues` bounds the number of continue calls after the start.
    pub async fn run_to_end(&mut self, max_continues: Option<u32>) -> Result<StoryOutcome> {
        if self.has_failed() {
            return Err(GenerationError::Aborted { target: self.target.clone() });
        }
        while !self.is_terminal() {
            if let Some(limit) = max_continues {
                let continues = self.calls.saturating_sub(1);
                if self.is_started() && continues >= limit {
                    return Err(GenerationError::CallLimit { calls: continues });
                }
            }
            if let Some(Err(err)) = self.next_step().await {
                return Err(err);
            }
        }
        tracing::info!(
            "Story for {} finished: {} tokens in {} calls",
            self.target,
            self.tokens,
            self.calls
        );
        Ok(StoryOutcome {
            target: self.target.clone(),
            text: self.text.clone(),
            tokens: self.tokens,
            calls: self.calls,
        })
    }
}
