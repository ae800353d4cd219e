//! In-process model host.
//!
//! [`SimHost`] owns the host state; [`SimClient`] is one caller's handle to
//! it and implements [`HostApi`]. Uploads, resets and `initialize` are
//! owner-only. Generation is open to every identified caller.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use kiln_core::error::ACCESS_DENIED;
use kiln_core::{Blob, Generated, GenerationParams, HostApi, HostError, HostResult, TargetId};
use kiln_sizer::{MemoryBreakdown, ModelConfig, HEADER_BYTES};

use crate::config::SimConfig;
use crate::story::Story;

/// Operations kept in the call log; older entries are dropped first.
pub const CALL_LOG_LIMIT: usize = 1024;

/// Who is calling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    /// The principal that deployed the host.
    Owner,
    /// Any other authenticated principal.
    User(String),
    Anonymous,
}

struct Activation {
    config: ModelConfig,
    breakdown: MemoryBreakdown,
    polls_left: u32,
}

#[derive(Default)]
struct HostState {
    tokenizer: Vec<u8>,
    model: Vec<u8>,
    chunks_seen: HashMap<Blob, usize>,
    activation: Option<Activation>,
    stories: HashMap<TargetId, Story>,
    calls: VecDeque<&'static str>,
}

impl HostState {
    fn buffer(&mut self, blob: Blob) -> &mut Vec<u8> {
        match blob {
            Blob::Tokenizer => &mut self.tokenizer,
            Blob::Model => &mut self.model,
        }
    }

    fn is_ready(&self) -> bool {
        self.activation.as_ref().is_some_and(|a| a.polls_left == 0)
    }

    /// Stories still holding a run state.
    fn active_stories(&self) -> usize {
        self.stories.values().filter(|s| !s.is_finished()).count()
    }
}

struct Shared {
    config: SimConfig,
    state: Mutex<HostState>,
}

/// The simulated host. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SimHost {
    shared: Arc<Shared>,
}

impl SimHost {
    pub fn new(config: SimConfig) -> Self {
        Self {
            shared: Arc::new(Shared { config, state: Mutex::new(HostState::default()) }),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.shared.config
    }

    /// A handle that calls the host as `caller`.
    pub fn client(&self, caller: Caller) -> SimClient {
        SimClient { shared: Arc::clone(&self.shared), caller }
    }

    pub fn owner(&self) -> SimClient {
        self.client(Caller::Owner)
    }

    /// Names of the last [`CALL_LOG_LIMIT`] operations received, in arrival order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.shared.state.lock().calls.iter().copied().collect()
    }

    /// Bytes currently held for `blob`.
    pub fn blob_bytes(&self, blob: Blob) -> Vec<u8> {
        self.shared.state.lock().buffer(blob).clone()
    }

    pub fn model_config(&self) -> Option<ModelConfig> {
        self.shared.state.lock().activation.as_ref().map(|a| a.config)
    }

    /// Number of targets whose story is still running.
    pub fn active_sessions(&self) -> usize {
        self.shared.state.lock().active_stories()
    }

    /// Full story text generated for `target`.
    pub fn story(&self, target: &TargetId) -> Option<String> {
        self.shared.state.lock().stories.get(target).map(|s| s.text().to_string())
    }
}

/// One caller's connection to a [`SimHost`].
#[derive(Clone)]
pub struct SimClient {
    shared: Arc<Shared>,
    caller: Caller,
}

impl SimClient {
    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    fn record(&self, op: &'static str) {
        let mut state = self.shared.state.lock();
        if state.calls.len() == CALL_LOG_LIMIT {
            state.calls.pop_front();
        }
        state.calls.push_back(op);
    }

    fn require_owner(&self) -> HostResult<()> {
        match self.caller {
            Caller::Owner => Ok(()),
            _ => Err(HostError::from_variant("Other", Some(ACCESS_DENIED))),
        }
    }

    fn require_identified(&self) -> HostResult<()> {
        match self.caller {
            Caller::Anonymous => Err(HostError::from_variant("Unauthorized", None)),
            _ => Ok(()),
        }
    }

    async fn stall_if_configured(&self) {
        if self.shared.config.faults.stall_acks {
            std::future::pending::<()>().await;
        }
    }

    fn reset(&self, blob: Blob) -> HostResult<()> {
        self.require_owner()?;
        if self.shared.config.faults.reject_reset == Some(blob) {
            return Err(HostError::Rejected(format!("{blob} reset refused")));
        }
        let mut state = self.shared.state.lock();
        state.buffer(blob).clear();
        state.chunks_seen.insert(blob, 0);
        state.activation = None;
        state.stories.clear();
        tracing::debug!(%blob, "sim: reset");
        Ok(())
    }

    fn append(&self, blob: Blob, chunk: &[u8]) -> HostResult<()> {
        self.require_owner()?;
        let mut state = self.shared.state.lock();
        let index = {
            let seen = state.chunks_seen.entry(blob).or_insert(0);
            let index = *seen;
            *seen += 1;
            index
        };
        if self.shared.config.faults.reject_chunk == Some((blob, index)) {
            return Err(HostError::Rejected(format!("{blob} chunk {index} corrupted")));
        }
        state.buffer(blob).extend_from_slice(chunk);
        tracing::trace!(%blob, index, len = chunk.len(), "sim: chunk");
        Ok(())
    }

    fn activate(&self) -> HostResult<()> {
        self.require_owner()?;
        let mut state = self.shared.state.lock();
        if state.tokenizer.is_empty() {
            return Err(HostError::Rejected("no tokenizer uploaded".into()));
        }
        if state.model.len() < HEADER_BYTES {
            return Err(HostError::Rejected(format!(
                "model holds {} bytes, header needs {HEADER_BYTES}",
                state.model.len()
            )));
        }
        let config =
            ModelConfig::from_bytes(&state.model).map_err(|e| HostError::Rejected(e.to_string()))?;
        let breakdown = MemoryBreakdown::estimate(&config);
        if breakdown.shared_bytes() > self.shared.config.budget_bytes {
            return Err(HostError::Rejected("out of memory".into()));
        }
        state.stories.clear();
        state.activation = Some(Activation {
            config,
            breakdown,
            polls_left: self.shared.config.ready_after_polls,
        });
        tracing::debug!(?config, "sim: initialized");
        Ok(())
    }

    fn poll_ready(&self) -> bool {
        if self.shared.config.faults.never_ready {
            return false;
        }
        let mut state = self.shared.state.lock();
        match state.activation.as_mut() {
            Some(a) if a.polls_left > 0 => {
                a.polls_left -= 1;
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    fn generate(&self, target: &TargetId, prompt: Option<&str>, params: &GenerationParams) -> HostResult<Generated> {
        self.require_identified()?;
        let budget = self.shared.config.budget_bytes;
        let story_tokens = self.shared.config.story_tokens;

        let mut state = self.shared.state.lock();
        if !state.is_ready() {
            return Err(HostError::Rejected("not ready for inference".into()));
        }
        if params.steps == 0 {
            return Err(HostError::Rejected("steps must be positive".into()));
        }

        if let Some(prompt) = prompt {
            // A restart releases this target's previous run state first.
            state.stories.remove(target);
            let active = state.active_stories() as u64;
            let fits = state
                .activation
                .as_ref()
                .is_some_and(|a| a.breakdown.fits(budget, active + 1));
            if !fits {
                return Err(HostError::Rejected("out of memory".into()));
            }
            let story = Story::new(prompt, params.rng_seed, story_tokens);
            if story.prompt_tokens() > 0 {
                // The prompt is ingested; nothing is generated after it.
                let reply = Generated { tokens_produced: story.prompt_tokens(), text: story.text().to_string() };
                tracing::debug!(%target, prompt_tokens = reply.tokens_produced, "sim: prompt ingested");
                state.stories.insert(target.clone(), story);
                return Ok(reply);
            }
            state.stories.insert(target.clone(), story);
        }

        let story = state
            .stories
            .get_mut(target)
            .ok_or_else(|| HostError::Rejected(format!("no story started for {target}")))?;
        let (tokens_produced, text) = story.advance(params);
        let text = if self.shared.config.faults.drop_text { String::new() } else { text };
        tracing::debug!(%target, tokens_produced, total = story.produced(), "sim: generated");
        Ok(Generated { tokens_produced, text })
    }
}

impl HostApi for SimClient {
    async fn is_healthy(&self) -> HostResult<bool> {
        self.record("is_healthy");
        Ok(true)
    }

    async fn reset_tokenizer(&self) -> HostResult<()> {
        self.record("reset_tokenizer");
        self.stall_if_configured().await;
        self.reset(Blob::Tokenizer)
    }

    async fn upload_tokenizer_chunk(&self, chunk: &[u8]) -> HostResult<()> {
        self.record("upload_tokenizer_chunk");
        self.stall_if_configured().await;
        self.append(Blob::Tokenizer, chunk)
    }

    async fn reset_model(&self) -> HostResult<()> {
        self.record("reset_model");
        self.stall_if_configured().await;
        self.reset(Blob::Model)
    }

    async fn upload_model_chunk(&self, chunk: &[u8]) -> HostResult<()> {
        self.record("upload_model_chunk");
        self.stall_if_configured().await;
        self.append(Blob::Model, chunk)
    }

    async fn initialize(&self) -> HostResult<()> {
        self.record("initialize");
        if self.shared.config.faults.stall_initialize {
            std::future::pending::<()>().await;
        }
        self.activate()
    }

    async fn is_ready(&self) -> HostResult<bool> {
        self.record("is_ready");
        Ok(self.poll_ready())
    }

    async fn start_generation(
        &self,
        target: &TargetId,
        prompt: &str,
        params: &GenerationParams,
    ) -> HostResult<Generated> {
        self.record("start_generation");
        self.generate(target, Some(prompt), params)
    }

    async fn continue_generation(&self, target: &TargetId, params: &GenerationParams) -> HostResult<Generated> {
        self.record("continue_generation");
        self.generate(target, None, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Faults;

    fn header(fields: [i32; 7]) -> Vec<u8> {
        fields.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    async fn deployed(config: SimConfig) -> SimHost {
        let host = SimHost::new(config);
        let owner = host.owner();
        owner.reset_tokenizer().await.unwrap();
        owner.upload_tokenizer_chunk(b"tok").await.unwrap();
        owner.reset_model().await.unwrap();
        owner.upload_model_chunk(&header([64, 128, 2, 4, 4, -512, 64])).await.unwrap();
        owner.initialize().await.unwrap();
        host
    }

    #[tokio::test]
    async fn test_non_owner_cannot_upload() {
        let host = SimHost::new(SimConfig::default());
        let user = host.client(Caller::User("alice".into()));
        assert_eq!(user.reset_model().await, Err(HostError::Unauthorized));
        assert_eq!(user.upload_model_chunk(b"x").await, Err(HostError::Unauthorized));
        assert_eq!(user.initialize().await, Err(HostError::Unauthorized));
    }

    #[tokio::test]
    async fn test_chunks_append_and_reset_clears() {
        let host = SimHost::new(SimConfig::default());
        let owner = host.owner();
        owner.reset_tokenizer().await.unwrap();
        owner.upload_tokenizer_chunk(b"ab").await.unwrap();
        owner.upload_tokenizer_chunk(b"cd").await.unwrap();
        assert_eq!(host.blob_bytes(Blob::Tokenizer), b"abcd");
        owner.reset_tokenizer().await.unwrap();
        assert!(host.blob_bytes(Blob::Tokenizer).is_empty());
    }

    #[tokio::test]
    async fn test_initialize_needs_header() {
        let host = SimHost::new(SimConfig::default());
        let owner = host.owner();
        owner.upload_tokenizer_chunk(b"tok").await.unwrap();
        owner.upload_model_chunk(&[0u8; 10]).await.unwrap();
        assert!(matches!(owner.initialize().await, Err(HostError::Rejected(_))));
        assert!(!owner.is_ready().await.unwrap());
    }

    #[tokio::test]
    async fn test_ready_after_polls() {
        let host = deployed(SimConfig { ready_after_polls: 2, ..SimConfig::default() }).await;
        let owner = host.owner();
        assert!(!owner.is_ready().await.unwrap());
        assert!(!owner.is_ready().await.unwrap());
        assert!(owner.is_ready().await.unwrap());
        assert_eq!(host.model_config().unwrap().vocab_size(), 512);
    }

    #[tokio::test]
    async fn test_anonymous_cannot_generate() {
        let host = deployed(SimConfig::default()).await;
        let anon = host.client(Caller::Anonymous);
        let err = anon
            .start_generation(&"t".into(), "hi", &GenerationParams::greedy(4))
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_story_runs_out() {
        let host = deployed(SimConfig { story_tokens: 10, ..SimConfig::default() }).await;
        let user = host.client(Caller::User("bob".into()));
        let target = TargetId::from("nft-1");
        let params = GenerationParams::greedy(6);
        assert_eq!(user.start_generation(&target, "", &params).await.unwrap().tokens_produced, 6);
        assert_eq!(host.active_sessions(), 1);
        assert_eq!(user.continue_generation(&target, &params).await.unwrap().tokens_produced, 4);
        assert_eq!(host.active_sessions(), 0);
        assert_eq!(host.story(&target).unwrap().split(' ').count(), 10);
    }

    #[tokio::test]
    async fn test_admission_refuses_over_budget() {
        // shared 595_712 + 2 run states of 71_168 fit, a third does not
        let budget = 595_712 + 2 * 71_168 + 100;
        let host = deployed(SimConfig { budget_bytes: budget, ..SimConfig::default() }).await;
        let user = host.client(Caller::User("bob".into()));
        let params = GenerationParams::greedy(1);
        user.start_generation(&"a".into(), "", &params).await.unwrap();
        user.start_generation(&"b".into(), "", &params).await.unwrap();
        let err = user.start_generation(&"c".into(), "", &params).await.unwrap_err();
        assert_eq!(err, HostError::Rejected("out of memory".into()));
        // restarting an existing target reuses its slot
        user.start_generation(&"a".into(), "", &params).await.unwrap();
    }

    #[tokio::test]
    async fn test_reject_chunk_fault() {
        let faults = Faults { reject_chunk: Some((Blob::Model, 1)), ..Faults::default() };
        let host = SimHost::new(SimConfig { faults, ..SimConfig::default() });
        let owner = host.owner();
        owner.reset_model().await.unwrap();
        owner.upload_model_chunk(b"a").await.unwrap();
        assert!(matches!(owner.upload_model_chunk(b"b").await, Err(HostError::Rejected(_))));
        assert_eq!(host.blob_bytes(Blob::Model), b"a");
    }

    #[tokio::test]
    async fn test_continue_without_start() {
        let host = deployed(SimConfig::default()).await;
        let err = host
            .owner()
            .continue_generation(&"ghost".into(), &GenerationParams::greedy(2))
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::Rejected(msg) if msg.contains("ghost")));
    }

    #[tokio::test]
    async fn test_prompted_start_only_ingests_prompt() {
        let host = deployed(SimConfig { story_tokens: 30, ..SimConfig::default() }).await;
        let user = host.client(Caller::User("bob".into()));
        let target = TargetId::from("nft-3");
        let params = GenerationParams::greedy(20);

        let start = user.start_generation(&target, "Lily went", &params).await.unwrap();
        assert_eq!(start, Generated { tokens_produced: 2, text: "Lily went".into() });
        assert_eq!(host.active_sessions(), 1);

        assert_eq!(user.continue_generation(&target, &params).await.unwrap().tokens_produced, 20);
        assert_eq!(user.continue_generation(&target, &params).await.unwrap().tokens_produced, 10);
        assert!(host.story(&target).unwrap().starts_with("Lily went "));
    }

    #[tokio::test]
    async fn test_reject_reset_fault() {
        let faults = Faults { reject_reset: Some(Blob::Model), ..Faults::default() };
        let host = SimHost::new(SimConfig { faults, ..SimConfig::default() });
        let owner = host.owner();
        owner.reset_tokenizer().await.unwrap();
        assert!(matches!(owner.reset_model().await, Err(HostError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_call_log_is_capped() {
        let host = SimHost::new(SimConfig::default());
        let owner = host.owner();
        owner.reset_model().await.unwrap();
        for _ in 0..CALL_LOG_LIMIT + 10 {
            owner.upload_model_chunk(b"x").await.unwrap();
        }
        owner.initialize().await.unwrap_err();
        let calls = host.calls();
        assert_eq!(calls.len(), CALL_LOG_LIMIT);
        assert_eq!(calls.last(), Some(&"initialize"));
        assert!(!calls.contains(&"reset_model"));
    }
}
