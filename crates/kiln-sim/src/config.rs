//! Simulated host settings and fault injection.

use serde::{Deserialize, Serialize};

use kiln_core::Blob;

fn default_budget_bytes() -> u64 {
    4 * 1024 * 1024 * 1024
}

fn default_story_tokens() -> u32 {
    256
}

/// Failures the simulated host can be told to produce.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Faults {
    /// Reject the chunk with this 0-based index of the given blob.
    #[serde(default)]
    pub reject_chunk: Option<(Blob, usize)>,
    /// Refuse every reset of the given blob.
    #[serde(default)]
    pub reject_reset: Option<Blob>,
    /// Never acknowledge resets or chunks.
    #[serde(default)]
    pub stall_acks: bool,
    /// Never acknowledge `initialize`.
    #[serde(default)]
    pub stall_initialize: bool,
    /// `is_ready` never reports true.
    #[serde(default)]
    pub never_ready: bool,
    /// Report full token counts with no text.
    #[serde(default)]
    pub drop_text: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Memory available for the model plus every active run state.
    #[serde(default = "default_budget_bytes")]
    pub budget_bytes: u64,
    /// Length of every story, in tokens.
    #[serde(default = "default_story_tokens")]
    pub story_tokens: u32,
    /// Number of `is_ready` polls that report false after `initialize`.
    #[serde(default)]
    pub ready_after_polls: u32,
    #[serde(default)]
    pub faults: Faults,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            budget_bytes: default_budget_bytes(),
            story_tokens: default_story_tokens(),
            ready_after_polls: 0,
            faults: Faults::default(),
        }
    }
}
