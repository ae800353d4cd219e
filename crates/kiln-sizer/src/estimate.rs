//! Memory estimate: per-region byte counts for a decoded model config.
//!
//! Three groups of regions live in host memory:
//!
//! - the tokenizer tables (one per model)
//! - the transformer weights (one per model, shared read-only)
//! - the run state (one per concurrent caller)
//!
//! Every float and every pointer on the target host is 4 bytes wide.

use serde::Serialize;

use crate::header::ModelConfig;

/// Width of an f32 and of a pointer on the target host.
pub const WORD_BYTES: u64 = 4;

/// Static byte-pieces buffer the tokenizer keeps for single-byte tokens.
pub const BYTE_PIECES_BYTES: u64 = 512;

/// A single named allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Region {
    pub name: &'static str,
    pub bytes: u64,
}

/// Which group a region belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RegionGroup {
    Tokenizer,
    TransformerWeights,
    RunState,
}

impl RegionGroup {
    pub fn label(&self) -> &'static str {
        match self {
            RegionGroup::Tokenizer => "Tokenizer Memory (per model)",
            RegionGroup::TransformerWeights => "TransformerWeights Memory (per model)",
            RegionGroup::RunState => "RunState Memory (per caller)",
        }
    }

    /// True for the group that is instantiated once per concurrent caller.
    pub fn per_caller(&self) -> bool {
        matches!(self, RegionGroup::RunState)
    }
}

/// The regions of one group, in allocation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupMemory {
    pub group: RegionGroup,
    pub regions: Vec<Region>,
}

impl GroupMemory {
    fn new(group: RegionGroup, regions: Vec<Region>) -> Self {
        Self { group, regions }
    }

    pub fn total(&self) -> u64 {
        self.regions.iter().fold(0u64, |acc, r| acc.saturating_add(r.bytes))
    }

    /// Bytes of a named region, if this group has it.
    pub fn get(&self, name: &str) -> Option<u64> {
        self.regions.iter().find(|r| r.name == name).map(|r| r.bytes)
    }
}

/// Byte counts for every region of a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryBreakdown {
    pub tokenizer: GroupMemory,
    pub weights: GroupMemory,
    pub run_state: GroupMemory,
}

/// `WORD_BYTES * product(dims)`, saturating instead of wrapping.
fn words(dims: &[u64]) -> u64 {
    dims.iter().fold(WORD_BYTES, |acc, &d| acc.saturating_mul(d))
}

fn region(name: &'static str, bytes: u64) -> Region {
    Region { name, bytes }
}

impl MemoryBreakdown {
    /// Compute every region for `config`.
    pub fn estimate(config: &ModelConfig) -> Self {
        let dim = config.dim as u64;
        let hidden_dim = config.hidden_dim as u64;
        let n_layers = config.n_layers as u64;
        let n_heads = config.n_heads as u64;
        let n_kv_heads = config.n_kv_heads as u64;
        let vocab = config.vocab_size() as u64;
        let seq_len = config.seq_len as u64;
        let head_size = config.head_size() as u64;
        let kv_dim = config.kv_dim();

        // Tokenizer: one pointer and one score per entry, plus the byte pieces.
        let tokenizer = GroupMemory::new(
            RegionGroup::Tokenizer,
            vec![
                region("vocab", words(&[vocab])),
                region("vocab_scores", words(&[vocab])),
                region("byte_pieces", BYTE_PIECES_BYTES),
            ],
        );

        let w1 = words(&[n_layers, dim, hidden_dim]);
        let wk = words(&[n_layers, dim, n_kv_heads, head_size]);
        let weights = GroupMemory::new(
            RegionGroup::TransformerWeights,
            vec![
                region("token_embedding_table", words(&[vocab, dim])),
                region("rms_att_weight", words(&[n_layers, dim])),
                region("wq", words(&[n_layers, dim, n_heads, head_size])),
                region("wk", wk),
                region("wv", wk),
                region("wo", words(&[n_layers, n_heads, head_size, dim])),
                region("rms_ffn_weight", words(&[n_layers, dim])),
                region("w1", w1),
                region("w2", words(&[n_layers, hidden_dim, dim])),
                region("w3", w1),
                region("rms_final_weight", words(&[dim])),
                region("wcls", words(&[vocab, dim])),
            ],
        );

        let x = words(&[dim]);
        let hb = words(&[hidden_dim]);
        let k = words(&[kv_dim]);
        let key_cache = words(&[n_layers, seq_len, kv_dim]);
        let run_state = GroupMemory::new(
            RegionGroup::RunState,
            vec![
                region("x", x),
                region("xb", x),
                region("xb2", x),
                region("hb", hb),
                region("hb2", hb),
                region("q", x),
                region("k", k),
                region("v", k),
                region("att", words(&[n_heads, seq_len])),
                region("logits", words(&[vocab])),
                region("key_cache", key_cache),
                region("value_cache", key_cache),
            ],
        );

        Self { tokenizer, weights, run_state }
    }

    pub fn groups(&self) -> [&GroupMemory; 3] {
        [&self.tokenizer, &self.weights, &self.run_state]
    }

    /// Every region with its group, in report order.
    pub fn iter(&self) -> impl Iterator<Item = (RegionGroup, &Region)> {
        self.groups()
            .into_iter()
            .flat_map(|g| g.regions.iter().map(move |r| (g.group, r)))
    }

    pub fn get(&self, group: RegionGroup, name: &str) -> Option<u64> {
        self.groups().into_iter().find(|g| g.group == group)?.get(name)
    }

    /// Tokenizer + weights: paid once, whatever the caller count.
    pub fn shared_bytes(&self) -> u64 {
        self.tokenizer.total().saturating_add(self.weights.total())
    }

    /// Run state of a single caller.
    pub fn run_state_bytes(&self) -> u64 {
        self.run_state.total()
    }

    /// Key + value cache of a single caller (the dominant run-state term).
    pub fn kv_cache_bytes(&self) -> u64 {
        let key = self.run_state.get("key_cache").unwrap_or(0);
        let value = self.run_state.get("value_cache").unwrap_or(0);
        key.saturating_add(value)
    }

    /// Total host memory with `callers` concurrent callers.
    pub fn total_bytes(&self, callers: u64) -> u64 {
        self.shared_bytes()
            .saturating_add(self.run_state_bytes().saturating_mul(callers))
    }

    /// Whether `callers` concurrent callers fit in `budget_bytes`.
    pub fn fits(&self, budget_bytes: u64, callers: u64) -> bool {
        self.total_bytes(callers) <= budget_bytes
    }

    /// Largest caller count that still fits in `budget_bytes`.
    ///
    /// Returns 0 when the shared regions alone overflow the budget.
    pub fn max_callers(&self, budget_bytes: u64) -> u64 {
        let Some(free) = budget_bytes.checked_sub(self.shared_bytes()) else {
            return 0;
        };
        match self.run_state_bytes() {
            0 => u64::MAX,
            per_caller => free / per_caller,
        }
    }
}

/// A model config paired with an anticipated number of concurrent callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapacityPlan {
    pub config: ModelConfig,
    pub breakdown: MemoryBreakdown,
    pub callers: u64,
}

impl CapacityPlan {
    pub fn new(config: ModelConfig, callers: u64) -> Self {
        let breakdown = MemoryBreakdown::estimate(&config);
        Self { config, breakdown, callers }
    }

    pub fn total_bytes(&self) -> u64 {
        self.breakdown.total_bytes(self.callers)
    }

    pub fn fits(&self, budget_bytes: u64) -> bool {
        self.breakdown.fits(budget_bytes, self.callers)
    }

    /// Bytes left over in `budget_bytes`, or `None` when the plan overflows.
    pub fn headroom(&self, budget_bytes: u64) -> Option<u64> {
        budget_bytes.checked_sub(self.total_bytes())
    }
}
