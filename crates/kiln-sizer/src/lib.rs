//! # kiln-sizer
//!
//! Memory estimator for llama2.c-style models deployed into a host with a
//! fixed memory budget.
//!
//! The host holds one tokenizer and one copy of the transformer weights,
//! shared by everyone, plus one run state per concurrent caller. The run
//! state is dominated by the key/value cache, which grows with `seq_len`, so
//! the estimate reports it as its own line item:
//!
//! ```text
//! total = Tokenizer + TransformerWeights + N × RunState  <=  budget
//! ```
//!
//! ```rust
//! use kiln_sizer::{CapacityPlan, ModelConfig};
//!
//! let header: [i32; 7] = [64, 128, 2, 4, 4, -512, 64];
//! let bytes: Vec<u8> = header.iter().flat_map(|v| v.to_le_bytes()).collect();
//! let config = ModelConfig::from_bytes(&bytes).unwrap();
//! assert_eq!(config.vocab.magnitude, 512);
//! assert!(config.vocab.flag);
//!
//! let plan = CapacityPlan::new(config, 4);
//! assert!(plan.fits(4 * 1024 * 1024));
//! ```

pub mod estimate;
pub mod header;
pub mod report;

pub use estimate::{CapacityPlan, GroupMemory, MemoryBreakdown, Region, RegionGroup};
pub use header::{MalformedHeader, ModelConfig, VocabSize, HEADER_BYTES};
pub use report::MarkdownReport;

/// Bytes in one MiB, the unit the reports use.
pub const MIB: u64 = 1024 * 1024;
