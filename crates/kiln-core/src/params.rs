//! Sampling parameters for start/continue generation calls.

use serde::{Deserialize, Serialize};

/// Parameters sent with every start and continue call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Temperature scaling (0 = greedy, 1 = unchanged distribution).
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Nucleus (top-p) threshold in `[0, 1]`.
    #[serde(default = "default_topp")]
    pub topp: f32,
    /// Number of tokens the host should produce per call.
    #[serde(default = "default_steps")]
    pub steps: u32,
    /// Sampler seed. `0` lets the host pick one.
    #[serde(default)]
    pub rng_seed: u64,
}

fn default_temperature() -> f32 { 0.9 }
fn default_topp() -> f32 { 0.9 }
fn default_steps() -> u32 { 20 }

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            topp: default_topp(),
            steps: default_steps(),
            rng_seed: 0,
        }
    }
}

impl GenerationParams {
    /// Greedy decoding with the given step budget.
    pub fn greedy(steps: u32) -> Self {
        Self {
            temperature: 0.0,
            steps,
            ..Default::default()
        }
    }

    /// Check the parameter ranges before anything is sent to the host.
    pub fn validate(&self) -> Result<(), ParamError> {
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(ParamError::Temperature(self.temperature));
        }
        if !(0.0..=1.0).contains(&self.topp) {
            return Err(ParamError::TopP(self.topp));
        }
        if self.steps == 0 {
            return Err(ParamError::ZeroSteps);
        }
        Ok(())
    }

    /// True when the host is asked to choose the seed.
    pub fn host_picks_seed(&self) -> bool {
        self.rng_seed == 0
    }
}

/// Out-of-range generation parameter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamError {
    #[error("temperature must be a finite value >= 0, got {0}")]
    Temperature(f32),
    #[error("topp must be within [0, 1], got {0}")]
    TopP(f32),
    #[error("step budget must be positive")]
    ZeroSteps,
}
