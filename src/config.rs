//! Run settings for a chain, loadable from JSON.
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Could not parse chain settings: {0}")]
    Parse(String),
    #[error("Invalid setting '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub seed: u64,
    pub iterations: usize,
    /// Tune tunable moves every this many iterations. Zero disables tuning.
    pub tune_every: usize,
    /// No tuning after this iteration.
    pub tune_until: usize,
    pub sample_every: usize,
    pub replicates: usize,
    /// Power applied to the likelihood ratio. 1.0 is the cold chain.
    pub heat: f64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self { seed: 1, iterations: 10_000, tune_every: 100, tune_until: 5_000, sample_every: 10, replicates: 1, heat: 1.0 }
    }
}

impl ChainConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_every == 0 {
            return Err(ConfigError::Invalid { field: "sample_every", reason: "must be at least 1".into() });
        }
        if self.replicates == 0 {
            return Err(ConfigError::Invalid { field: "replicates", reason: "must be at least 1".into() });
        }
        if !(self.heat > 0.0 && self.heat <= 1.0) {
            return Err(ConfigError::Invalid { field: "heat", reason: format!("must lie in (0, 1], got {}", self.heat) });
        }
        Ok(())
    }

    /// Whether tunable moves should be tuned after `iteration` (1-based) completes.
    pub fn tunes_at(&self, iteration: usize) -> bool {
        self.tune_every > 0 && iteration <= self.tune_until && iteration % self.tune_every == 0
    }
}
