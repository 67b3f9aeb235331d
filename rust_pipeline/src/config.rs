//! Pipeline parameters.
//!
//! Loaded from an optional TOML file; every field has a default so an empty
//! file (or no file) gives the standard MIND preprocessing setup.
//!
//! ```toml
//! min_history_length = 5
//! num_negatives = 99
//! npratio = 4
//! negative_policy = "distinct"
//! ```

use std::fs;
use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// How the test-negative sampler treats repeated draws within one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum NegativePolicy {
    /// Only known positives are excluded; the same negative may appear twice.
    #[default]
    AllowRepeats,
    /// Every negative in a row is distinct.
    Distinct,
}

/// How the sequence builder fills `npratio` negatives from a small pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum OversamplePolicy {
    /// Repeat the pool `npratio / len + 1` times, then draw without replacement.
    #[default]
    Cyclic,
    /// Take as many distinct items as possible, then top up with replacement.
    DistinctTopUp,
}

/// Which session represents a user in the interaction encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum SessionChoice {
    /// First session of the user in log order.
    #[default]
    First,
    /// Session with the greatest timestamp (ties: later in the log).
    Latest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub min_history_length: usize,
    pub npratio: usize,
    pub window_size: usize,
    pub num_negatives: usize,
    pub train_ratio: f64,
    pub val_ratio: f64,
    pub random_seed: u64,
    /// Cut-off for HR / NDCG / MRR / precision.
    pub top_k: usize,
    pub negative_policy: NegativePolicy,
    /// Keep a test row's own held-out article out of its negatives.
    pub exclude_held_out: bool,
    pub oversample_policy: OversamplePolicy,
    pub session_choice: SessionChoice,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_history_length: 5,
            npratio: 1,
            window_size: 5,
            num_negatives: 99,
            train_ratio: 0.8,
            val_ratio: 0.2,
            random_seed: 420,
            top_k: 10,
            negative_policy: NegativePolicy::AllowRepeats,
            exclude_held_out: false,
            oversample_policy: OversamplePolicy::Cyclic,
            session_choice: SessionChoice::First,
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: PipelineConfig =
            toml::from_str(s).map_err(|e| PipelineError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        let in_unit = |r: f64| (0.0..=1.0).contains(&r);
        if !in_unit(self.train_ratio) || !in_unit(self.val_ratio) {
            return Err(PipelineError::Config(format!(
                "ratios must lie in [0, 1] (train_ratio={}, val_ratio={})",
                self.train_ratio, self.val_ratio
            )));
        }
        if (self.train_ratio + self.val_ratio - 1.0).abs() > 1e-9 {
            return Err(PipelineError::Config(format!(
                "inconsistent train and val ratios ({}, {})",
                self.train_ratio, self.val_ratio
            )));
        }
        if self.npratio == 0 {
            return Err(PipelineError::Config("npratio must be at least 1".into()));
        }
        if self.window_size == 0 {
            return Err(PipelineError::Config("window_size must be at least 1".into()));
        }
        if self.top_k == 0 {
            return Err(PipelineError::Config("top_k must be at least 1".into()));
        }
        Ok(())
    }
}
