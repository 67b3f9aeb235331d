//! Data preparation for news recommendation on MIND-style click logs.
//!
//! Stages, in pipeline order:
//!   - loader: raw / cleaned behavior and news TSV readers
//!   - dedup: title-based catalog dedup, single-hop canonical id map
//!   - remap: rewrite history and impression ids to canonical ids
//!   - filters: short-history and orphan-article session filters
//!   - interactions: one session per user → coded train/test pairs + matrix
//!   - negative_sampler: reproducible per-row test negatives (rayon)
//!   - sequence: padded history windows with oversampled negatives
//!   - split: session-level train/validation arrays (ndarray)
//!   - evaluator: HR / NDCG / MRR over candidate pools, AUC / P@K over matrices
//!   - export: TSV writers for every artifact
//!
//! `pipeline` chains the stages; the `news-rec` binary drives it from the
//! command line.
//!
//! Build the Python extension: `maturin develop --release --features python`
//! Usage in Python: `import fast_news_pipeline`

pub mod config;
pub mod dedup;
pub mod error;
pub mod evaluator;
pub mod export;
pub mod filters;
pub mod interactions;
pub mod loader;
pub mod negative_sampler;
pub mod pipeline;
pub mod records;
pub mod remap;
pub mod sequence;
pub mod split;

#[cfg(feature = "python")]
mod python;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use records::{Article, Impression, Session};
