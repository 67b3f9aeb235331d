//! Test-negative sampling for ranking evaluation.
//!
//! For every held-out (user, article) pair, `k` article codes are drawn
//! uniformly from the whole catalog, rejecting articles the user is known to
//! have interacted with. Rows are sampled in parallel with rayon; each row
//! owns an RNG seeded from (base seed, row index), so output does not depend
//! on thread scheduling.

use ahash::AHashSet;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::info;

use crate::config::{NegativePolicy, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::interactions::{InteractionMatrix, InteractionRecord};

/// One positive test interaction and its sampled negatives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestNegatives {
    pub user: u32,
    pub positive: u32,
    pub negatives: Vec<u32>,
}

impl TestNegatives {
    /// `(u, i)\tj1\tj2...`
    pub fn to_line(&self) -> String {
        let mut line = format!("({}, {})", self.user, self.positive);
        for j in &self.negatives {
            line.push('\t');
            line.push_str(&j.to_string());
        }
        line
    }

    /// Inverse of [`TestNegatives::to_line`].
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut fields = line.split('\t');
        let pair = fields.next()?.trim();
        let inner = pair.strip_prefix('(')?.strip_suffix(')')?;
        let (u, i) = inner.split_once(',')?;
        let negatives = fields
            .map(|f| f.trim().parse::<u32>().ok())
            .collect::<Option<Vec<_>>>()?;
        Some(TestNegatives {
            user: u.trim().parse().ok()?,
            positive: i.trim().parse().ok()?,
            negatives,
        })
    }
}

/// Per-row seed derivation.
#[inline]
pub(crate) fn row_seed(seed: u64, idx: usize) -> u64 {
    seed.wrapping_add(idx as u64).wrapping_mul(0x517CC1B727220A95)
}

/// What a sampled row must avoid besides the user's training positives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NegativeRules {
    pub policy: NegativePolicy,
    /// Also reject the held-out article of the row being sampled.
    pub exclude_held_out: bool,
}

impl From<NegativePolicy> for NegativeRules {
    fn from(policy: NegativePolicy) -> Self {
        NegativeRules {
            policy,
            exclude_held_out: false,
        }
    }
}

impl From<&PipelineConfig> for NegativeRules {
    fn from(cfg: &PipelineConfig) -> Self {
        NegativeRules {
            policy: cfg.negative_policy,
            exclude_held_out: cfg.exclude_held_out,
        }
    }
}

/// Draw `k` negatives for one test pair.
///
/// Rejected: training positives of `user`, and `positive` when
/// `exclude_held_out` is set. Under [`NegativePolicy::Distinct`] earlier draws
/// of the row are rejected too. Fails if the user has fewer eligible articles
/// than the policy needs.
pub fn sample_negatives<R: Rng>(
    user: u32,
    positive: u32,
    matrix: &InteractionMatrix,
    k: usize,
    rules: impl Into<NegativeRules>,
    rng: &mut R,
) -> Result<Vec<u32>> {
    let NegativeRules {
        policy,
        exclude_held_out,
    } = rules.into();
    if k == 0 {
        return Ok(Vec::new());
    }
    let pool = matrix.num_articles();
    let positive_extra =
        exclude_held_out && !matrix.contains(user, positive) && (positive as usize) < pool;
    let excluded = matrix.row(user).len() + usize::from(positive_extra);
    let eligible = pool.saturating_sub(excluded);
    let needed = match policy {
        NegativePolicy::AllowRepeats => 1,
        NegativePolicy::Distinct => k,
    };
    if eligible < needed {
        return Err(PipelineError::Invariant(format!(
            "user {user} has {eligible} eligible negatives out of {pool}, {needed} required"
        )));
    }

    let mut drawn = AHashSet::new();
    let mut negatives = Vec::with_capacity(k);
    while negatives.len() < k {
        let j = rng.gen_range(0..pool) as u32;
        if (exclude_held_out && j == positive) || matrix.contains(user, j) {
            continue;
        }
        if policy == NegativePolicy::Distinct && !drawn.insert(j) {
            continue;
        }
        negatives.push(j);
    }
    Ok(negatives)
}

/// Sample `k` negatives for every test interaction, in test order.
pub fn sample_test_negatives(
    test: &[InteractionRecord],
    matrix: &InteractionMatrix,
    k: usize,
    rules: impl Into<NegativeRules>,
    seed: u64,
) -> Result<Vec<TestNegatives>> {
    let rules = rules.into();
    let rows = test
        .par_iter()
        .enumerate()
        .map(|(idx, rec)| {
            let mut rng = ChaCha8Rng::seed_from_u64(row_seed(seed, idx));
            let negatives = sample_negatives(
                rec.user_int_id,
                rec.article_int_id,
                matrix,
                k,
                rules,
                &mut rng,
            )?;
            Ok(TestNegatives {
                user: rec.user_int_id,
                positive: rec.article_int_id,
                negatives,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    info!(
        rows = rows.len(),
        per_row = k,
        policy = ?rules.policy,
        exclude_held_out = rules.exclude_held_out,
        "sampled test negatives"
    );
    Ok(rows)
}
