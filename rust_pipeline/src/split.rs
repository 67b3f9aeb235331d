//! Session-level train/validation split of sequence examples.
//!
//! The unit of splitting is a positive row together with its `npratio`
//! negatives, so a session never ends up on both sides.

use ndarray::{Array1, Array2};
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::error::{ensure_same_len, PipelineError, Result};
use crate::sequence::ExampleSet;

/// Feature matrices, label vectors and the group indexes behind them.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitArrays {
    pub train_features: Array2<u32>,
    pub val_features: Array2<u32>,
    pub train_labels: Array1<u8>,
    pub val_labels: Array1<u8>,
    /// Positions in `ExampleSet::positives`, in sampled order.
    pub train_indexes: Vec<usize>,
    /// Remaining positions, ascending.
    pub val_indexes: Vec<usize>,
    /// Input-log session of each train group.
    pub train_sessions: Vec<usize>,
    /// Input-log session of each validation group.
    pub val_sessions: Vec<usize>,
}

/// Split `set` by group with a seeded permutation.
///
/// `floor(train_ratio * groups)` groups go to training. Each group is emitted
/// as its positive row (label 1) followed by its negatives (label 0).
pub fn train_val_split(
    set: &ExampleSet,
    train_ratio: f64,
    val_ratio: f64,
    seed: u64,
) -> Result<SplitArrays> {
    if (train_ratio + val_ratio - 1.0).abs() > 1e-9 || !(0.0..=1.0).contains(&train_ratio) {
        return Err(PipelineError::Config(format!(
            "inconsistent train and val ratios ({train_ratio}, {val_ratio})"
        )));
    }
    set.check()?;

    let groups = set.positives.len();
    let n_train = ((train_ratio * groups as f64).floor() as usize).min(groups);

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let train_indexes = index::sample(&mut rng, groups, n_train).into_vec();
    let mut in_train = vec![false; groups];
    for &i in &train_indexes {
        in_train[i] = true;
    }
    let val_indexes: Vec<usize> = (0..groups).filter(|&i| !in_train[i]).collect();

    let to_session = |groups: &[usize]| -> Vec<usize> {
        groups.iter().map(|&g| set.session_index[g]).collect()
    };
    let train_sessions = to_session(&train_indexes);
    let val_sessions = to_session(&val_indexes);

    let (train_features, train_labels) = assemble(set, &train_indexes)?;
    let (val_features, val_labels) = assemble(set, &val_indexes)?;

    info!(
        train_groups = train_indexes.len(),
        val_groups = val_indexes.len(),
        train_rows = train_labels.len(),
        val_rows = val_labels.len(),
        "split sequence examples"
    );

    Ok(SplitArrays {
        train_features,
        val_features,
        train_labels,
        val_labels,
        train_indexes,
        val_indexes,
        train_sessions,
        val_sessions,
    })
}

fn assemble(set: &ExampleSet, groups: &[usize]) -> Result<(Array2<u32>, Array1<u8>)> {
    let rows = groups.len() * (1 + set.npratio);
    let mut flat = Vec::with_capacity(rows * set.width);
    let mut labels = Vec::with_capacity(rows);

    for &g in groups {
        flat.extend_from_slice(&set.positives[g]);
        labels.push(1u8);
        for neg in set.negatives_of(g) {
            flat.extend_from_slice(neg);
            labels.push(0u8);
        }
    }
    ensure_same_len("feature rows vs labels", flat.len(), labels.len() * set.width)?;

    let features = Array2::from_shape_vec((labels.len(), set.width), flat)
        .map_err(|e| PipelineError::Invariant(format!("feature matrix shape: {e}")))?;
    Ok((features, Array1::from(labels)))
}
