//! Ranking evaluation for trained recommenders.
//!
//! Two flavours:
//!   - candidate pools: one positive + its sampled negatives, scored and
//!     ranked → Hit-Rate@K, NDCG@K, reciprocal rank
//!   - full matrices: every article scored per user → AUC, precision@K,
//!     reciprocal rank, averaged over users with at least one positive
//!
//! The model is only seen through [`Scorer`].

use std::cmp::Ordering;

use tracing::info;

use crate::error::{ensure_same_len, PipelineError, Result};
use crate::interactions::{InteractionMatrix, InteractionRecord};
use crate::negative_sampler::TestNegatives;

/// Scores a batch of (user code, article code) pairs, one score per pair.
pub trait Scorer {
    fn score(&self, pairs: &[(u32, u32)]) -> Vec<f32>;
}

impl<F> Scorer for F
where
    F: Fn(&[(u32, u32)]) -> Vec<f32>,
{
    fn score(&self, pairs: &[(u32, u32)]) -> Vec<f32> {
        self(pairs)
    }
}

/// Non-personalised baseline: an article's score is its training popularity.
#[derive(Debug, Clone)]
pub struct PopularityScorer {
    popularity: Vec<u32>,
}

impl PopularityScorer {
    pub fn from_matrix(matrix: &InteractionMatrix) -> Self {
        PopularityScorer {
            popularity: matrix.article_popularity(),
        }
    }
}

impl Scorer for PopularityScorer {
    fn score(&self, pairs: &[(u32, u32)]) -> Vec<f32> {
        pairs
            .iter()
            .map(|&(_, i)| self.popularity.get(i as usize).copied().unwrap_or(0) as f32)
            .collect()
    }
}

/// Per-pair ranking outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HitMetrics {
    pub hit: f64,
    pub ndcg: f64,
    pub reciprocal_rank: f64,
}

/// Metrics of `positive` in a top-K list.
pub fn rank_metrics(top: &[u32], positive: u32) -> HitMetrics {
    match top.iter().position(|&i| i == positive) {
        Some(r) => HitMetrics {
            hit: 1.0,
            ndcg: std::f64::consts::LN_2 / ((r + 2) as f64).ln(),
            reciprocal_rank: 1.0 / (r + 1) as f64,
        },
        None => HitMetrics::default(),
    }
}

fn desc(a: f32, b: f32) -> Ordering {
    let a = if a.is_nan() { f32::NEG_INFINITY } else { a };
    let b = if b.is_nan() { f32::NEG_INFINITY } else { b };
    b.total_cmp(&a)
}

/// The `k` best candidates by descending score; ties keep candidate order.
pub fn top_k(candidates: &[u32], scores: &[f32], k: usize) -> Vec<u32> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| desc(scores[a], scores[b]));
    order.into_iter().take(k).map(|i| candidates[i]).collect()
}

/// Score and rank one test row (negatives first, positive last).
///
/// Repeated negatives are collapsed so each article is ranked once.
pub fn evaluate_row<S: Scorer + ?Sized>(
    scorer: &S,
    row: &TestNegatives,
    k: usize,
) -> Result<HitMetrics> {
    let mut candidates: Vec<u32> = Vec::with_capacity(row.negatives.len() + 1);
    for &j in row.negatives.iter().chain(std::iter::once(&row.positive)) {
        if !candidates.contains(&j) {
            candidates.push(j);
        }
    }
    let pairs: Vec<(u32, u32)> = candidates.iter().map(|&i| (row.user, i)).collect();
    let scores = scorer.score(&pairs);
    ensure_same_len("scores vs candidates", scores.len(), pairs.len())?;

    Ok(rank_metrics(&top_k(&candidates, &scores, k), row.positive))
}

/// Mean HR / NDCG / MRR over a set of candidate pools.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RankingSummary {
    pub evaluated: usize,
    pub hit_rate: f64,
    pub ndcg: f64,
    pub mrr: f64,
}

pub fn evaluate_candidates<S: Scorer + ?Sized>(
    scorer: &S,
    rows: &[TestNegatives],
    k: usize,
) -> Result<RankingSummary> {
    let mut sum = HitMetrics::default();
    for row in rows {
        let m = evaluate_row(scorer, row, k)?;
        sum.hit += m.hit;
        sum.ndcg += m.ndcg;
        sum.reciprocal_rank += m.reciprocal_rank;
    }
    let n = rows.len().max(1) as f64;
    Ok(RankingSummary {
        evaluated: rows.len(),
        hit_rate: sum.hit / n,
        ndcg: sum.ndcg / n,
        mrr: sum.reciprocal_rank / n,
    })
}

/// Candidate-pool metrics on a training sample and on the held-out sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SampleReport {
    pub train: RankingSummary,
    pub held_out: RankingSummary,
}

pub fn evaluate_samples<S: Scorer + ?Sized>(
    scorer: &S,
    train_rows: &[TestNegatives],
    held_out_rows: &[TestNegatives],
    k: usize,
) -> Result<SampleReport> {
    let report = SampleReport {
        train: evaluate_candidates(scorer, train_rows, k)?,
        held_out: evaluate_candidates(scorer, held_out_rows, k)?,
    };
    info!(
        k,
        hr_train = report.train.hit_rate,
        hr_held_out = report.held_out.hit_rate,
        ndcg_train = report.train.ndcg,
        ndcg_held_out = report.held_out.ndcg,
        mrr_train = report.train.mrr,
        mrr_held_out = report.held_out.mrr,
        "candidate ranking metrics"
    );
    Ok(report)
}

/// Last training interaction of every user, as a training-side sample.
pub fn training_sample(train: &[InteractionRecord]) -> Vec<InteractionRecord> {
    let mut last: Vec<Option<&InteractionRecord>> = Vec::new();
    for rec in train {
        let u = rec.user_int_id as usize;
        if last.len() <= u {
            last.resize(u + 1, None);
        }
        last[u] = Some(rec);
    }
    last.into_iter().flatten().cloned().collect()
}

/// Means over users of AUC, precision@K and reciprocal rank.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MatrixMetrics {
    pub users: usize,
    pub auc: f64,
    pub precision_at_k: f64,
    pub reciprocal_rank: f64,
}

/// Score every article for every user that has positives in `positives`.
pub fn evaluate_matrix<S: Scorer + ?Sized>(
    scorer: &S,
    positives: &InteractionMatrix,
    k: usize,
) -> Result<MatrixMetrics> {
    let n_items = positives.num_articles();
    let all_items: Vec<u32> = (0..n_items as u32).collect();
    let mut out = MatrixMetrics::default();

    for u in 0..positives.num_users() as u32 {
        let row = positives.row(u);
        if row.is_empty() {
            continue;
        }
        let pairs: Vec<(u32, u32)> = all_items.iter().map(|&i| (u, i)).collect();
        let scores = scorer.score(&pairs);
        ensure_same_len("scores vs articles", scores.len(), pairs.len())?;

        out.auc += auc(row, &scores);
        let top = top_k(&all_items, &scores, k);
        let hits = top.iter().filter(|&&i| row.binary_search(&i).is_ok()).count();
        out.precision_at_k += hits as f64 / k as f64;

        let best = row
            .iter()
            .map(|&i| scores[i as usize])
            .max_by(|a, b| desc(*b, *a))
            .unwrap_or(f32::NEG_INFINITY);
        let ahead = scores.iter().filter(|&&s| desc(s, best) == Ordering::Less).count();
        out.reciprocal_rank += 1.0 / (ahead + 1) as f64;

        out.users += 1;
    }

    if out.users > 0 {
        let n = out.users as f64;
        out.auc /= n;
        out.precision_at_k /= n;
        out.reciprocal_rank /= n;
    }
    Ok(out)
}

/// Fraction of (positive, negative) pairs ordered correctly; ties count half.
fn auc(positive_items: &[u32], scores: &[f32]) -> f64 {
    let clean = |s: f32| if s.is_nan() { f32::NEG_INFINITY } else { s };
    let mut neg: Vec<f32> = scores
        .iter()
        .enumerate()
        .filter(|(i, _)| positive_items.binary_search(&(*i as u32)).is_err())
        .map(|(_, &s)| clean(s))
        .collect();
    if neg.is_empty() {
        return 1.0;
    }
    neg.sort_by(|a, b| a.total_cmp(b));

    let mut correct = 0.0;
    for &i in positive_items {
        let s = clean(scores[i as usize]);
        let below = neg.partition_point(|&x| x < s);
        let not_above = neg.partition_point(|&x| x <= s);
        correct += below as f64 + 0.5 * (not_above - below) as f64;
    }
    correct / (positive_items.len() as f64 * neg.len() as f64)
}

/// Matrix metrics on the training interactions and on the test interactions.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrainTestReport {
    pub train: MatrixMetrics,
    pub test: MatrixMetrics,
}

pub fn evaluate_train_test<S: Scorer + ?Sized>(
    scorer: &S,
    train: &InteractionMatrix,
    test: &[InteractionRecord],
    k: usize,
) -> Result<TrainTestReport> {
    let (users, articles) = train.shape();
    if let Some(r) = test
        .iter()
        .find(|r| r.user_int_id as usize >= users || r.article_int_id as usize >= articles)
    {
        return Err(PipelineError::Invariant(format!(
            "test pair ({}, {}) outside the {users} x {articles} training matrix",
            r.user_int_id, r.article_int_id
        )));
    }
    let test_matrix = InteractionMatrix::from_pairs(
        users,
        articles,
        test.iter().map(|r| (r.user_int_id, r.article_int_id)),
    );
    let report = TrainTestReport {
        train: evaluate_matrix(scorer, train, k)?,
        test: evaluate_matrix(scorer, &test_matrix, k)?,
    };
    info!(
        auc_train = report.train.auc,
        auc_test = report.test.auc,
        precision_train = report.train.precision_at_k,
        precision_test = report.test.precision_at_k,
        mrr_train = report.train.reciprocal_rank,
        mrr_test = report.test.reciprocal_rank,
        "matrix ranking metrics"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn by_article(weights: Vec<f32>) -> impl Fn(&[(u32, u32)]) -> Vec<f32> {
        move |pairs: &[(u32, u32)]| pairs.iter().map(|&(_, i)| weights[i as usize]).collect()
    }

    #[test]
    fn metrics_at_rank_r() {
        for r in 0..5usize {
            let mut top = vec![10, 11, 12, 13, 14];
            top[r] = 99;
            let m = rank_metrics(&top, 99);
            assert_eq!(m.hit, 1.0);
            assert!((m.ndcg - 2f64.ln() / ((r + 2) as f64).ln()).abs() < 1e-12);
            assert!((m.reciprocal_rank - 1.0 / (r + 1) as f64).abs() < 1e-12);
        }
        assert_eq!(rank_metrics(&[1, 2, 3], 99), HitMetrics::default());
    }

    #[test]
    fn positive_outside_top_k_scores_zero() {
        let scorer = by_article(vec![0.9, 0.8, 0.7, 0.1]);
        let row = TestNegatives {
            user: 0,
            positive: 3,
            negatives: vec![0, 1, 2],
        };
        assert_eq!(evaluate_row(&scorer, &row, 3).unwrap(), HitMetrics::default());
        let m = evaluate_row(&scorer, &row, 4).unwrap();
        assert_eq!(m.hit, 1.0);
        assert!((m.reciprocal_rank - 0.25).abs() < 1e-12);
    }

    #[test]
    fn ties_favour_earlier_candidates() {
        let scorer = |pairs: &[(u32, u32)]| vec![0.5f32; pairs.len()];
        let row = TestNegatives {
            user: 0,
            positive: 7,
            negatives: vec![1, 2],
        };
        let m = evaluate_row(&scorer, &row, 10).unwrap();
        assert!((m.reciprocal_rank - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn wrong_score_count_is_invariant_error() {
        let scorer = |_: &[(u32, u32)]| vec![1.0f32];
        let row = TestNegatives {
            user: 0,
            positive: 1,
            negatives: vec![2, 3],
        };
        assert!(matches!(
            evaluate_row(&scorer, &row, 2),
            Err(PipelineError::Invariant(_))
        ));
    }

    #[test]
    fn perfect_scorer_matrix_metrics() {
        let positives = InteractionMatrix::from_pairs(2, 4, vec![(0, 0), (1, 0), (1, 1)]);
        let scorer = by_article(vec![4.0, 3.0, 2.0, 1.0]);
        let m = evaluate_matrix(&scorer, &positives, 2).unwrap();
        assert_eq!(m.users, 2);
        assert!((m.auc - 1.0).abs() < 1e-12);
        assert!((m.reciprocal_rank - 1.0).abs() < 1e-12);
        // user 0: 1 of top-2, user 1: 2 of top-2
        assert!((m.precision_at_k - 0.75).abs() < 1e-12);
    }

    #[test]
    fn auc_counts_ties_half() {
        assert!((auc(&[0], &[1.0, 1.0, 0.0]) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn popularity_baseline_and_summary() {
        let train = InteractionMatrix::from_pairs(3, 3, vec![(0, 2), (1, 2), (2, 1)]);
        let scorer = PopularityScorer::from_matrix(&train);
        let rows = vec![
            TestNegatives { user: 0, positive: 2, negatives: vec![0, 1] },
            TestNegatives { user: 1, positive: 0, negatives: vec![1, 2] },
        ];
        let s = evaluate_candidates(&scorer, &rows, 1).unwrap();
        assert_eq!(s.evaluated, 2);
        assert!((s.hit_rate - 0.5).abs() < 1e-12);
        assert!((s.mrr - 0.5).abs() < 1e-12);
    }

    #[test]
    fn training_sample_takes_last_pair_per_user() {
        let rec = |u: u32, i: u32| InteractionRecord {
            user_id: format!("U{u}"),
            article_id: format!("N{i}"),
            user_int_id: u,
            article_int_id: i,
        };
        let sample = training_sample(&[rec(0, 1), rec(0, 2), rec(1, 3)]);
        assert_eq!(sample, vec![rec(0, 2), rec(1, 3)]);
    }

    #[test]
    fn test_pairs_outside_training_shape_are_rejected() {
        let rec = |u: u32, i: u32| InteractionRecord {
            user_id: format!("U{u}"),
            article_id: format!("N{i}"),
            user_int_id: u,
            article_int_id: i,
        };
        let train = InteractionMatrix::from_pairs(1, 3, vec![(0, 0), (0, 1)]);
        let scorer = PopularityScorer::from_matrix(&train);
        for bad in [rec(4, 1), rec(0, 9)] {
            assert!(matches!(
                evaluate_train_test(&scorer, &train, &[bad], 2),
                Err(PipelineError::Invariant(_))
            ));
        }
        let ok = evaluate_train_test(&scorer, &train, &[rec(0, 2)], 2).unwrap();
        assert_eq!(ok.test.users, 1);
    }
}
