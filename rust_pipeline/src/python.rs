//! `fast_news_pipeline` Python extension.
//!
//! Thin wrappers over the library stages so notebooks can swap individual
//! pandas steps for the Rust ones. Every pipeline error surfaces as
//! `ValueError`.

use std::cell::RefCell;
use std::collections::HashMap;

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::{NegativePolicy, OversamplePolicy};
use crate::dedup::dedup_catalog;
use crate::error::PipelineError;
use crate::evaluator::{evaluate_candidates as rank_candidates, Scorer};
use crate::interactions::{InteractionMatrix, InteractionRecord};
use crate::negative_sampler::{sample_test_negatives as sample_rows, NegativeRules, TestNegatives};
use crate::records::{Article, Impression, Session};
use crate::sequence::{build_examples, encode_sessions};

fn to_py_err(e: PipelineError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Title deduplication over parallel id / title lists.
///
/// Args:
///     article_ids: catalog ids, in catalog order
///     titles: title of each id
///
/// Returns:
///     (kept ids, {duplicate id: canonical id})
#[pyfunction]
pub fn dedup_titles(
    article_ids: Vec<String>,
    titles: Vec<String>,
) -> PyResult<(Vec<String>, HashMap<String, String>)> {
    crate::error::ensure_same_len("article_ids vs titles", article_ids.len(), titles.len())
        .map_err(to_py_err)?;
    let articles: Vec<Article> = article_ids
        .into_iter()
        .zip(titles)
        .map(|(id, title)| Article::titled(id, title))
        .collect();
    let dedup = dedup_catalog(&articles);
    let kept = dedup.catalog.into_iter().map(|a| a.article_id).collect();
    let mapping = dedup
        .canonical
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Ok((kept, mapping))
}

/// Negatives for held-out (user, article) pairs.
///
/// Args:
///     test_pairs: held-out (user code, article code) pairs
///     train_pairs: training (user code, article code) pairs to exclude
///     num_articles: size of the article code space
///     num_negatives: negatives per test pair
///     distinct: forbid repeats within a row
///     exclude_held_out: never draw the row's own test article
///     seed: base seed; row i uses a seed derived from (seed, i)
///
/// Returns:
///     one list of negative codes per test pair
#[pyfunction]
#[pyo3(signature = (
    test_pairs,
    train_pairs,
    num_articles,
    num_negatives=99,
    distinct=false,
    exclude_held_out=false,
    seed=420,
))]
pub fn sample_test_negatives(
    py: Python<'_>,
    test_pairs: Vec<(u32, u32)>,
    train_pairs: Vec<(u32, u32)>,
    num_articles: usize,
    num_negatives: usize,
    distinct: bool,
    exclude_held_out: bool,
    seed: u64,
) -> PyResult<Vec<Vec<u32>>> {
    if let Some(&(_, i)) = train_pairs.iter().find(|p| p.1 as usize >= num_articles) {
        return Err(PyValueError::new_err(format!(
            "article code {i} outside 0..{num_articles}"
        )));
    }
    let num_users = train_pairs
        .iter()
        .chain(&test_pairs)
        .map(|&(u, _)| u as usize + 1)
        .max()
        .unwrap_or(0);
    let rules = NegativeRules {
        policy: if distinct {
            NegativePolicy::Distinct
        } else {
            NegativePolicy::AllowRepeats
        },
        exclude_held_out,
    };

    py.allow_threads(|| {
        let matrix = InteractionMatrix::from_pairs(num_users, num_articles, train_pairs);
        let test: Vec<InteractionRecord> = test_pairs
            .into_iter()
            .map(|(u, i)| InteractionRecord {
                user_id: String::new(),
                article_id: String::new(),
                user_int_id: u,
                article_int_id: i,
            })
            .collect();
        sample_rows(&test, &matrix, num_negatives, rules, seed)
            .map(|rows| rows.into_iter().map(|r| r.negatives).collect())
    })
    .map_err(to_py_err)
}

/// Padded-history examples with oversampled negatives.
///
/// Args:
///     histories: clicked-article ids per session
///     impressions: `id-0` / `id-1` tokens per session
///     window_size: history positions kept (left-padded with 0)
///     npratio: negatives per positive
///     distinct_top_up: use distinct-then-top-up instead of cyclic oversampling
///     seed: RNG seed
///
/// Returns:
///     (rows, labels, vocabulary) where each positive row is followed by its
///     negatives and vocabulary[c - 1] is the article id of code c
#[pyfunction]
#[pyo3(signature = (histories, impressions, window_size=5, npratio=1, distinct_top_up=false, seed=420))]
pub fn build_sequence_examples(
    histories: Vec<Vec<String>>,
    impressions: Vec<Vec<String>>,
    window_size: usize,
    npratio: usize,
    distinct_top_up: bool,
    seed: u64,
) -> PyResult<(Vec<Vec<u32>>, Vec<u8>, Vec<String>)> {
    crate::error::ensure_same_len("histories vs impressions", histories.len(), impressions.len())
        .map_err(to_py_err)?;
    let sessions = histories
        .into_iter()
        .zip(impressions)
        .map(|(history, tokens)| {
            let impressions = tokens
                .iter()
                .map(|t| {
                    Impression::parse(t).ok_or_else(|| {
                        PyValueError::new_err(format!("malformed impression token {t:?}"))
                    })
                })
                .collect::<PyResult<Vec<_>>>()?;
            Ok(Session {
                impression_id: String::new(),
                user_id: String::new(),
                timestamp: String::new(),
                history,
                impressions,
            })
        })
        .collect::<PyResult<Vec<_>>>()?;

    let policy = if distinct_top_up {
        OversamplePolicy::DistinctTopUp
    } else {
        OversamplePolicy::Cyclic
    };
    let (encoded, vocab) = encode_sessions(&sessions);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let (set, _) =
        build_examples(&encoded, window_size, npratio, policy, &mut rng).map_err(to_py_err)?;

    let mut rows = Vec::with_capacity(set.len());
    let mut labels = Vec::with_capacity(set.len());
    for (p, positive) in set.positives.iter().enumerate() {
        rows.push(positive.clone());
        labels.push(1);
        for negative in set.negatives_of(p) {
            rows.push(negative.clone());
            labels.push(0);
        }
    }
    let ids = (1..=vocab.len() as u32)
        .filter_map(|c| vocab.decode(c).map(str::to_string))
        .collect();
    Ok((rows, labels, ids))
}

/// Adapts a Python `predict(users, articles) -> scores` callable.
struct PyScorer<'py> {
    predict: Bound<'py, PyAny>,
    failure: RefCell<Option<PyErr>>,
}

impl Scorer for PyScorer<'_> {
    fn score(&self, pairs: &[(u32, u32)]) -> Vec<f32> {
        let users: Vec<u32> = pairs.iter().map(|p| p.0).collect();
        let articles: Vec<u32> = pairs.iter().map(|p| p.1).collect();
        match self
            .predict
            .call1((users, articles))
            .and_then(|out| out.extract::<Vec<f32>>())
        {
            Ok(scores) => scores,
            Err(e) => {
                self.failure.borrow_mut().get_or_insert(e);
                Vec::new()
            }
        }
    }
}

/// HR@K, NDCG@K and MRR of a model over sampled candidate pools.
///
/// Args:
///     predict: callable taking (user codes, article codes) and returning one
///         score per pair
///     rows: (user, positive, negatives) triples
///     k: ranking cut-off
///
/// Returns:
///     (hit_rate, ndcg, mrr)
#[pyfunction]
#[pyo3(signature = (predict, rows, k=10))]
pub fn evaluate_candidates(
    predict: Bound<'_, PyAny>,
    rows: Vec<(u32, u32, Vec<u32>)>,
    k: usize,
) -> PyResult<(f64, f64, f64)> {
    let rows: Vec<TestNegatives> = rows
        .into_iter()
        .map(|(user, positive, negatives)| TestNegatives {
            user,
            positive,
            negatives,
        })
        .collect();
    let scorer = PyScorer {
        predict,
        failure: RefCell::new(None),
    };
    let result = rank_candidates(&scorer, &rows, k);
    if let Some(e) = scorer.failure.into_inner() {
        return Err(e);
    }
    let summary = result.map_err(to_py_err)?;
    Ok((summary.hit_rate, summary.ndcg, summary.mrr))
}

/// fast_news_pipeline — Rust stages of the MIND preparation pipeline.
///
/// Functions:
///   - dedup_titles: title-based catalog dedup
///   - sample_test_negatives: per-pair negatives excluding training positives
///   - build_sequence_examples: padded history windows + oversampled negatives
///   - evaluate_candidates: HR / NDCG / MRR for a Python scorer
#[pymodule]
fn fast_news_pipeline(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(dedup_titles, m)?)?;
    m.add_function(wrap_pyfunction!(sample_test_negatives, m)?)?;
    m.add_function(wrap_pyfunction!(build_sequence_examples, m)?)?;
    m.add_function(wrap_pyfunction!(evaluate_candidates, m)?)?;
    Ok(())
}
