//! Stage wiring: load → dedup → remap → filter → encode → sample, and the
//! sequence-example and evaluation jobs built on the cleaned log.
//!
//! Each stage takes the previous stage's output by value or by shared
//! reference and hands back a new value; nothing is mutated in place.

use std::path::{Path, PathBuf};
use std::time::Instant;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::config::PipelineConfig;
use crate::dedup::{dedup_catalog, CanonicalMap};
use crate::error::Result;
use crate::evaluator::{
    evaluate_samples, evaluate_train_test, training_sample, PopularityScorer, SampleReport,
    TrainTestReport,
};
use crate::export;
use crate::filters::{history_length_filter, orphan_articles, orphan_filter, FilterReport};
use crate::interactions::{encode_interactions, EncodedInteractions, InteractionMatrix};
use crate::loader;
use crate::negative_sampler::{sample_test_negatives, TestNegatives};
use crate::records::{Article, Session};
use crate::remap::{remap_sessions, RemapAudit};
use crate::sequence::{build_examples, encode_sessions, ArticleVocab, ExampleReport};
use crate::split::{train_val_split, SplitArrays};

/// Canonical catalog and log after dedup, remap and filtering.
#[derive(Debug, Clone)]
pub struct CleanedData {
    pub catalog: Vec<Article>,
    pub sessions: Vec<Session>,
    pub canonical: CanonicalMap,
    pub audit: RemapAudit,
    pub filter: FilterReport,
}

/// Dedup the catalog, canonicalise the log and drop inconsistent sessions.
///
/// Short histories are removed before remapping; orphan detection runs on the
/// remapped survivors against the deduplicated catalog.
pub fn clean(sessions: Vec<Session>, articles: &[Article], cfg: &PipelineConfig) -> CleanedData {
    let by_length = history_length_filter(sessions, cfg.min_history_length);

    let dedup = dedup_catalog(articles);
    let (remapped, audit) = remap_sessions(&by_length.kept, &dedup.canonical);

    let orphans = orphan_articles(&remapped, &dedup.catalog);
    let by_orphan = orphan_filter(remapped, &orphans);

    let filter = FilterReport {
        short_history: by_length.removed.len(),
        orphan_articles: orphans.len(),
        orphan_sessions: by_orphan.removed.len(),
        kept: by_orphan.kept.len(),
    };
    info!(
        short_history = filter.short_history,
        orphan_articles = filter.orphan_articles,
        orphan_sessions = filter.orphan_sessions,
        kept = filter.kept,
        "cleaned behavior log"
    );

    CleanedData {
        catalog: dedup.catalog,
        sessions: by_orphan.kept,
        canonical: dedup.canonical,
        audit,
        filter,
    }
}

/// Everything the `prepare` job produces.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub cleaned: CleanedData,
    pub encoded: EncodedInteractions,
    pub negatives: Vec<TestNegatives>,
}

pub fn prepare(
    sessions: Vec<Session>,
    articles: &[Article],
    cfg: &PipelineConfig,
) -> Result<Prepared> {
    cfg.validate()?;
    let cleaned = clean(sessions, articles, cfg);
    let encoded = encode_interactions(&cleaned.sessions, cfg.session_choice);
    let negatives = sample_test_negatives(
        &encoded.test,
        &encoded.matrix,
        cfg.num_negatives,
        cfg,
        cfg.random_seed,
    )?;
    Ok(Prepared {
        cleaned,
        encoded,
        negatives,
    })
}

/// File names used inside an output directory.
pub mod artifacts {
    pub const BEHAVIORS: &str = "behaviors_processed.tsv";
    pub const NEWS: &str = "news_processed.tsv";
    pub const TRAIN: &str = "train.tsv";
    pub const TEST: &str = "test.tsv";
    pub const TRAIN_MATRIX: &str = "train_matrix.tsv";
    pub const TEST_NEGATIVES: &str = "test_negatives.tsv";
}

pub fn write_prepared(out_dir: &Path, prepared: &Prepared) -> Result<()> {
    export::write_behaviors(&out_dir.join(artifacts::BEHAVIORS), &prepared.cleaned.sessions)?;
    export::write_news(&out_dir.join(artifacts::NEWS), &prepared.cleaned.catalog)?;
    export::write_interactions(&out_dir.join(artifacts::TRAIN), &prepared.encoded.train)?;
    export::write_interactions(&out_dir.join(artifacts::TEST), &prepared.encoded.test)?;
    export::write_matrix(&out_dir.join(artifacts::TRAIN_MATRIX), &prepared.encoded.matrix)?;
    export::write_test_negatives(&out_dir.join(artifacts::TEST_NEGATIVES), &prepared.negatives)?;
    Ok(())
}

/// Counts reported by the `prepare` job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrepareSummary {
    pub sessions_loaded: usize,
    pub sessions_incomplete: usize,
    pub articles_loaded: usize,
    pub articles_kept: usize,
    pub duplicate_ids: usize,
    pub sessions_remapped: usize,
    pub filter: FilterReport,
    pub users: usize,
    pub articles_coded: usize,
    pub train_pairs: usize,
    pub test_pairs: usize,
}

/// Load raw files, run every stage and write the artifacts to `out_dir`.
pub fn run_prepare(
    behaviors: &Path,
    news: &Path,
    out_dir: &Path,
    cfg: &PipelineConfig,
) -> Result<PrepareSummary> {
    let started = Instant::now();
    let loaded = loader::load_behaviors(behaviors)?;
    let articles = loader::load_news(news)?;
    let sessions_loaded = loaded.sessions.len();

    let prepared = prepare(loaded.sessions, &articles, cfg)?;
    write_prepared(out_dir, &prepared)?;

    let summary = PrepareSummary {
        sessions_loaded,
        sessions_incomplete: loaded.dropped_incomplete,
        articles_loaded: articles.len(),
        articles_kept: prepared.cleaned.catalog.len(),
        duplicate_ids: prepared.cleaned.canonical.len(),
        sessions_remapped: prepared.cleaned.audit.sessions_changed,
        filter: prepared.cleaned.filter,
        users: prepared.encoded.report.users,
        articles_coded: prepared.encoded.report.articles,
        train_pairs: prepared.encoded.report.train_pairs,
        test_pairs: prepared.encoded.report.test_pairs,
    };
    info!(
        out = %out_dir.display(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "prepare finished"
    );
    Ok(summary)
}

/// Sequence examples split into train/validation arrays.
#[derive(Debug, Clone)]
pub struct SequenceData {
    pub split: SplitArrays,
    pub report: ExampleReport,
    pub vocab: ArticleVocab,
}

pub fn sequence_data(sessions: &[Session], cfg: &PipelineConfig) -> Result<SequenceData> {
    cfg.validate()?;
    let (encoded, vocab) = encode_sessions(sessions);
    let mut rng = ChaCha8Rng::seed_from_u64(cfg.random_seed);
    let (set, report) = build_examples(
        &encoded,
        cfg.window_size,
        cfg.npratio,
        cfg.oversample_policy,
        &mut rng,
    )?;
    let split = train_val_split(&set, cfg.train_ratio, cfg.val_ratio, cfg.random_seed)?;
    Ok(SequenceData { split, report, vocab })
}

/// Build sequence arrays from a cleaned behavior log and write them to `out_dir`.
pub fn run_sequences(
    behaviors: &Path,
    out_dir: &Path,
    cfg: &PipelineConfig,
) -> Result<SequenceData> {
    let loaded = loader::load_behaviors(behaviors)?;
    let data = sequence_data(&loaded.sessions, cfg)?;
    export::write_split(out_dir, &data.split)?;
    info!(
        out = %out_dir.display(),
        articles = data.vocab.len(),
        train_rows = data.split.train_labels.len(),
        val_rows = data.split.val_labels.len(),
        "sequences finished"
    );
    Ok(data)
}

/// Inputs of the `evaluate` job.
#[derive(Debug, Clone)]
pub struct EvaluateInputs {
    pub train: PathBuf,
    pub test_negatives: PathBuf,
    /// Enables the full-matrix metrics.
    pub test: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EvaluateSummary {
    pub samples: SampleReport,
    pub matrix: Option<TrainTestReport>,
}

/// Evaluate the popularity baseline on prepared artifacts.
pub fn run_evaluate(inputs: &EvaluateInputs, cfg: &PipelineConfig) -> Result<EvaluateSummary> {
    cfg.validate()?;
    let train = loader::load_interactions(&inputs.train)?;
    let held_out = loader::load_test_negatives(&inputs.test_negatives)?;
    let matrix = InteractionMatrix::from_records(&train);
    let scorer = PopularityScorer::from_matrix(&matrix);

    let train_rows = sample_test_negatives(
        &training_sample(&train),
        &matrix,
        cfg.num_negatives,
        cfg,
        cfg.random_seed,
    )?;
    let samples = evaluate_samples(&scorer, &train_rows, &held_out, cfg.top_k)?;

    let matrix_report = match &inputs.test {
        Some(path) => {
            let test = loader::load_interactions(path)?;
            Some(evaluate_train_test(&scorer, &matrix, &test, cfg.top_k)?)
        }
        None => None,
    };

    Ok(EvaluateSummary {
        samples,
        matrix: matrix_report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::Impression;

    fn session(id: &str, user: &str, history: &str, impressions: &str) -> Session {
        Session {
            impression_id: id.into(),
            user_id: user.into(),
            timestamp: String::new(),
            history: history.split_whitespace().map(str::to_string).collect(),
            impressions: impressions
                .split_whitespace()
                .map(|t| Impression::parse(t).unwrap())
                .collect(),
        }
    }

    fn catalog() -> Vec<Article> {
        vec![
            Article::titled("A", "X"),
            Article::titled("B", "X"),
            Article::titled("C", "Y"),
        ]
    }

    #[test]
    fn canonical_scenario() {
        let cfg = PipelineConfig {
            min_history_length: 2,
            ..Default::default()
        };
        let log = vec![
            session("1", "U1", "B C A", "B-1 C-0"),
            session("2", "U2", "B", "A-1"),
        ];
        let cleaned = clean(log, &catalog(), &cfg);
        let ids: Vec<&str> = cleaned.catalog.iter().map(|a| a.article_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "C"]);
        assert_eq!(cleaned.canonical.resolve("B"), "A");
        assert_eq!(cleaned.sessions.len(), 1);
        assert_eq!(cleaned.sessions[0].history, vec!["A", "C", "A"]);
        assert_eq!(cleaned.sessions[0].impressions_field(), "A-1 C-0");
        assert_eq!(cleaned.filter.short_history, 1);
        assert_eq!(cleaned.audit.history_users, vec!["U1"]);
    }

    #[test]
    fn orphans_detected_after_remap() {
        let cfg = PipelineConfig {
            min_history_length: 1,
            ..Default::default()
        };
        // B is not in the deduplicated catalog but remaps to A, so it is no orphan.
        let log = vec![
            session("1", "U1", "B", "C-1"),
            session("2", "U2", "A", "Z-1"),
        ];
        let cleaned = clean(log, &catalog(), &cfg);
        assert_eq!(cleaned.filter.orphan_articles, 1);
        assert_eq!(cleaned.filter.orphan_sessions, 1);
        assert_eq!(cleaned.sessions[0].user_id, "U1");
    }

    #[test]
    fn prepare_rejects_bad_ratios() {
        let cfg = PipelineConfig {
            train_ratio: 0.5,
            val_ratio: 0.6,
            ..Default::default()
        };
        assert!(prepare(vec![], &catalog(), &cfg).is_err());
    }
}
