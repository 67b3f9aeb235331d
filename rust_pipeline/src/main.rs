//! `news-rec` — batch entrypoint for the MIND preparation pipeline.
//!
//!   news-rec prepare   --behaviors behaviors.tsv --news news.tsv --out data/
//!   news-rec sequences --behaviors data/behaviors_processed.tsv --out data/
//!   news-rec evaluate  --train data/train.tsv --test-negatives data/test_negatives.tsv
//!
//! Parameters come from an optional TOML file, then from flags / `NEWS_REC_*`
//! environment variables (a `.env` file is honoured).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use news_rec_pipeline::config::{NegativePolicy, OversamplePolicy, PipelineConfig, SessionChoice};
use news_rec_pipeline::evaluator::{MatrixMetrics, RankingSummary};
use news_rec_pipeline::pipeline::{self, EvaluateInputs};

#[derive(Parser, Debug)]
#[command(
    name = "news-rec",
    version,
    about = "Clean MIND click logs and build training/evaluation data for news recommenders"
)]
struct Cli {
    /// TOML file with pipeline parameters; flags override it.
    #[arg(long, global = true, env = "NEWS_REC_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines instead of the compact format.
    #[arg(long, global = true, env = "NEWS_REC_JSON_LOGS")]
    json_logs: bool,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dedup, remap, filter, encode interactions and sample test negatives.
    Prepare {
        /// Raw behavior log (file name must contain "behaviors").
        #[arg(long, env = "NEWS_REC_BEHAVIORS")]
        behaviors: PathBuf,
        /// Raw news catalog (file name must contain "news").
        #[arg(long, env = "NEWS_REC_NEWS")]
        news: PathBuf,
        #[arg(long, env = "NEWS_REC_OUT", default_value = "data")]
        out: PathBuf,
    },
    /// Build padded history windows with oversampled negatives and split them.
    Sequences {
        /// Cleaned behavior log written by `prepare`.
        #[arg(long, env = "NEWS_REC_BEHAVIORS")]
        behaviors: PathBuf,
        #[arg(long, env = "NEWS_REC_OUT", default_value = "data")]
        out: PathBuf,
    },
    /// Rank held-out candidates with the popularity baseline.
    Evaluate {
        #[arg(long, env = "NEWS_REC_TRAIN")]
        train: PathBuf,
        #[arg(long, env = "NEWS_REC_TEST_NEGATIVES")]
        test_negatives: PathBuf,
        /// Test interactions; adds AUC / precision / MRR over all articles.
        #[arg(long, env = "NEWS_REC_TEST")]
        test: Option<PathBuf>,
    },
}

/// Per-run overrides of [`PipelineConfig`] fields.
#[derive(Args, Debug, Default)]
struct Overrides {
    #[arg(long, global = true, env = "NEWS_REC_MIN_HISTORY_LENGTH")]
    min_history_length: Option<usize>,
    #[arg(long, global = true, env = "NEWS_REC_NPRATIO")]
    npratio: Option<usize>,
    #[arg(long, global = true, env = "NEWS_REC_WINDOW_SIZE")]
    window_size: Option<usize>,
    #[arg(long, global = true, env = "NEWS_REC_NUM_NEGATIVES")]
    num_negatives: Option<usize>,
    #[arg(long, global = true, env = "NEWS_REC_TRAIN_RATIO")]
    train_ratio: Option<f64>,
    #[arg(long, global = true, env = "NEWS_REC_VAL_RATIO")]
    val_ratio: Option<f64>,
    #[arg(long, global = true, env = "NEWS_REC_SEED")]
    seed: Option<u64>,
    #[arg(long, global = true, env = "NEWS_REC_TOP_K")]
    top_k: Option<usize>,
    #[arg(long, global = true, value_enum, env = "NEWS_REC_NEGATIVE_POLICY")]
    negative_policy: Option<NegativePolicy>,
    /// Never draw a test row's held-out article as one of its negatives.
    #[arg(long, global = true, env = "NEWS_REC_EXCLUDE_HELD_OUT")]
    exclude_held_out: Option<bool>,
    #[arg(long, global = true, value_enum, env = "NEWS_REC_OVERSAMPLE_POLICY")]
    oversample_policy: Option<OversamplePolicy>,
    #[arg(long, global = true, value_enum, env = "NEWS_REC_SESSION_CHOICE")]
    session_choice: Option<SessionChoice>,
}

impl Overrides {
    fn apply(&self, cfg: &mut PipelineConfig) {
        macro_rules! set {
            ($($field:ident => $target:ident),* $(,)?) => {
                $(if let Some(v) = self.$field { cfg.$target = v; })*
            };
        }
        set!(
            min_history_length => min_history_length,
            npratio => npratio,
            window_size => window_size,
            num_negatives => num_negatives,
            train_ratio => train_ratio,
            val_ratio => val_ratio,
            seed => random_seed,
            top_k => top_k,
            negative_policy => negative_policy,
            exclude_held_out => exclude_held_out,
            oversample_policy => oversample_policy,
            session_choice => session_choice,
        );
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("news_rec_pipeline=info,news_rec=info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().compact().with_writer(std::io::stderr)).init();
    }
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut cfg = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    cli.overrides.apply(&mut cfg);
    cfg.validate().context("invalid pipeline parameters")?;
    Ok(cfg)
}

fn print_ranking(label: &str, r: &RankingSummary, k: usize) {
    println!(
        "{label:<9} rows={:<7} HR@{k}={:.4}  NDCG@{k}={:.4}  MRR={:.4}",
        r.evaluated, r.hit_rate, r.ndcg, r.mrr
    );
}

fn print_matrix(label: &str, m: &MatrixMetrics, k: usize) {
    println!(
        "{label:<9} users={:<6} AUC={:.4}  P@{k}={:.4}  MRR={:.4}",
        m.users, m.auc, m.precision_at_k, m.reciprocal_rank
    );
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.json_logs);
    let cfg = load_config(&cli)?;

    match &cli.command {
        Command::Prepare {
            behaviors,
            news,
            out,
        } => {
            let s = pipeline::run_prepare(behaviors, news, out, &cfg)
                .with_context(|| format!("prepare into {}", out.display()))?;
            println!("sessions loaded        {}", s.sessions_loaded);
            println!("  without history      {}", s.sessions_incomplete);
            println!("  short history        {}", s.filter.short_history);
            println!("  remapped             {}", s.sessions_remapped);
            println!("  orphan sessions      {}", s.filter.orphan_sessions);
            println!("  kept                 {}", s.filter.kept);
            println!("articles loaded        {}", s.articles_loaded);
            println!("  duplicates mapped    {}", s.duplicate_ids);
            println!("  kept                 {}", s.articles_kept);
            println!("users / articles coded {} / {}", s.users, s.articles_coded);
            println!("train / test pairs     {} / {}", s.train_pairs, s.test_pairs);
        }
        Command::Sequences { behaviors, out } => {
            let data = pipeline::run_sequences(behaviors, out, &cfg)
                .with_context(|| format!("sequences into {}", out.display()))?;
            let r = data.report;
            println!("sessions               {}", r.sessions);
            println!("  without click        {}", r.skipped_no_click);
            println!("  without negative     {}", r.skipped_no_negative);
            println!("  oversampled          {}", r.oversampled);
            println!("positives              {}", r.positives);
            println!("vocabulary             {}", data.vocab.len());
            println!(
                "train / val rows       {} / {}",
                data.split.train_labels.len(),
                data.split.val_labels.len()
            );
        }
        Command::Evaluate {
            train,
            test_negatives,
            test,
        } => {
            let inputs = EvaluateInputs {
                train: train.clone(),
                test_negatives: test_negatives.clone(),
                test: test.clone(),
            };
            let summary = pipeline::run_evaluate(&inputs, &cfg).context("evaluating baseline")?;
            print_ranking("train", &summary.samples.train, cfg.top_k);
            print_ranking("held-out", &summary.samples.held_out, cfg.top_k);
            if let Some(m) = summary.matrix {
                print_matrix("train", &m.train, cfg.top_k);
                print_matrix("test", &m.test, cfg.top_k);
            }
        }
    }
    Ok(())
}
