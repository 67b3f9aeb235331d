//! Windowed training examples for sequence models.
//!
//! Every session becomes one positive row (last `n` history articles + the
//! first clicked impression) and `npratio` negative rows (same window + a
//! non-clicked impression). Rows are integer coded with code 0 reserved for
//! padding short histories.

use ahash::AHashMap;
use rand::seq::{index, SliceRandom};
use rand::Rng;
use tracing::{info, warn};

use crate::config::OversamplePolicy;
use crate::error::{ensure_same_len, PipelineError, Result};
use crate::records::Session;

/// Padding code for history windows shorter than the window size.
pub const PAD: u32 = 0;

/// Article vocabulary over histories and impressions, codes from 1.
#[derive(Debug, Clone, Default)]
pub struct ArticleVocab {
    codes: AHashMap<String, u32>,
    ids: Vec<String>,
}

impl ArticleVocab {
    pub fn encode(&mut self, id: &str) -> u32 {
        if let Some(&code) = self.codes.get(id) {
            return code;
        }
        let code = self.ids.len() as u32 + 1;
        self.codes.insert(id.to_string(), code);
        self.ids.push(id.to_string());
        code
    }

    pub fn get(&self, id: &str) -> Option<u32> {
        self.codes.get(id).copied()
    }

    pub fn decode(&self, code: u32) -> Option<&str> {
        if code == PAD {
            return None;
        }
        self.ids.get(code as usize - 1).map(String::as_str)
    }

    /// Number of real articles (padding excluded).
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// A session with integer-coded history and split impressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedSession {
    pub history: Vec<u32>,
    pub clicked: Vec<u32>,
    pub not_clicked: Vec<u32>,
}

/// Encode sessions in log order; codes follow first encounter.
pub fn encode_sessions(sessions: &[Session]) -> (Vec<EncodedSession>, ArticleVocab) {
    let mut vocab = ArticleVocab::default();
    let encoded = sessions
        .iter()
        .map(|s| {
            let history = s.history.iter().map(|id| vocab.encode(id)).collect();
            let mut clicked = Vec::new();
            let mut not_clicked = Vec::new();
            for imp in &s.impressions {
                let code = vocab.encode(&imp.article_id);
                if imp.clicked {
                    clicked.push(code);
                } else {
                    not_clicked.push(code);
                }
            }
            EncodedSession {
                history,
                clicked,
                not_clicked,
            }
        })
        .collect();
    (encoded, vocab)
}

/// Last `n` history codes, left-padded with [`PAD`].
pub fn history_window(history: &[u32], n: usize) -> Vec<u32> {
    let take = history.len().min(n);
    let mut window = vec![PAD; n - take];
    window.extend_from_slice(&history[history.len() - take..]);
    window
}

/// Pick exactly `npratio` targets from a non-empty negative pool.
pub fn draw_negatives<R: Rng>(
    pool: &[u32],
    npratio: usize,
    policy: OversamplePolicy,
    rng: &mut R,
) -> Vec<u32> {
    debug_assert!(!pool.is_empty());
    if npratio <= pool.len() {
        return index::sample(rng, pool.len(), npratio)
            .into_iter()
            .map(|i| pool[i])
            .collect();
    }
    match policy {
        OversamplePolicy::Cyclic => {
            let copies = npratio / pool.len() + 1;
            let extended: Vec<u32> = pool
                .iter()
                .copied()
                .cycle()
                .take(pool.len() * copies)
                .collect();
            index::sample(rng, extended.len(), npratio)
                .into_iter()
                .map(|i| extended[i])
                .collect()
        }
        OversamplePolicy::DistinctTopUp => {
            let mut out: Vec<u32> = index::sample(rng, pool.len(), pool.len())
                .into_iter()
                .map(|i| pool[i])
                .collect();
            while out.len() < npratio {
                if let Some(&j) = pool.choose(rng) {
                    out.push(j);
                }
            }
            out
        }
    }
}

/// Positive rows and their negatives, grouped `npratio` per positive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExampleSet {
    /// Row width: window size + 1 target column.
    pub width: usize,
    pub npratio: usize,
    /// One row per used session.
    pub positives: Vec<Vec<u32>>,
    /// Negatives of positive `p` live at `p * npratio .. (p + 1) * npratio`.
    pub negatives: Vec<Vec<u32>>,
    /// Input session index of each positive.
    pub session_index: Vec<usize>,
}

impl ExampleSet {
    pub fn len(&self) -> usize {
        self.positives.len() * (1 + self.npratio)
    }

    pub fn is_empty(&self) -> bool {
        self.positives.is_empty()
    }

    /// The `npratio` negative rows that belong to positive `p`.
    pub fn negatives_of(&self, p: usize) -> &[Vec<u32>] {
        &self.negatives[p * self.npratio..(p + 1) * self.npratio]
    }

    /// Check the positive/negative alignment the splitter relies on.
    pub fn check(&self) -> Result<()> {
        ensure_same_len(
            "negatives per positive",
            self.negatives.len(),
            self.positives.len() * self.npratio,
        )?;
        ensure_same_len("session index", self.session_index.len(), self.positives.len())?;
        let mut rows = self.positives.iter().chain(&self.negatives);
        if let Some(row) = rows.find(|r| r.len() != self.width) {
            return Err(PipelineError::Invariant(format!(
                "row of width {} in example set of width {}",
                row.len(),
                self.width
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExampleReport {
    pub sessions: usize,
    pub positives: usize,
    pub skipped_no_click: usize,
    pub skipped_no_negative: usize,
    /// Sessions whose negative pool was smaller than `npratio`.
    pub oversampled: usize,
}

/// Build positive/negative rows for every session that has both a click and
/// a non-clicked impression.
pub fn build_examples<R: Rng>(
    sessions: &[EncodedSession],
    window_size: usize,
    npratio: usize,
    policy: OversamplePolicy,
    rng: &mut R,
) -> Result<(ExampleSet, ExampleReport)> {
    if window_size == 0 || npratio == 0 {
        return Err(PipelineError::Config(
            "window_size and npratio must be at least 1".into(),
        ));
    }

    let mut set = ExampleSet {
        width: window_size + 1,
        npratio,
        ..Default::default()
    };
    let mut report = ExampleReport {
        sessions: sessions.len(),
        ..Default::default()
    };

    for (idx, s) in sessions.iter().enumerate() {
        let Some(&target) = s.clicked.first() else {
            report.skipped_no_click += 1;
            continue;
        };
        if s.not_clicked.is_empty() {
            report.skipped_no_negative += 1;
            continue;
        }
        if s.not_clicked.len() < npratio {
            report.oversampled += 1;
        }

        let window = history_window(&s.history, window_size);
        let mut positive = window.clone();
        positive.push(target);
        set.positives.push(positive);

        for neg in draw_negatives(&s.not_clicked, npratio, policy, rng) {
            let mut row = window.clone();
            row.push(neg);
            set.negatives.push(row);
        }
        set.session_index.push(idx);
    }

    set.check()?;
    report.positives = set.positives.len();

    if report.skipped_no_click + report.skipped_no_negative > 0 {
        warn!(
            no_click = report.skipped_no_click,
            no_negative = report.skipped_no_negative,
            "skipped sessions without a usable positive/negative pair"
        );
    }
    info!(
        positives = report.positives,
        negatives = set.negatives.len(),
        oversampled = report.oversampled,
        "built sequence examples"
    );

    Ok((set, report))
}
