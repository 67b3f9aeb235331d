//! User–article interaction tables for collaborative filtering.
//!
//! One session per user is kept; its history minus the last article becomes
//! training interactions and the last article becomes the held-out test
//! interaction. Users and articles get dense integer codes from the training
//! pairs only, and the test pairs reuse those codes.

use ahash::AHashMap;
use tracing::{debug, info};

use crate::config::SessionChoice;
use crate::records::Session;

/// One (user, article) interaction with its integer codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionRecord {
    pub user_id: String,
    pub article_id: String,
    pub user_int_id: u32,
    pub article_int_id: u32,
}

/// Dense, zero-based codes in first-encounter order.
#[derive(Debug, Clone, Default)]
pub struct IdCodes {
    codes: AHashMap<String, u32>,
    ids: Vec<String>,
}

impl IdCodes {
    /// Code for `id`, assigning the next free one if it is new.
    pub fn encode(&mut self, id: &str) -> u32 {
        if let Some(&code) = self.codes.get(id) {
            return code;
        }
        let code = self.ids.len() as u32;
        self.codes.insert(id.to_string(), code);
        self.ids.push(id.to_string());
        code
    }

    pub fn get(&self, id: &str) -> Option<u32> {
        self.codes.get(id).copied()
    }

    pub fn decode(&self, code: u32) -> Option<&str> {
        self.ids.get(code as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Sparse binary users × articles matrix of training interactions.
///
/// Every stored entry has value 1.0; anything else is 0.0.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionMatrix {
    num_users: usize,
    num_articles: usize,
    /// Per-user sorted, distinct article codes.
    rows: Vec<Vec<u32>>,
}

impl InteractionMatrix {
    /// Build from coded pairs. Codes must be below the given dimensions.
    pub fn from_pairs(
        num_users: usize,
        num_articles: usize,
        pairs: impl IntoIterator<Item = (u32, u32)>,
    ) -> Self {
        let mut rows = vec![Vec::new(); num_users];
        for (u, i) in pairs {
            debug_assert!((i as usize) < num_articles);
            rows[u as usize].push(i);
        }
        for row in &mut rows {
            row.sort_unstable();
            row.dedup();
        }
        InteractionMatrix {
            num_users,
            num_articles,
            rows,
        }
    }

    /// Matrix sized by the largest codes present in `records`.
    pub fn from_records(records: &[InteractionRecord]) -> Self {
        let num_users = records.iter().map(|r| r.user_int_id as usize + 1).max().unwrap_or(0);
        let num_articles = records.iter().map(|r| r.article_int_id as usize + 1).max().unwrap_or(0);
        Self::from_pairs(
            num_users,
            num_articles,
            records.iter().map(|r| (r.user_int_id, r.article_int_id)),
        )
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.num_users, self.num_articles)
    }

    pub fn num_users(&self) -> usize {
        self.num_users
    }

    pub fn num_articles(&self) -> usize {
        self.num_articles
    }

    /// Number of stored (non-zero) entries.
    pub fn nnz(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    #[inline]
    pub fn contains(&self, user: u32, article: u32) -> bool {
        self.rows
            .get(user as usize)
            .is_some_and(|row| row.binary_search(&article).is_ok())
    }

    pub fn get(&self, user: u32, article: u32) -> f32 {
        if self.contains(user, article) {
            1.0
        } else {
            0.0
        }
    }

    /// Articles the user interacted with, ascending.
    pub fn row(&self, user: u32) -> &[u32] {
        self.rows.get(user as usize).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of users per article.
    pub fn article_popularity(&self) -> Vec<u32> {
        let mut counts = vec![0u32; self.num_articles];
        for row in &self.rows {
            for &i in row {
                counts[i as usize] += 1;
            }
        }
        counts
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeReport {
    pub users: usize,
    pub articles: usize,
    pub train_pairs: usize,
    pub test_pairs: usize,
    /// Test pairs whose article never occurs in training.
    pub dropped_unseen_article: usize,
    /// Test pairs whose user has no training pair (history of length 1).
    pub dropped_unseen_user: usize,
}

/// Output of [`encode_interactions`].
#[derive(Debug, Clone)]
pub struct EncodedInteractions {
    pub train: Vec<InteractionRecord>,
    pub test: Vec<InteractionRecord>,
    pub users: IdCodes,
    pub articles: IdCodes,
    pub matrix: InteractionMatrix,
    pub report: EncodeReport,
}

/// Pick one session per user, ordered by the user's first appearance.
pub fn sessions_per_user(sessions: &[Session], choice: SessionChoice) -> Vec<&Session> {
    let mut slot: AHashMap<&str, usize> = AHashMap::new();
    let mut chosen: Vec<&Session> = Vec::new();

    for s in sessions {
        match slot.get(s.user_id.as_str()) {
            None => {
                slot.insert(s.user_id.as_str(), chosen.len());
                chosen.push(s);
            }
            Some(&idx) => {
                if choice == SessionChoice::Latest && s.parsed_time() >= chosen[idx].parsed_time() {
                    chosen[idx] = s;
                }
            }
        }
    }
    chosen
}

/// Build coded train/test interactions and the training matrix.
pub fn encode_interactions(sessions: &[Session], choice: SessionChoice) -> EncodedInteractions {
    let retained = sessions_per_user(sessions, choice);
    debug!(users = retained.len(), "retained one session per user");

    let mut users = IdCodes::default();
    let mut articles = IdCodes::default();
    let mut train = Vec::new();
    let mut held_out: Vec<(&str, &str)> = Vec::with_capacity(retained.len());

    for s in &retained {
        let Some((last, rest)) = s.history.split_last() else {
            continue;
        };
        for article in rest {
            train.push(InteractionRecord {
                user_id: s.user_id.clone(),
                article_id: article.clone(),
                user_int_id: users.encode(&s.user_id),
                article_int_id: articles.encode(article),
            });
        }
        held_out.push((s.user_id.as_str(), last.as_str()));
    }

    let mut report = EncodeReport::default();
    let mut test = Vec::with_capacity(held_out.len());
    for (user, article) in held_out {
        let Some(u) = users.get(user) else {
            report.dropped_unseen_user += 1;
            continue;
        };
        let Some(i) = articles.get(article) else {
            report.dropped_unseen_article += 1;
            continue;
        };
        test.push(InteractionRecord {
            user_id: user.to_string(),
            article_id: article.to_string(),
            user_int_id: u,
            article_int_id: i,
        });
    }

    let matrix = InteractionMatrix::from_pairs(
        users.len(),
        articles.len(),
        train.iter().map(|r| (r.user_int_id, r.article_int_id)),
    );

    report.users = users.len();
    report.articles = articles.len();
    report.train_pairs = train.len();
    report.test_pairs = test.len();
    info!(
        users = report.users,
        articles = report.articles,
        train = report.train_pairs,
        test = report.test_pairs,
        nnz = matrix.nnz(),
        dropped_unseen_article = report.dropped_unseen_article,
        dropped_unseen_user = report.dropped_unseen_user,
        "encoded interactions"
    );

    EncodedInteractions {
        train,
        test,
        users,
        articles,
        matrix,
        report,
    }
}
