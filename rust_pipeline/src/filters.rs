//! Session-level consistency filters.
//!
//!   - history_length_filter → drop users with too short a reading history
//!   - orphan_filter         → drop sessions that reference unknown articles
//!
//! The length filter runs first, so orphans are computed only over sessions
//! that can survive it.
//!
//! Filters only remove rows; surviving sessions are returned unchanged and in
//! their original order.

use ahash::AHashSet;
use rayon::prelude::*;

use crate::records::{Article, Session};

/// Result of a filter operation.
#[derive(Debug, Clone, Default)]
pub struct FilterResult {
    /// Sessions that passed the filter.
    pub kept: Vec<Session>,
    /// Impression ids of the sessions that were removed.
    pub removed: Vec<String>,
}

/// Rows removed by each filter pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterReport {
    pub short_history: usize,
    pub orphan_articles: usize,
    pub orphan_sessions: usize,
    pub kept: usize,
}

/// Drop sessions with fewer than `min_len` history tokens.
pub fn history_length_filter(sessions: Vec<Session>, min_len: usize) -> FilterResult {
    let mut kept = Vec::with_capacity(sessions.len());
    let mut removed = Vec::new();

    for s in sessions {
        if s.history.len() >= min_len {
            kept.push(s);
        } else {
            removed.push(s.impression_id);
        }
    }

    FilterResult { kept, removed }
}

/// Article ids referenced in the log but absent from the catalog.
pub fn orphan_articles(sessions: &[Session], catalog: &[Article]) -> AHashSet<String> {
    let known: AHashSet<&str> = catalog.iter().map(|a| a.article_id.as_str()).collect();
    sessions
        .iter()
        .flat_map(Session::article_ids)
        .filter(|id| !known.contains(id))
        .map(str::to_string)
        .collect()
}

/// Drop every session that references at least one of `orphans`, in its
/// history or in its impressions.
pub fn orphan_filter(sessions: Vec<Session>, orphans: &AHashSet<String>) -> FilterResult {
    if orphans.is_empty() {
        return FilterResult {
            kept: sessions,
            removed: Vec::new(),
        };
    }

    let flagged: Vec<(Session, bool)> = sessions
        .into_par_iter()
        .map(|s| {
            let is_orphan = s.article_ids().any(|id| orphans.contains(id));
            (s, is_orphan)
        })
        .collect();

    let mut kept = Vec::with_capacity(flagged.len());
    let mut removed = Vec::new();
    for (s, is_orphan) in flagged {
        if is_orphan {
            removed.push(s.impression_id);
        } else {
            kept.push(s);
        }
    }

    FilterResult { kept, removed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::Impression;

    fn session(id: &str, history: &[&str], shown: &[&str]) -> Session {
        Session {
            impression_id: id.into(),
            user_id: format!("U{id}"),
            timestamp: String::new(),
            history: history.iter().map(|s| s.to_string()).collect(),
            impressions: shown
                .iter()
                .map(|a| Impression {
                    article_id: a.to_string(),
                    clicked: false,
                })
                .collect(),
        }
    }

    fn catalog(ids: &[&str]) -> Vec<Article> {
        ids.iter().map(|id| Article::titled(*id, format!("title {id}"))).collect()
    }

    #[test]
    fn short_histories_are_dropped() {
        let out = history_length_filter(
            vec![session("1", &["B"], &["A"]), session("2", &["A", "C"], &["A"])],
            2,
        );
        assert_eq!(out.kept.len(), 1);
        assert_eq!(out.removed, vec!["1"]);
    }

    #[test]
    fn orphans_in_history_or_impressions_drop_the_session() {
        let log = vec![
            session("1", &["A", "C"], &["A"]),
            session("2", &["A", "Z"], &["A"]),
            session("3", &["A", "C"], &["Q"]),
        ];
        let cat = catalog(&["A", "C"]);
        let orphans = orphan_articles(&log, &cat);
        assert_eq!(orphans.len(), 2);
        let out = orphan_filter(log, &orphans);
        assert_eq!(out.kept.len(), 1);
        assert_eq!(out.kept[0].impression_id, "1");
        assert_eq!(out.removed, vec!["2", "3"]);
    }

    #[test]
    fn survivors_satisfy_both_predicates() {
        let log = vec![
            session("1", &["A", "A", "C", "A", "C"], &["C"]),
            session("2", &["A", "C", "X", "A", "C"], &["C"]),
            session("3", &["A", "C"], &["C"]),
        ];
        let cat = catalog(&["A", "C"]);
        let by_length = history_length_filter(log, 5);
        let orphans = orphan_articles(&by_length.kept, &cat);
        let kept = orphan_filter(by_length.kept, &orphans).kept;
        let known: AHashSet<&str> = cat.iter().map(|a| a.article_id.as_str()).collect();
        assert_eq!(kept.len(), 1);
        for s in &kept {
            assert!(s.history.len() >= 5);
            assert!(s.article_ids().all(|id| known.contains(id)));
        }
    }
}
