//! Rewrites duplicate article ids in the behavior log to their canonical id.
//!
//! Each session is transformed independently against the read-only
//! `CanonicalMap`, so the log is processed with rayon.

use ahash::AHashSet;
use rayon::prelude::*;
use tracing::info;

use crate::dedup::CanonicalMap;
use crate::records::{Impression, Session};

/// Result of remapping one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remapped {
    pub session: Session,
    pub history_changed: bool,
    pub impressions_changed: bool,
}

/// Users whose sessions were touched by the remapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemapAudit {
    /// Sorted, distinct.
    pub history_users: Vec<String>,
    /// Sorted, distinct.
    pub impression_users: Vec<String>,
    pub sessions_changed: usize,
}

/// Canonicalise every history and impression id of `session`.
///
/// Click flags are kept as they are. Only ids in the map's change set are
/// looked up.
pub fn remap_session(session: &Session, canonical: &CanonicalMap) -> Remapped {
    let mut history_changed = false;
    let history = session
        .history
        .iter()
        .map(|id| {
            if canonical.needs_change(id) {
                history_changed = true;
                canonical.resolve(id).to_string()
            } else {
                id.clone()
            }
        })
        .collect();

    let mut impressions_changed = false;
    let impressions = session
        .impressions
        .iter()
        .map(|imp| {
            if canonical.needs_change(&imp.article_id) {
                impressions_changed = true;
                Impression {
                    article_id: canonical.resolve(&imp.article_id).to_string(),
                    clicked: imp.clicked,
                }
            } else {
                imp.clone()
            }
        })
        .collect();

    Remapped {
        session: Session {
            impression_id: session.impression_id.clone(),
            user_id: session.user_id.clone(),
            timestamp: session.timestamp.clone(),
            history,
            impressions,
        },
        history_changed,
        impressions_changed,
    }
}

/// Remap a whole log, preserving session order.
pub fn remap_sessions(
    sessions: &[Session],
    canonical: &CanonicalMap,
) -> (Vec<Session>, RemapAudit) {
    if canonical.is_empty() {
        return (sessions.to_vec(), RemapAudit::default());
    }

    let remapped: Vec<Remapped> = sessions
        .par_iter()
        .map(|s| remap_session(s, canonical))
        .collect();

    let mut history_users = AHashSet::new();
    let mut impression_users = AHashSet::new();
    let mut sessions_changed = 0;
    let mut out = Vec::with_capacity(remapped.len());

    for r in remapped {
        if r.history_changed {
            history_users.insert(r.session.user_id.clone());
        }
        if r.impressions_changed {
            impression_users.insert(r.session.user_id.clone());
        }
        if r.history_changed || r.impressions_changed {
            sessions_changed += 1;
        }
        out.push(r.session);
    }

    let mut history_users: Vec<String> = history_users.into_iter().collect();
    history_users.sort_unstable();
    let mut impression_users: Vec<String> = impression_users.into_iter().collect();
    impression_users.sort_unstable();

    info!(
        sessions = out.len(),
        changed = sessions_changed,
        history_users = history_users.len(),
        impression_users = impression_users.len(),
        "remapped duplicate article ids"
    );

    (
        out,
        RemapAudit {
            history_users,
            impression_users,
            sessions_changed,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::dedup_catalog;
    use crate::records::Article;
    use proptest::prelude::*;

    fn canonical_ab() -> CanonicalMap {
        dedup_catalog(&[
            Article::titled("A", "X"),
            Article::titled("B", "X"),
            Article::titled("C", "Y"),
        ])
        .canonical
    }

    fn session(user: &str, history: &[&str], impressions: &[&str]) -> Session {
        Session {
            impression_id: "1".into(),
            user_id: user.into(),
            timestamp: String::new(),
            history: history.iter().map(|s| s.to_string()).collect(),
            impressions: impressions
                .iter()
                .map(|t| Impression::parse(t).unwrap())
                .collect(),
        }
    }

    #[test]
    fn history_b_c_a_becomes_a_c_a() {
        let r = remap_session(&session("U1", &["B", "C", "A"], &["C-0"]), &canonical_ab());
        assert_eq!(r.session.history, vec!["A", "C", "A"]);
        assert!(r.history_changed);
        assert!(!r.impressions_changed);
    }

    #[test]
    fn click_flags_survive_remapping() {
        let r = remap_session(&session("U1", &["C"], &["B-1", "B-0", "C-0"]), &canonical_ab());
        assert_eq!(r.session.impressions_field(), "A-1 A-0 C-0");
        assert!(r.impressions_changed);
    }

    #[test]
    fn tokens_are_matched_whole() {
        // "B" must not touch "BB".
        let r = remap_session(&session("U1", &["BB"], &["BB-1"]), &canonical_ab());
        assert_eq!(r.session.history, vec!["BB"]);
        assert!(!r.history_changed);
    }

    #[test]
    fn audit_lists_touched_users_once() {
        let log = vec![
            session("U2", &["B"], &["C-1"]),
            session("U1", &["C"], &["B-1"]),
            session("U2", &["B", "B"], &["C-1"]),
            session("U3", &["C"], &["C-1"]),
        ];
        let (out, audit) = remap_sessions(&log, &canonical_ab());
        assert_eq!(out.len(), 4);
        assert_eq!(out[0].user_id, "U2");
        assert_eq!(audit.history_users, vec!["U2"]);
        assert_eq!(audit.impression_users, vec!["U1"]);
        assert_eq!(audit.sessions_changed, 3);
    }

    proptest! {
        #[test]
        fn remap_is_idempotent(
            history in prop::collection::vec(prop::sample::select(vec!["A", "B", "C", "D"]), 1..12),
            shown in prop::collection::vec((prop::sample::select(vec!["A", "B", "C"]), any::<bool>()), 1..6),
        ) {
            let map = canonical_ab();
            let s = Session {
                impression_id: "1".into(),
                user_id: "U".into(),
                timestamp: String::new(),
                history: history.iter().map(|s| s.to_string()).collect(),
                impressions: shown
                    .iter()
                    .map(|(id, clicked)| Impression { article_id: id.to_string(), clicked: *clicked })
                    .collect(),
            };
            let once = remap_session(&s, &map).session;
            let twice = remap_session(&once, &map);
            prop_assert_eq!(&twice.session, &once);
            prop_assert!(!twice.history_changed && !twice.impressions_changed);
        }
    }
}
