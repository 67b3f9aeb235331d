//! Typed rows of the MIND article catalog and behavior log.

use std::fmt;

use chrono::NaiveDateTime;

/// Timestamp format used by the MIND behavior log, e.g. `11/15/2019 8:55:22 AM`.
pub const BEHAVIOR_TIME_FORMAT: &str = "%m/%d/%Y %I:%M:%S %p";

/// One row of the news catalog.
///
/// Only `article_id` and `title` take part in the pipeline; the other fields
/// are carried through to the cleaned catalog untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub article_id: String,
    pub category: String,
    pub subcategory: String,
    pub title: String,
    pub abstract_text: String,
    pub url: String,
    pub title_entities: String,
    pub abstract_entities: String,
}

impl Article {
    /// Article with only id and title set (tests, bindings).
    pub fn titled(article_id: impl Into<String>, title: impl Into<String>) -> Self {
        Article {
            article_id: article_id.into(),
            category: String::new(),
            subcategory: String::new(),
            title: title.into(),
            abstract_text: String::new(),
            url: String::new(),
            title_entities: String::new(),
            abstract_entities: String::new(),
        }
    }
}

/// An article shown during a session and whether it was clicked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Impression {
    pub article_id: String,
    pub clicked: bool,
}

impl Impression {
    /// Parse a raw `N12345-1` token. Returns `None` if the click suffix is
    /// missing or not `0`/`1`.
    pub fn parse(token: &str) -> Option<Self> {
        let (id, flag) = token.rsplit_once('-')?;
        if id.is_empty() {
            return None;
        }
        let clicked = match flag {
            "1" => true,
            "0" => false,
            _ => return None,
        };
        Some(Impression {
            article_id: id.to_string(),
            clicked,
        })
    }
}

impl fmt::Display for Impression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.article_id, if self.clicked { 1 } else { 0 })
    }
}

/// One row of the behavior log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub impression_id: String,
    pub user_id: String,
    pub timestamp: String,
    /// Previously read articles, oldest first.
    pub history: Vec<String>,
    pub impressions: Vec<Impression>,
}

impl Session {
    /// All article ids referenced by the session, history first.
    pub fn article_ids(&self) -> impl Iterator<Item = &str> {
        self.history
            .iter()
            .map(String::as_str)
            .chain(self.impressions.iter().map(|imp| imp.article_id.as_str()))
    }

    pub fn parsed_time(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.timestamp, BEHAVIOR_TIME_FORMAT).ok()
    }

    pub fn history_field(&self) -> String {
        self.history.join(" ")
    }

    pub fn impressions_field(&self) -> String {
        self.impressions
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impression_token_roundtrip() {
        let imp = Impression::parse("N55689-1").unwrap();
        assert_eq!(imp.article_id, "N55689");
        assert!(imp.clicked);
        assert_eq!(imp.to_string(), "N55689-1");
    }

    #[test]
    fn impression_without_suffix_is_rejected() {
        assert!(Impression::parse("N55689").is_none());
        assert!(Impression::parse("N55689-2").is_none());
        assert!(Impression::parse("-1").is_none());
    }

    #[test]
    fn parses_mind_timestamp() {
        let s = Session {
            impression_id: "1".into(),
            user_id: "U1".into(),
            timestamp: "11/11/2019 9:05:58 AM".into(),
            history: vec![],
            impressions: vec![],
        };
        assert!(s.parsed_time().is_some());
    }
}
