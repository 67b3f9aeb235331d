//! Tab-separated readers for the behavior log and the news catalog.
//!
//! Both the raw MIND files (no header) and the cleaned files written by
//! `export` (with header) are accepted; the header is recognised by its first
//! column name.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::interactions::InteractionRecord;
use crate::negative_sampler::TestNegatives;
use crate::records::{Article, Impression, Session};

pub const BEHAVIOR_COLUMNS: [&str; 5] = ["impression_id", "user_id", "time", "history", "impressions"];
pub const NEWS_COLUMNS: [&str; 8] = [
    "article_id",
    "category",
    "subcategory",
    "title",
    "abstract",
    "url",
    "title_entities",
    "abstract_entities",
];

/// Behavior rows plus the number of rows dropped for a missing history or
/// impression list.
#[derive(Debug, Clone, Default)]
pub struct LoadedBehaviors {
    pub sessions: Vec<Session>,
    pub dropped_incomplete: usize,
}

fn check_file_name(path: &Path, marker: &str) -> Result<()> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    if !name.contains(marker) {
        return Err(PipelineError::schema(
            path,
            format!("file does not seem to be the {marker} file"),
        ));
    }
    Ok(())
}

fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| PipelineError::io(path, e))
}

/// Load a behavior log. The file name must contain `behaviors`.
pub fn load_behaviors(path: &Path) -> Result<LoadedBehaviors> {
    check_file_name(path, "behaviors")?;
    let loaded = read_behaviors(open(path)?, path)?;
    info!(
        path = %path.display(),
        sessions = loaded.sessions.len(),
        dropped = loaded.dropped_incomplete,
        "loaded behavior log"
    );
    Ok(loaded)
}

/// Load a news catalog. The file name must contain `news`.
pub fn load_news(path: &Path) -> Result<Vec<Article>> {
    check_file_name(path, "news")?;
    let articles = read_news(open(path)?, path)?;
    info!(path = %path.display(), articles = articles.len(), "loaded news catalog");
    Ok(articles)
}

/// Parse behavior rows from any reader; `origin` is only used in errors.
pub fn read_behaviors<R: BufRead>(reader: R, origin: &Path) -> Result<LoadedBehaviors> {
    let mut out = LoadedBehaviors::default();

    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| PipelineError::io(origin, e))?;
        let line_no = idx + 1;
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if idx == 0 && fields[0] == BEHAVIOR_COLUMNS[0] {
            debug!("skipping behavior header");
            continue;
        }
        if fields.len() != BEHAVIOR_COLUMNS.len() {
            return Err(PipelineError::schema(
                origin,
                format!(
                    "line {line_no}: expected {} columns, found {}",
                    BEHAVIOR_COLUMNS.len(),
                    fields.len()
                ),
            ));
        }

        let history: Vec<String> = fields[3].split_whitespace().map(str::to_string).collect();
        let raw_impressions: Vec<&str> = fields[4].split_whitespace().collect();
        if history.is_empty() || raw_impressions.is_empty() {
            out.dropped_incomplete += 1;
            continue;
        }

        let impressions = raw_impressions
            .iter()
            .map(|tok| {
                Impression::parse(tok).ok_or_else(|| PipelineError::Parse {
                    path: origin.to_path_buf(),
                    line: line_no,
                    message: format!("malformed impression token {tok:?}"),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        out.sessions.push(Session {
            impression_id: fields[0].to_string(),
            user_id: fields[1].to_string(),
            timestamp: fields[2].to_string(),
            history,
            impressions,
        });
    }

    Ok(out)
}

/// Parse catalog rows from any reader; `origin` is only used in errors.
pub fn read_news<R: BufRead>(reader: R, origin: &Path) -> Result<Vec<Article>> {
    let mut articles = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| PipelineError::io(origin, e))?;
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if idx == 0 && fields[0] == NEWS_COLUMNS[0] {
            continue;
        }
        if fields.len() != NEWS_COLUMNS.len() {
            return Err(PipelineError::schema(
                origin,
                format!(
                    "line {}: expected {} columns, found {}",
                    idx + 1,
                    NEWS_COLUMNS.len(),
                    fields.len()
                ),
            ));
        }
        articles.push(Article {
            article_id: fields[0].to_string(),
            category: fields[1].to_string(),
            subcategory: fields[2].to_string(),
            title: fields[3].to_string(),
            abstract_text: fields[4].to_string(),
            url: fields[5].to_string(),
            title_entities: fields[6].to_string(),
            abstract_entities: fields[7].to_string(),
        });
    }

    Ok(articles)
}

/// Read a coded interaction table written by `export::write_interactions`.
pub fn load_interactions(path: &Path) -> Result<Vec<InteractionRecord>> {
    let mut records = Vec::new();
    for (idx, line) in open(path)?.lines().enumerate() {
        let line = line.map_err(|e| PipelineError::io(path, e))?;
        if idx == 0 || line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.trim_end_matches('\r').split('\t').collect();
        let parse_err = || PipelineError::Parse {
            path: path.to_path_buf(),
            line: idx + 1,
            message: format!("malformed interaction row {line:?}"),
        };
        if fields.len() != 4 {
            return Err(parse_err());
        }
        records.push(InteractionRecord {
            user_id: fields[0].to_string(),
            article_id: fields[1].to_string(),
            user_int_id: fields[2].parse().map_err(|_| parse_err())?,
            article_int_id: fields[3].parse().map_err(|_| parse_err())?,
        });
    }
    Ok(records)
}

/// Read a test-negatives file written by `export::write_test_negatives`.
pub fn load_test_negatives(path: &Path) -> Result<Vec<TestNegatives>> {
    let mut rows = Vec::new();
    for (idx, line) in open(path)?.lines().enumerate() {
        let line = line.map_err(|e| PipelineError::io(path, e))?;
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let row = TestNegatives::parse_line(line).ok_or_else(|| PipelineError::Parse {
            path: path.to_path_buf(),
            line: idx + 1,
            message: "expected `(u, i)` followed by negative codes".into(),
        })?;
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const ORIGIN: &str = "behaviors.tsv";

    #[test]
    fn reads_raw_behavior_rows() {
        let raw = "1\tU13740\t11/11/2019 9:05:58 AM\tN55189 N42782\tN55689-1 N35729-0\n";
        let loaded = read_behaviors(Cursor::new(raw), Path::new(ORIGIN)).unwrap();
        assert_eq!(loaded.sessions.len(), 1);
        let s = &loaded.sessions[0];
        assert_eq!(s.user_id, "U13740");
        assert_eq!(s.history, vec!["N55189", "N42782"]);
        assert_eq!(s.impressions.len(), 2);
        assert!(s.impressions[0].clicked);
        assert!(!s.impressions[1].clicked);
    }

    #[test]
    fn skips_header_and_drops_missing_history() {
        let raw = "impression_id\tuser_id\ttime\thistory\timpressions\n\
                   1\tU1\tt\t\tN1-1\n\
                   2\tU2\tt\tN2\tN1-0\n";
        let loaded = read_behaviors(Cursor::new(raw), Path::new(ORIGIN)).unwrap();
        assert_eq!(loaded.sessions.len(), 1);
        assert_eq!(loaded.dropped_incomplete, 1);
        assert_eq!(loaded.sessions[0].user_id, "U2");
    }

    #[test]
    fn wrong_column_count_is_schema_error() {
        let raw = "1\tU1\tt\tN1\n";
        let err = read_behaviors(Cursor::new(raw), Path::new(ORIGIN)).unwrap_err();
        assert!(matches!(err, PipelineError::Schema { .. }));
    }

    #[test]
    fn bad_impression_token_reports_line() {
        let raw = "1\tU1\tt\tN1\tN1-1\n2\tU2\tt\tN1\tN7\n";
        match read_behaviors(Cursor::new(raw), Path::new(ORIGIN)).unwrap_err() {
            PipelineError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn file_name_must_carry_marker() {
        let err = load_behaviors(Path::new("/tmp/clicks.tsv")).unwrap_err();
        assert!(matches!(err, PipelineError::Schema { .. }));
    }

    #[test]
    fn reads_news_rows_with_empty_abstract() {
        let raw = "N1\tnews\tnewsus\tSome title\t\thttps://x\t[]\t[]\n";
        let articles = read_news(Cursor::new(raw), Path::new("news.tsv")).unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Some title");
        assert_eq!(articles[0].abstract_text, "");
    }
}
