//! Writers for the pipeline's terminal artifacts. All tables are
//! tab-separated with a header row, except the test-negatives file.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::interactions::{InteractionMatrix, InteractionRecord};
use crate::loader::{BEHAVIOR_COLUMNS, NEWS_COLUMNS};
use crate::negative_sampler::TestNegatives;
use crate::records::{Article, Session};
use crate::split::SplitArrays;

pub const INTERACTION_COLUMNS: [&str; 4] = ["user_id", "article_id", "user_int_id", "article_int_id"];

struct TableWriter<'a> {
    path: &'a Path,
    out: BufWriter<File>,
    rows: usize,
}

impl<'a> TableWriter<'a> {
    fn create(path: &'a Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }
        let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
        Ok(TableWriter {
            path,
            out: BufWriter::new(file),
            rows: 0,
        })
    }

    fn line(&mut self, line: &str) -> Result<()> {
        writeln!(self.out, "{line}").map_err(|e| PipelineError::io(self.path, e))?;
        self.rows += 1;
        Ok(())
    }

    fn finish(mut self) -> Result<usize> {
        self.out.flush().map_err(|e| PipelineError::io(self.path, e))?;
        debug!(path = %self.path.display(), lines = self.rows, "wrote table");
        Ok(self.rows)
    }
}

pub fn write_behaviors(path: &Path, sessions: &[Session]) -> Result<()> {
    let mut w = TableWriter::create(path)?;
    w.line(&BEHAVIOR_COLUMNS.join("\t"))?;
    for s in sessions {
        w.line(&format!(
            "{}\t{}\t{}\t{}\t{}",
            s.impression_id,
            s.user_id,
            s.timestamp,
            s.history_field(),
            s.impressions_field()
        ))?;
    }
    w.finish().map(drop)
}

pub fn write_news(path: &Path, articles: &[Article]) -> Result<()> {
    let mut w = TableWriter::create(path)?;
    w.line(&NEWS_COLUMNS.join("\t"))?;
    for a in articles {
        w.line(&[
            a.article_id.as_str(),
            a.category.as_str(),
            a.subcategory.as_str(),
            a.title.as_str(),
            a.abstract_text.as_str(),
            a.url.as_str(),
            a.title_entities.as_str(),
            a.abstract_entities.as_str(),
        ]
        .join("\t"))?;
    }
    w.finish().map(drop)
}

pub fn write_interactions(path: &Path, records: &[InteractionRecord]) -> Result<()> {
    let mut w = TableWriter::create(path)?;
    w.line(&INTERACTION_COLUMNS.join("\t"))?;
    for r in records {
        w.line(&format!(
            "{}\t{}\t{}\t{}",
            r.user_id, r.article_id, r.user_int_id, r.article_int_id
        ))?;
    }
    w.finish().map(drop)
}

/// Coordinate listing of the matrix: `user_int_id, article_int_id, value`.
pub fn write_matrix(path: &Path, matrix: &InteractionMatrix) -> Result<()> {
    let mut w = TableWriter::create(path)?;
    w.line("user_int_id\tarticle_int_id\tvalue")?;
    for u in 0..matrix.num_users() as u32 {
        for &i in matrix.row(u) {
            w.line(&format!("{u}\t{i}\t1.0"))?;
        }
    }
    w.finish().map(drop)
}

/// One line per test interaction: `(u, i)` then the negatives.
pub fn write_test_negatives(path: &Path, rows: &[TestNegatives]) -> Result<()> {
    let mut w = TableWriter::create(path)?;
    for row in rows {
        w.line(&row.to_line())?;
    }
    w.finish().map(drop)
}

fn join_row<'a>(row: impl IntoIterator<Item = &'a u32>) -> String {
    row.into_iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join("\t")
}

/// `seq_{train,val}_{features,labels}.tsv` and `seq_split_indexes.tsv` in `dir`.
///
/// The index file lists each group's position among the positives and the
/// row of the input log it came from.
pub fn write_split(dir: &Path, split: &SplitArrays) -> Result<()> {
    for (name, features, labels) in [
        ("train", &split.train_features, &split.train_labels),
        ("val", &split.val_features, &split.val_labels),
    ] {
        let path = dir.join(format!("seq_{name}_features.tsv"));
        let mut w = TableWriter::create(&path)?;
        let header: Vec<String> = (0..features.ncols().saturating_sub(1))
            .map(|c| format!("hist_{c}"))
            .chain(std::iter::once("target".to_string()))
            .collect();
        w.line(&header.join("\t"))?;
        for row in features.rows() {
            w.line(&join_row(row.iter()))?;
        }
        w.finish()?;

        let path = dir.join(format!("seq_{name}_labels.tsv"));
        let mut w = TableWriter::create(&path)?;
        w.line("label")?;
        for label in labels {
            w.line(&label.to_string())?;
        }
        w.finish()?;
    }

    let path = dir.join("seq_split_indexes.tsv");
    let mut w = TableWriter::create(&path)?;
    w.line("split\tindex\tsession")?;
    for (i, session) in split.train_indexes.iter().zip(&split.train_sessions) {
        w.line(&format!("train\t{i}\t{session}"))?;
    }
    for (i, session) in split.val_indexes.iter().zip(&split.val_sessions) {
        w.line(&format!("val\t{i}\t{session}"))?;
    }
    w.finish().map(drop)
}
