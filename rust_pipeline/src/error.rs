//! Error type shared by every pipeline stage.
//!
//! Bad input data is not an error here: stages drop offending rows and count
//! them in their reports. What ends up in `PipelineError` is either a bad
//! configuration, an unreadable file, or a broken internal assumption.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid parameters (ratio sum, zero window, ...).
    #[error("configuration error: {0}")]
    Config(String),

    /// Input file does not look like the expected table.
    #[error("schema error in {path}: {message}")]
    Schema { path: PathBuf, message: String },

    /// A token inside an otherwise well-formed row could not be parsed.
    #[error("parse error at {path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Parallel lists out of step, scorer output of the wrong length, etc.
    #[error("internal invariant violated: {0}")]
    Invariant(String),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn schema(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        PipelineError::Schema {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Fail with `Invariant` unless two parallel collections have equal length.
pub(crate) fn ensure_same_len(what: &str, left: usize, right: usize) -> Result<()> {
    if left != right {
        return Err(PipelineError::Invariant(format!(
            "{what}: length mismatch ({left} vs {right})"
        )));
    }
    Ok(())
}
