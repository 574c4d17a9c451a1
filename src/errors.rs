//! Error taxonomy shared by every layer of the engine
//!
//! Local failures (I/O, missing objects) surface immediately; network failures
//! are marked retryable and left to the caller's retry policy.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("network error: {0}")]
    Network(String),

    #[error("non-fast-forward update rejected for branch {branch}")]
    NonFastForward { branch: String },

    #[error("merge conflict in {}", display_paths(.paths))]
    MergeConflict { paths: Vec<PathBuf> },

    #[error("nothing to commit")]
    NothingToCommit,

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("repository at {} is already locked by another handle", .0.display())]
    AlreadyLocked(PathBuf),

    #[error("local changes would be overwritten in {}", display_paths(.paths))]
    UncommittedChanges { paths: Vec<PathBuf> },

    #[error("corrupt object: {0}")]
    Corrupt(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, VcsError>;

impl VcsError {
    /// Only transport-level failures may be retried as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VcsError::Network(_))
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        VcsError::Io {
            path: path.into(),
            source,
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Attach the offending path to an `std::io::Result`.
pub trait IoResultExt<T> {
    fn at(self, path: &Path) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn at(self, path: &Path) -> Result<T> {
        self.map_err(|source| VcsError::io(path, source))
    }
}
