//! Error taxonomy shared by the repository, batch framework and search engine.
//!
//! The kinds mirror spec section 7: `NotFound`, `Closed`, `Invalid`,
//! `Transient`, `Fatal`. Call sites match on the kind rather than the
//! message so the façade and CLI can decide what is user-visible.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by a `PageRepository` implementation.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("No entry for title '{0}'")]
    NotFound(String),

    #[error("repository is closed")]
    Closed,

    #[error("invalid argument: {0}")]
    Invalid(String),

    #[error("transient I/O error: {0}")]
    Transient(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("fatal storage error opening {path}: {source}")]
    Fatal {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl RepoError {
    /// Matches the original Go implementation's behavior of pattern-matching
    /// on "No entry" error messages: true for anything that represents a
    /// missing title rather than an operational failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepoError::NotFound(_))
    }
}

impl From<sled::Error> for RepoError {
    fn from(e: sled::Error) -> Self {
        RepoError::Transient(Box::new(e))
    }
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors surfaced by the path-finding engine.
///
/// Cancellation is deliberately not a variant here: spec section 7 requires
/// it be distinguished from both an error and a "no path" result, so it is
/// folded into `search::Outcome` instead (see `search::mod`).
#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Repo(#[from] RepoError),
}

pub type SearchResult<T> = Result<T, SearchError>;
