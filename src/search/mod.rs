//! The path-finding engine (spec section 4.5, component C6): a shared
//! `PathFinder` capability with concurrent-BFS (default), serial-BFS
//! (reference/test) and IDDFS implementations.

pub mod bfs;
pub mod iddfs;

use tokio_util::sync::CancellationToken;

use crate::error::SearchResult;
use crate::model::TitlePath;

/// The result of a search, distinct from an error: cancellation and "no
/// path exists" are both legitimate non-error terminations (spec section 7;
/// see the note on `error::SearchError`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Found(TitlePath),
    NotFound,
    Cancelled,
}

/// `start` and `end` are assumed already normalized and redirect-resolved
/// by the façade (spec section 4.6) — a `PathFinder` never re-resolves
/// redirects on its own endpoints, only on nodes it discovers mid-search.
pub trait PathFinder: Send + Sync {
    fn find_path(&self, start: &str, end: &str, cancel: CancellationToken) -> SearchResult<Outcome>;
}
