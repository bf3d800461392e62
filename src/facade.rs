//! The query façade (spec section 4.6, component C7): the entry point a CLI
//! or HTTP handler calls. Validates endpoints, normalizes titles, resolves
//! redirects before handing canonical titles to the configured path finder.
//!
//! Grounded in the original's `api/api.go`.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{RepoError, SearchError, SearchResult};
use crate::linkparse::normalize_title;
use crate::model::Page;
use crate::repo::PageRepository;
use crate::search::{Outcome, PathFinder};

pub struct Facade {
    repo: Arc<dyn PageRepository>,
    finder: Arc<dyn PathFinder>,
}

impl Facade {
    pub fn new(repo: Arc<dyn PageRepository>, finder: Arc<dyn PathFinder>) -> Self {
        Facade { repo, finder }
    }

    /// 1. Reject empty endpoints. 2. Normalize both. 3. Load `start`,
    /// rejecting a load failure or an empty link list. 4. Load `end`,
    /// rejecting a load failure. 5. Search using the **canonical**
    /// (post-redirect) titles. 6. Delegate to the configured finder.
    pub fn lookup_path(&self, start_raw: &str, end_raw: &str, cancel: CancellationToken) -> SearchResult<Outcome> {
        if start_raw.is_empty() || end_raw.is_empty() {
            return Err(SearchError::Repo(RepoError::Invalid(
                "start and end titles must not be empty".to_string(),
            )));
        }

        let start_norm = normalize_title(start_raw);
        let end_norm = normalize_title(end_raw);

        let start_page = self.repo.load_page(&start_norm)?;
        let start_has_links = start_page.links.as_ref().map(|l| !l.is_empty()).unwrap_or(false);
        if !start_has_links {
            return Err(SearchError::Repo(RepoError::Invalid(format!(
                "start page '{start_norm}' has no outgoing links"
            ))));
        }

        let end_page = self.repo.load_page(&end_norm)?;

        self.finder.find_path(&start_page.title, &end_page.title, cancel)
    }

    pub fn lookup_page(&self, title_raw: &str) -> SearchResult<Page> {
        let norm = normalize_title(title_raw);
        Ok(self.repo.load_page(&norm)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::sled_repo::SledRepository;
    use crate::search::bfs::ConcurrentBfs;

    fn build_facade() -> (tempfile::TempDir, Facade) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(SledRepository::open(dir.path()).unwrap());
        repo.save_page(&Page::with_links("Dog", vec!["Cat".to_string()])).unwrap();
        repo.save_page(&Page::with_links("Cat", vec![])).unwrap();
        repo.save_page(&Page::with_links("Lonely", vec![])).unwrap();

        let finder = Arc::new(ConcurrentBfs::with_tuning(repo.clone(), 1024, 2));
        (dir, Facade::new(repo, finder))
    }

    #[test]
    fn lookup_path_rejects_empty_endpoints() {
        let (_dir, facade) = build_facade();
        let result = facade.lookup_path("", "Cat", CancellationToken::new());
        assert!(result.is_err());
    }

    #[test]
    fn lookup_path_rejects_start_with_no_links() {
        let (_dir, facade) = build_facade();
        let result = facade.lookup_path("Lonely", "Cat", CancellationToken::new());
        assert!(result.is_err());
    }

    #[test]
    fn lookup_path_finds_direct_link() {
        let (_dir, facade) = build_facade();
        let outcome = facade.lookup_path("dog", "cat", CancellationToken::new()).unwrap();
        assert_eq!(outcome, Outcome::Found(crate::model::TitlePath::new("Dog").catted("Cat")));
    }

    #[test]
    fn lookup_page_normalizes_title() {
        let (_dir, facade) = build_facade();
        let page = facade.lookup_page("dog").unwrap();
        assert_eq!(page.title, "Dog");
    }
}
