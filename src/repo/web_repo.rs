//! Remote-wiki-HTTP `PageRepository`: loads page content live from a
//! MediaWiki `action=query` API instead of an embedded index.
//!
//! Grounded in the original's `api/apiweb.go`/`wiki/apiweb.go`, which fetch
//! `rvprop=content` for a title and run it through the same link parser used
//! by ingestion. This implementation is read-only and cannot iterate the
//! corpus (there is no "next title" on a live wiki), matching the original's
//! narrower `PageLoader` interface; the write/iterate methods return
//! `RepoError::Invalid` rather than panicking, since the abstract
//! `PageRepository` capability forces them to exist.

use serde::Deserialize;

use crate::error::{RepoError, RepoResult};
use crate::linkparse::{normalize_title, parse_links};
use crate::model::Page;

use super::PageRepository;

const DEFAULT_API_BASE: &str = "https://en.wikipedia.org/w/api.php";

pub struct WebRepository {
    client: reqwest::blocking::Client,
    api_base: String,
}

impl WebRepository {
    pub fn new() -> Self {
        Self::with_api_base(DEFAULT_API_BASE)
    }

    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        WebRepository {
            client: reqwest::blocking::Client::new(),
            api_base: api_base.into(),
        }
    }

    fn fetch_wikitext(&self, title: &str) -> RepoResult<String> {
        let response = self
            .client
            .get(&self.api_base)
            .query(&[
                ("action", "query"),
                ("prop", "revisions"),
                ("rvprop", "content"),
                ("format", "json"),
                ("titles", title),
            ])
            .send()
            .map_err(|e| RepoError::Transient(Box::new(e)))?;

        let query: ApiQueryResponse = response.json().map_err(|e| RepoError::Transient(Box::new(e)))?;

        for page in query.query.pages.into_values() {
            if page.missing.is_some() {
                continue;
            }
            if let Some(revision) = page.revisions.into_iter().next() {
                return Ok(revision.content);
            }
        }

        Err(RepoError::NotFound(title.to_string()))
    }
}

impl Default for WebRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl PageRepository for WebRepository {
    fn load_page(&self, title: &str) -> RepoResult<Page> {
        let norm = normalize_title(title);
        let wikitext = self.fetch_wikitext(&norm)?;
        let links = parse_links(&wikitext);
        Ok(Page::with_links(norm, links))
    }

    fn save_pages(&self, _pages: &[Page]) -> RepoResult<()> {
        Err(RepoError::Invalid(
            "remote wiki repository is read-only".to_string(),
        ))
    }

    fn save_page_blobs(&self, _pages: &[Page]) -> RepoResult<()> {
        Err(RepoError::Invalid(
            "remote wiki repository is read-only".to_string(),
        ))
    }

    fn first_page(&self) -> RepoResult<Option<Page>> {
        Err(RepoError::Invalid(
            "remote wiki repository does not support iteration".to_string(),
        ))
    }

    fn next_page(&self, _title: &str) -> RepoResult<Option<Page>> {
        Err(RepoError::Invalid(
            "remote wiki repository does not support iteration".to_string(),
        ))
    }

    fn next_pages(&self, _title: &str, _n: usize) -> RepoResult<Vec<Page>> {
        Err(RepoError::Invalid(
            "remote wiki repository does not support iteration".to_string(),
        ))
    }

    fn next_titles(&self, _title: &str, _n: usize) -> RepoResult<Vec<String>> {
        Err(RepoError::Invalid(
            "remote wiki repository does not support iteration".to_string(),
        ))
    }

    fn skip_titles(&self, _title: &str, _n: usize) -> RepoResult<String> {
        Err(RepoError::Invalid(
            "remote wiki repository does not support iteration".to_string(),
        ))
    }

    fn delete_title(&self, _title: &str) -> RepoResult<()> {
        Err(RepoError::Invalid(
            "remote wiki repository is read-only".to_string(),
        ))
    }

    fn close(&self) -> RepoResult<()> {
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ApiQueryResponse {
    query: ApiQuery,
}

#[derive(Debug, Deserialize)]
struct ApiQuery {
    pages: std::collections::HashMap<String, ApiPage>,
}

#[derive(Debug, Deserialize)]
struct ApiPage {
    #[serde(default)]
    missing: Option<String>,
    #[serde(default)]
    revisions: Vec<ApiRevision>,
}

#[derive(Debug, Deserialize)]
struct ApiRevision {
    #[serde(rename = "*")]
    content: String,
}
