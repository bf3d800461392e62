//! The `Page` and `TitlePath` entities (spec section 3).

use std::collections::BTreeMap;

/// One article record keyed by its normalized title.
///
/// Every field is optional on the write side (see `PageRepository::save_pages`):
/// a `None` field leaves the stored value untouched, matching the "writes
/// fields that are non-nil" rule in spec section 4.1. `blob` entries mapped
/// to `None` delete that key from the stored blob map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub title: String,
    pub redirect: Option<String>,
    pub links: Option<Vec<String>>,
    pub linkers: Option<Vec<String>>,
    pub blob: Option<BTreeMap<String, Option<Vec<u8>>>>,
    /// Set only on loads that followed a redirect: the title the caller
    /// originally asked for. Never persisted.
    pub redirector: Option<String>,
}

impl Page {
    /// A page with just a title and resolved links, as produced during
    /// ingestion and by most batch processors.
    pub fn with_links(title: impl Into<String>, links: Vec<String>) -> Self {
        Page {
            title: title.into(),
            links: Some(links),
            ..Default::default()
        }
    }

    /// A redirect stub: `title` redirects to `target`.
    pub fn redirect_to(title: impl Into<String>, target: impl Into<String>) -> Self {
        Page {
            title: title.into(),
            redirect: Some(target.into()),
            ..Default::default()
        }
    }

    /// A page carrying only a single blob entry, as emitted by the
    /// reverse-link processor (spec section 4.4).
    pub fn with_blob_entry(title: impl Into<String>, key: impl Into<String>, value: Vec<u8>) -> Self {
        let mut blob = BTreeMap::new();
        blob.insert(key.into(), Some(value));
        Page {
            title: title.into(),
            blob: Some(blob),
            ..Default::default()
        }
    }

    pub fn is_redirect(&self) -> bool {
        self.redirect.as_deref().is_some_and(|r| !r.is_empty())
    }

    pub fn is_redirected(&self) -> bool {
        self.redirector.is_some()
    }

    /// Sets (or deletes, if `value` is `None`) a single blob key, creating the
    /// blob map if necessary. Mirrors the original's `Page.SetBlob`.
    pub fn set_blob(&mut self, key: impl Into<String>, value: Option<Vec<u8>>) {
        self.blob.get_or_insert_with(BTreeMap::new).insert(key.into(), value);
    }

    pub fn links_iter(&self) -> impl Iterator<Item = &str> {
        self.links.iter().flatten().map(String::as_str)
    }
}

/// An ordered, non-empty sequence of titles forming a search path.
///
/// In-memory only; paths are shared between search frontier nodes, so
/// `catted` never mutates `self` — it returns a new path sharing the old
/// one's storage up to the clone point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitlePath(Vec<String>);

impl TitlePath {
    pub fn new(start: impl Into<String>) -> Self {
        TitlePath(vec![start.into()])
    }

    pub fn head(&self) -> &str {
        self.0.last().expect("TitlePath is never empty")
    }

    /// Returns a new path with `title` appended; `self` is left unchanged.
    pub fn catted(&self, title: impl Into<String>) -> Self {
        let mut next = self.0.clone();
        next.push(title.into());
        TitlePath(next)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn titles(&self) -> &[String] {
        &self.0
    }

    pub fn into_titles(self) -> Vec<String> {
        self.0
    }
}

impl std::fmt::Display for TitlePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join(" -> "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_path_head_and_catted_does_not_mutate() {
        let path = TitlePath::new("dog");
        assert_eq!(path.head(), "dog");

        let next = path.catted("bat");
        assert_eq!(next.head(), "bat");
        assert_eq!(path.head(), "dog", "original path must be unmutated");
        assert_eq!(next.titles(), &["dog".to_string(), "bat".to_string()]);
    }

    #[test]
    fn page_set_blob_creates_and_deletes() {
        let mut page = Page::with_links("Cats", vec!["Dogs".into()]);
        page.set_blob("a", Some(b"1".to_vec()));
        assert_eq!(page.blob.as_ref().unwrap().get("a"), Some(&Some(b"1".to_vec())));

        page.set_blob("a", None);
        assert_eq!(page.blob.as_ref().unwrap().get("a"), Some(&None));
    }
}
