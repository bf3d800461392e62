//! Embedded-KV `PageRepository` backed by `sled`.
//!
//! Grounded in the same shape as `ldobbelsteen-wikipath`'s heed-based
//! `Database`/`ReadTransaction`/`WriteTransaction` (see
//! `examples/other_examples/0dbfe7ef_ldobbelsteen-wikipath__wp-src-database.rs.rs`):
//! one on-disk environment, opened once, shared behind a single handle. Sled
//! replaces LMDB's named sub-databases with a single tree keyed by the
//! normalized title; each value is the bincode-encoded [`StoredRecord`],
//! which is the direct translation of spec section 4.1's per-title bucket
//! (`redir`/`links`/`linkers`/`blob` keys collapsed into one record so that
//! a single sled key holds a whole page, keeping lexicographic tree
//! iteration equal to spec invariant I5 for free).

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{RepoError, RepoResult};
use crate::linkparse::normalize_title;
use crate::model::Page;

use super::{CloseGuard, PageRepository};

/// On-disk representation of one page's bucket. `None` on `redirect`/`links`/
/// `linkers` means the key is absent (spec: "Nil slice → key absent");
/// `Some(vec![])` means present-but-empty ("Empty slice → empty byte value").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredRecord {
    redirect: Option<String>,
    links: Option<Vec<String>>,
    linkers: Option<Vec<String>>,
    blob: BTreeMap<String, Vec<u8>>,
}

pub struct SledRepository {
    tree: sled::Tree,
    db: sled::Db,
    close_guard: CloseGuard,
    // sled serializes individual key writes internally, but a `SavePages`
    // batch must land as a single transaction (spec 4.3 Stage C); this lock
    // makes batches from concurrent callers not interleave.
    write_lock: Mutex<()>,
}

impl SledRepository {
    /// Opens (creating if necessary) a sled database at `path`.
    pub fn open(path: impl AsRef<Path>) -> RepoResult<Self> {
        let path = path.as_ref();
        let db = sled::open(path).map_err(|e| RepoError::Fatal {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;
        let tree = db.open_tree("pages").map_err(|e| RepoError::Fatal {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;

        Ok(SledRepository {
            tree,
            db,
            close_guard: CloseGuard::new(),
            write_lock: Mutex::new(()),
        })
    }

    fn get_record(&self, title: &str) -> RepoResult<Option<StoredRecord>> {
        match self.tree.get(title.as_bytes())? {
            Some(bytes) => {
                let record: StoredRecord = bincode::deserialize(&bytes)
                    .map_err(|e| RepoError::Transient(Box::new(e)))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn put_record(&self, title: &str, record: &StoredRecord) -> RepoResult<()> {
        let bytes = bincode::serialize(record).map_err(|e| RepoError::Transient(Box::new(e)))?;
        self.tree.insert(title.as_bytes(), bytes)?;
        Ok(())
    }

    /// Merges a `Page`'s non-nil fields into the record currently stored at
    /// its (already-normalized) title, per the upsert rule in spec 4.1.
    fn merge(existing: Option<StoredRecord>, page: &Page) -> StoredRecord {
        let mut record = existing.unwrap_or_default();

        if let Some(redirect) = &page.redirect {
            record.redirect = if redirect.is_empty() {
                None
            } else {
                Some(redirect.clone())
            };
        }
        if let Some(links) = &page.links {
            record.links = Some(links.clone());
        }
        if let Some(linkers) = &page.linkers {
            record.linkers = Some(linkers.clone());
        }
        if let Some(blob) = &page.blob {
            for (key, value) in blob {
                match value {
                    Some(bytes) => {
                        record.blob.insert(key.clone(), bytes.clone());
                    }
                    None => {
                        record.blob.remove(key);
                    }
                }
            }
        }

        record
    }

    fn record_to_page(title: &str, record: &StoredRecord, redirector: Option<String>) -> Page {
        Page {
            title: title.to_string(),
            redirect: record.redirect.clone(),
            links: record.links.clone(),
            linkers: record.linkers.clone(),
            blob: if record.blob.is_empty() {
                None
            } else {
                Some(record.blob.iter().map(|(k, v)| (k.clone(), Some(v.clone()))).collect())
            },
            redirector,
        }
    }

    fn key_to_title(key: &sled::IVec) -> String {
        String::from_utf8_lossy(key).into_owned()
    }
}

impl PageRepository for SledRepository {
    fn load_page(&self, title: &str) -> RepoResult<Page> {
        let _token = self.close_guard.retain()?;
        let norm = normalize_title(title);

        let record = self
            .get_record(&norm)?
            .ok_or_else(|| RepoError::NotFound(norm.clone()))?;

        if let Some(target) = record.redirect.clone() {
            if !target.is_empty() {
                // Exactly one hop (invariant I3): the target's own
                // `redirect` field is carried through unchanged, not
                // followed again.
                let target_record = self
                    .get_record(&target)?
                    .ok_or_else(|| RepoError::NotFound(target.clone()))?;
                return Ok(Self::record_to_page(&target, &target_record, Some(norm)));
            }
        }

        Ok(Self::record_to_page(&norm, &record, None))
    }

    fn save_pages(&self, pages: &[Page]) -> RepoResult<()> {
        let _token = self.close_guard.retain()?;
        let _write_lock = self.write_lock.lock().expect("write lock poisoned");

        let mut batch = sled::Batch::default();
        for page in pages {
            let norm = normalize_title(&page.title);
            let existing = self.get_record(&norm)?;
            let merged = Self::merge(existing, page);
            let bytes = bincode::serialize(&merged).map_err(|e| RepoError::Transient(Box::new(e)))?;
            batch.insert(norm.as_bytes(), bytes);
        }
        self.tree.apply_batch(batch)?;
        Ok(())
    }

    fn save_page_blobs(&self, pages: &[Page]) -> RepoResult<()> {
        let _token = self.close_guard.retain()?;
        let _write_lock = self.write_lock.lock().expect("write lock poisoned");

        let mut batch = sled::Batch::default();
        for page in pages {
            let norm = normalize_title(&page.title);
            let mut existing = self.get_record(&norm)?.unwrap_or_default();
            if let Some(blob) = &page.blob {
                for (key, value) in blob {
                    match value {
                        Some(bytes) => {
                            existing.blob.insert(key.clone(), bytes.clone());
                        }
                        None => {
                            existing.blob.remove(key);
                        }
                    }
                }
            }
            let bytes = bincode::serialize(&existing).map_err(|e| RepoError::Transient(Box::new(e)))?;
            batch.insert(norm.as_bytes(), bytes);
        }
        self.tree.apply_batch(batch)?;
        Ok(())
    }

    fn first_page(&self) -> RepoResult<Option<Page>> {
        let _token = self.close_guard.retain()?;
        match self.tree.iter().next() {
            Some(entry) => {
                let (key, bytes) = entry?;
                let record: StoredRecord =
                    bincode::deserialize(&bytes).map_err(|e| RepoError::Transient(Box::new(e)))?;
                Ok(Some(Self::record_to_page(&Self::key_to_title(&key), &record, None)))
            }
            None => Ok(None),
        }
    }

    fn next_page(&self, title: &str) -> RepoResult<Option<Page>> {
        let _token = self.close_guard.retain()?;
        let bound = std::ops::Bound::Excluded(title.as_bytes().to_vec());
        match self.tree.range((bound, std::ops::Bound::Unbounded)).next() {
            Some(entry) => {
                let (key, bytes) = entry?;
                let record: StoredRecord =
                    bincode::deserialize(&bytes).map_err(|e| RepoError::Transient(Box::new(e)))?;
                Ok(Some(Self::record_to_page(&Self::key_to_title(&key), &record, None)))
            }
            None => Ok(None),
        }
    }

    fn next_pages(&self, title: &str, n: usize) -> RepoResult<Vec<Page>> {
        let _token = self.close_guard.retain()?;
        let bound = std::ops::Bound::Excluded(title.as_bytes().to_vec());
        let mut pages = Vec::with_capacity(n);
        for entry in self.tree.range((bound, std::ops::Bound::Unbounded)).take(n) {
            let (key, bytes) = entry?;
            let record: StoredRecord =
                bincode::deserialize(&bytes).map_err(|e| RepoError::Transient(Box::new(e)))?;
            pages.push(Self::record_to_page(&Self::key_to_title(&key), &record, None));
        }
        Ok(pages)
    }

    fn next_titles(&self, title: &str, n: usize) -> RepoResult<Vec<String>> {
        let _token = self.close_guard.retain()?;
        let bound = std::ops::Bound::Excluded(title.as_bytes().to_vec());
        let mut titles = Vec::with_capacity(n);
        for entry in self.tree.range((bound, std::ops::Bound::Unbounded)).take(n) {
            let (key, _) = entry?;
            titles.push(Self::key_to_title(&key));
        }
        Ok(titles)
    }

    fn skip_titles(&self, title: &str, n: usize) -> RepoResult<String> {
        let _token = self.close_guard.retain()?;
        let bound = std::ops::Bound::Excluded(title.as_bytes().to_vec());
        let mut last = String::new();
        for entry in self.tree.range((bound, std::ops::Bound::Unbounded)).take(n) {
            let (key, _) = entry?;
            last = Self::key_to_title(&key);
        }
        Ok(last)
    }

    fn delete_title(&self, title: &str) -> RepoResult<()> {
        let _token = self.close_guard.retain()?;
        let _write_lock = self.write_lock.lock().expect("write lock poisoned");
        let norm = normalize_title(title);
        self.tree.remove(norm.as_bytes())?;
        Ok(())
    }

    fn close(&self) -> RepoResult<()> {
        self.close_guard.begin_close();
        self.tree.flush()?;
        // sled::Db itself has no explicit close; dropping it (when the last
        // `Arc`/owner goes away) releases the file lock. Flushing here
        // guarantees durability before that happens.
        let _ = &self.db;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Page;

    fn temp_repo() -> (tempfile::TempDir, SledRepository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = SledRepository::open(dir.path().join("index")).unwrap();
        (dir, repo)
    }

    #[test]
    fn round_trip_basic_page() {
        let (_dir, repo) = temp_repo();
        let page = Page::with_links("Cats", vec!["Dogs".into(), "Mice".into()]);
        repo.save_page(&page).unwrap();

        let loaded = repo.load_page("cats").unwrap();
        assert_eq!(loaded.title, "Cats");
        assert_eq!(loaded.links, Some(vec!["Dogs".to_string(), "Mice".to_string()]));
        assert_eq!(loaded.redirector, None);
    }

    #[test]
    fn redirect_resolves_exactly_one_hop() {
        let (_dir, repo) = temp_repo();
        repo.save_page(&Page::redirect_to("A", "B")).unwrap();
        repo.save_page(&Page::with_links("B", vec!["X".into(), "Y".into()])).unwrap();

        let loaded = repo.load_page("A").unwrap();
        assert_eq!(loaded.title, "B");
        assert_eq!(loaded.redirector, Some("A".to_string()));
        assert_eq!(loaded.links, Some(vec!["X".to_string(), "Y".to_string()]));

        // B itself also redirects to C: loading A must still stop at B.
        repo.save_page(&Page::redirect_to("B", "C")).unwrap();
        let loaded_a = repo.load_page("A").unwrap();
        assert_eq!(loaded_a.title, "B", "redirect chains must not be followed past one hop");

        repo.save_page(&Page::with_links("C", vec!["Z".into()])).unwrap();
        let loaded_b = repo.load_page("B").unwrap();
        assert_eq!(loaded_b.title, "C");
    }

    #[test]
    fn not_found_for_missing_title() {
        let (_dir, repo) = temp_repo();
        let err = repo.load_page("Nonexistent").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn ordered_iteration_is_lexicographic() {
        let (_dir, repo) = temp_repo();
        for title in ["Zebra", "Apple", "Mango"] {
            repo.save_page(&Page::with_links(title, vec![])).unwrap();
        }

        let titles = repo.next_titles("", 10).unwrap();
        assert_eq!(titles, vec!["Apple".to_string(), "Mango".to_string(), "Zebra".to_string()]);

        let after_apple = repo.next_titles("Apple", 10).unwrap();
        assert_eq!(after_apple, vec!["Mango".to_string(), "Zebra".to_string()]);
    }

    #[test]
    fn save_pages_is_upsert_not_overwrite() {
        let (_dir, repo) = temp_repo();
        repo.save_page(&Page::with_links("A", vec!["B".into()])).unwrap();

        // Saving just a blob entry must not disturb existing links.
        repo.save_page(&Page::with_blob_entry("A", "k", b"v".to_vec())).unwrap();
        let loaded = repo.load_page("A").unwrap();
        assert_eq!(loaded.links, Some(vec!["B".to_string()]));
        assert_eq!(loaded.blob.unwrap().get("k"), Some(&Some(b"v".to_vec())));
    }

    #[test]
    fn delete_title_removes_exact_record() {
        let (_dir, repo) = temp_repo();
        repo.save_page(&Page::with_links("A", vec![])).unwrap();
        repo.delete_title("A").unwrap();
        assert!(repo.load_page("A").unwrap_err().is_not_found());
    }

    #[test]
    fn close_rejects_subsequent_operations() {
        let (_dir, repo) = temp_repo();
        repo.save_page(&Page::with_links("A", vec![])).unwrap();
        repo.close().unwrap();
        assert!(matches!(repo.load_page("A"), Err(RepoError::Closed)));
    }

    #[test]
    fn skip_titles_advances_without_materializing() {
        let (_dir, repo) = temp_repo();
        for title in ["A", "B", "C", "D"] {
            repo.save_page(&Page::with_links(title, vec![])).unwrap();
        }
        let last = repo.skip_titles("", 2).unwrap();
        assert_eq!(last, "B");
        let rest = repo.next_titles(&last, 10).unwrap();
        assert_eq!(rest, vec!["C".to_string(), "D".to_string()]);
    }
}
