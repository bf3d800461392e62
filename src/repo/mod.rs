//! The page repository (spec section 4.1, component C1): a single capability
//! with two implementations, embedded-KV ([`sled_repo::SledRepository`]) and
//! remote-wiki-HTTP ([`web_repo::WebRepository`]).

pub mod sled_repo;
pub mod web_repo;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::{RepoError, RepoResult};
use crate::model::Page;

/// Ordered load/save/iterate capability over the page store (spec section
/// 4.1). Implementations must be safe to share across threads: the batch
/// framework and the BFS engine both hold one behind an `Arc` and call it
/// concurrently from many workers.
pub trait PageRepository: Send + Sync {
    fn load_page(&self, title: &str) -> RepoResult<Page>;

    /// All-or-nothing: if any title is missing, the whole call fails.
    fn load_pages(&self, titles: &[String]) -> RepoResult<Vec<Page>> {
        titles.iter().map(|t| self.load_page(t)).collect()
    }

    fn save_page(&self, page: &Page) -> RepoResult<()> {
        self.save_pages(std::slice::from_ref(page))
    }

    fn save_pages(&self, pages: &[Page]) -> RepoResult<()>;

    /// Upserts only the blob sub-map of each page, skipping
    /// redirect/links/linkers (spec section 4.1's `SavePageBlobs`).
    fn save_page_blobs(&self, pages: &[Page]) -> RepoResult<()>;

    fn first_page(&self) -> RepoResult<Option<Page>>;

    /// The first title strictly greater than `title`, in lexicographic byte
    /// order, or `None` at end of store.
    fn next_page(&self, title: &str) -> RepoResult<Option<Page>>;

    fn next_pages(&self, title: &str, n: usize) -> RepoResult<Vec<Page>>;

    fn next_titles(&self, title: &str, n: usize) -> RepoResult<Vec<String>>;

    /// Advances past `n` titles without materializing pages; returns the
    /// final title reached, or `""` at end of store.
    fn skip_titles(&self, title: &str, n: usize) -> RepoResult<String>;

    fn delete_title(&self, title: &str) -> RepoResult<()>;

    fn close(&self) -> RepoResult<()>;
}

/// Tracks outstanding operations so `close()` can drain before tearing down
/// the underlying store (spec section 5: "Repository handle tracks
/// outstanding operations with a counter and a 'closing' flag").
///
/// Embedded in both repository implementations; `retain()` must be called
/// (and its guard held) around every operation.
pub(crate) struct CloseGuard {
    outstanding: AtomicU64,
    closing: Mutex<bool>,
}

impl CloseGuard {
    pub(crate) fn new() -> Self {
        CloseGuard {
            outstanding: AtomicU64::new(0),
            closing: Mutex::new(false),
        }
    }

    /// Increments the outstanding-operation counter under the lock and
    /// checks the closing flag; returns `Closed` without leaking a
    /// reference if a close is already in progress.
    pub(crate) fn retain(&self) -> RepoResult<RetainToken<'_>> {
        let closing = self.closing.lock().expect("close mutex poisoned");
        if *closing {
            return Err(RepoError::Closed);
        }
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        drop(closing);
        Ok(RetainToken { guard: self })
    }

    /// Sets the closing flag (rejecting new operations) and spin-waits for
    /// the counter to drain. Idempotent.
    pub(crate) fn begin_close(&self) {
        let mut closing = self.closing.lock().expect("close mutex poisoned");
        *closing = true;
        drop(closing);

        while self.outstanding.load(Ordering::SeqCst) > 0 {
            std::thread::yield_now();
        }
    }
}

pub(crate) struct RetainToken<'a> {
    guard: &'a CloseGuard,
}

impl Drop for RetainToken<'_> {
    fn drop(&mut self) {
        self.guard.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_guard_rejects_after_close() {
        let guard = CloseGuard::new();
        let token = guard.retain().unwrap();
        drop(token);
        guard.begin_close();
        assert!(matches!(guard.retain(), Err(RepoError::Closed)));
    }

    #[test]
    fn close_guard_drains_outstanding_before_returning() {
        let guard = std::sync::Arc::new(CloseGuard::new());
        let token = guard.retain().unwrap();

        let guard2 = guard.clone();
        let closer = std::thread::spawn(move || guard2.begin_close());

        // Give the closer a moment to observe the flag and start waiting.
        std::thread::sleep(std::time::Duration::from_millis(20));
        drop(token);
        closer.join().unwrap();

        assert!(matches!(guard.retain(), Err(RepoError::Closed)));
    }
}
