//! Concrete batch processors (spec section 4.4), grounded one-for-one in the
//! original's `batch/processors/*.go`.
//!
//! Each processor is constructed per worker thread by a factory closure
//! passed to [`super::run_title_job`] or [`super::run_page_job`]; processors
//! that produce output pages do so by pushing onto a
//! [`super::helpers::Aggregator`] or [`super::helpers::BlobAggregator`]
//! shared (via a cloned `SyncSender`) with a consumer spawned from
//! [`super::consumers`].

use std::sync::mpsc::SyncSender;
use std::sync::Arc;

use crate::batch::helpers::{Aggregator, BlobAggregator};
use crate::batch::{PageProcessor, TitleProcessor};
use crate::model::Page;
use crate::repo::PageRepository;

/// Collects titles for which `repo.load_page` fails with `NotFound`,
/// flushing batches of dead titles to `out` for [`super::consumers::delete_titles`].
///
/// Grounded in `batch/processors/deadpages.go`.
pub struct DeadTitleFilter {
    repo: Arc<dyn PageRepository>,
    out: SyncSender<Vec<String>>,
    buffer: Vec<String>,
    buffer_max: usize,
}

impl DeadTitleFilter {
    pub fn new(repo: Arc<dyn PageRepository>, out: SyncSender<Vec<String>>, buffer_max: usize) -> Self {
        DeadTitleFilter {
            repo,
            out,
            buffer: Vec::with_capacity(buffer_max),
            buffer_max,
        }
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let full = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.buffer_max));
        self.out.send(full).map_err(|_| anyhow::anyhow!("dead title output channel closed"))
    }
}

impl TitleProcessor for DeadTitleFilter {
    fn process(&mut self, titles: &[String]) -> anyhow::Result<()> {
        for title in titles {
            match self.repo.load_page(title) {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    self.buffer.push(title.clone());
                    if self.buffer.len() >= self.buffer_max {
                        self.flush()?;
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn teardown(&mut self) -> anyhow::Result<()> {
        self.flush()
    }
}

/// Rewrites each page's `links` to drop targets that no longer resolve,
/// pushing changed pages to `out` for [`super::consumers::save_page_buffers`].
/// Unchanged pages are not re-emitted, matching the original's behavior of
/// only writing pages whose link set actually shrank.
///
/// Grounded in `batch/processors/deadlinks.go`.
pub struct DeadLinkFilter {
    repo: Arc<dyn PageRepository>,
    aggregator: Aggregator,
}

impl DeadLinkFilter {
    pub fn new(repo: Arc<dyn PageRepository>, out: SyncSender<Vec<Page>>, buffer_max: usize) -> Self {
        DeadLinkFilter {
            repo,
            aggregator: Aggregator::new(out, buffer_max),
        }
    }
}

impl PageProcessor for DeadLinkFilter {
    fn process(&mut self, pages: &[Page]) -> anyhow::Result<()> {
        for page in pages {
            let Some(links) = page.links.as_ref() else { continue };
            if links.is_empty() {
                continue;
            }

            let mut alive = Vec::with_capacity(links.len());
            for link in links {
                match self.repo.load_page(link) {
                    Ok(_) => alive.push(link.clone()),
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e.into()),
                }
            }

            if alive.len() != links.len() {
                self.aggregator.push(Page::with_links(page.title.clone(), alive))?;
            }
        }
        Ok(())
    }

    fn teardown(&mut self) -> anyhow::Result<()> {
        self.aggregator.flush()
    }
}

/// Emits each non-redirect page's link count for
/// [`super::consumers::histogram_ints`]. Redirect stubs carry no meaningful
/// link count and are skipped.
///
/// Grounded in `batch/processors/countlinks.go`.
pub struct LinkCounter {
    out: SyncSender<u64>,
}

impl LinkCounter {
    pub fn new(out: SyncSender<u64>) -> Self {
        LinkCounter { out }
    }
}

impl PageProcessor for LinkCounter {
    fn process(&mut self, pages: &[Page]) -> anyhow::Result<()> {
        for page in pages.iter().filter(|p| !p.is_redirect()) {
            let count = page.links.as_ref().map_or(0, |l| l.len()) as u64;
            self.out.send(count).map_err(|_| anyhow::anyhow!("link counter output channel closed"))?;
        }
        Ok(())
    }
}

/// For every link in every page, records a blob marker on the link target
/// keyed by the source title, via `save_page_blobs` (a per-key upsert that
/// several workers or shards can write to concurrently without clobbering
/// each other — unlike the `linkers` field itself, which is wholesale
/// overwritten on every save). A later pass ([`LinkerMaterializer`]) folds
/// those markers into the `linkers` field proper.
///
/// An optional predicate over the link target restricts which markers get
/// emitted, so the reverse-link job can be sharded across disjoint title
/// ranges and run as several independent jobs (spec section 4.4).
///
/// Grounded in `batch/processors/reverselinks.go`; the blob-scratchpad
/// indirection is this crate's translation of the original's direct
/// bolt-bucket writes, needed because `sled`'s per-record value has no
/// native incremental-append primitive.
pub struct ReverseLinkMarker {
    aggregator: BlobAggregator,
    shard: Arc<dyn Fn(&str) -> bool + Send + Sync>,
}

impl ReverseLinkMarker {
    /// Emits a marker for every link target, unsharded.
    pub fn new(out: SyncSender<Vec<Page>>, buffer_max: usize) -> Self {
        Self::sharded(out, buffer_max, |_: &str| true)
    }

    /// Emits a marker only for link targets for which `shard` returns true.
    pub fn sharded(
        out: SyncSender<Vec<Page>>,
        buffer_max: usize,
        shard: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Self {
        ReverseLinkMarker {
            aggregator: BlobAggregator::new(out, buffer_max),
            shard: Arc::new(shard),
        }
    }
}

impl PageProcessor for ReverseLinkMarker {
    fn process(&mut self, pages: &[Page]) -> anyhow::Result<()> {
        for page in pages {
            for target in page.links_iter() {
                if !(self.shard)(target) {
                    continue;
                }
                self.aggregator.push(Page::with_blob_entry(target, page.title.clone(), Vec::new()))?;
            }
        }
        Ok(())
    }

    fn teardown(&mut self) -> anyhow::Result<()> {
        self.aggregator.flush()
    }
}

/// Folds each page's blob markers (written by [`ReverseLinkMarker`]) into
/// its `linkers` field and pushes the result for `save_pages`. Run as the
/// second phase of the reverse-link job, after every shard's marker pass has
/// completed.
pub struct LinkerMaterializer {
    aggregator: Aggregator,
}

impl LinkerMaterializer {
    pub fn new(out: SyncSender<Vec<Page>>, buffer_max: usize) -> Self {
        LinkerMaterializer {
            aggregator: Aggregator::new(out, buffer_max),
        }
    }
}

impl PageProcessor for LinkerMaterializer {
    fn process(&mut self, pages: &[Page]) -> anyhow::Result<()> {
        for page in pages {
            let Some(blob) = page.blob.as_ref() else { continue };
            if blob.is_empty() {
                continue;
            }
            let linkers: Vec<String> = blob.keys().cloned().collect();
            let mut out = Page::default();
            out.title = page.title.clone();
            out.linkers = Some(linkers);
            self.aggregator.push(out)?;
        }
        Ok(())
    }

    fn teardown(&mut self) -> anyhow::Result<()> {
        self.aggregator.flush()
    }
}

/// No-op processors, used for dry-run iteration over a repository (pure
/// throughput measurement, pipeline smoke tests) without side effects.
///
/// Grounded in `batch/processors/nopper.go`.
pub struct NopTitleProcessor;
impl TitleProcessor for NopTitleProcessor {
    fn process(&mut self, _titles: &[String]) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct NopPageProcessor;
impl PageProcessor for NopPageProcessor {
    fn process(&mut self, _pages: &[Page]) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::sled_repo::SledRepository;
    use std::sync::mpsc::sync_channel;

    #[test]
    fn dead_title_filter_only_emits_missing_titles() {
        let dir = tempfile::tempdir().unwrap();
        let repo: Arc<dyn PageRepository> = Arc::new(SledRepository::open(dir.path()).unwrap());
        repo.save_page(&Page::with_links("Alive", vec![])).unwrap();

        let (tx, rx) = sync_channel(4);
        let mut filter = DeadTitleFilter::new(repo, tx, 10);
        filter.process(&["Alive".to_string(), "Dead".to_string()]).unwrap();
        filter.teardown().unwrap();

        let batch = rx.try_recv().unwrap();
        assert_eq!(batch, vec!["Dead".to_string()]);
    }

    #[test]
    fn dead_link_filter_drops_only_missing_targets() {
        let dir = tempfile::tempdir().unwrap();
        let repo: Arc<dyn PageRepository> = Arc::new(SledRepository::open(dir.path()).unwrap());
        repo.save_page(&Page::with_links("Alive", vec![])).unwrap();

        let (tx, rx) = sync_channel(4);
        let mut filter = DeadLinkFilter::new(repo, tx, 10);
        let page = Page::with_links("Source", vec!["Alive".to_string(), "Missing".to_string()]);
        filter.process(std::slice::from_ref(&page)).unwrap();
        filter.teardown().unwrap();

        let batch = rx.try_recv().unwrap();
        assert_eq!(batch[0].links, Some(vec!["Alive".to_string()]));
    }

    #[test]
    fn reverse_link_marker_writes_blob_keyed_by_source() {
        let (tx, rx) = sync_channel(4);
        let mut marker = ReverseLinkMarker::new(tx, 10);
        let page = Page::with_links("Source", vec!["Target".to_string()]);
        marker.process(std::slice::from_ref(&page)).unwrap();
        marker.teardown().unwrap();

        let batch = rx.try_recv().unwrap();
        assert_eq!(batch[0].title, "Target");
        assert!(batch[0].blob.as_ref().unwrap().contains_key("Source"));
    }

    #[test]
    fn reverse_link_marker_shard_predicate_drops_out_of_range_targets() {
        let (tx, rx) = sync_channel(4);
        let mut marker = ReverseLinkMarker::sharded(tx, 10, |target: &str| target.starts_with('K'));
        let page = Page::with_links("Source", vec!["Keep".to_string(), "Drop".to_string()]);
        marker.process(std::slice::from_ref(&page)).unwrap();
        marker.teardown().unwrap();

        let batch = rx.try_recv().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].title, "Keep");
    }

    #[test]
    fn linker_materializer_folds_blob_keys_into_linkers() {
        let (tx, rx) = sync_channel(4);
        let mut materializer = LinkerMaterializer::new(tx, 10);
        let page = Page::with_blob_entry("Target", "Source", Vec::new());
        materializer.process(std::slice::from_ref(&page)).unwrap();
        materializer.teardown().unwrap();

        let batch = rx.try_recv().unwrap();
        assert_eq!(batch[0].linkers, Some(vec!["Source".to_string()]));
    }
}
