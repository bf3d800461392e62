//! Batch processor helpers (spec section 4.4): the small utilities
//! processors use to turn a stream of output pages into fixed-size write
//! batches.
//!
//! Grounded in `batch/helpers/aggregate.go`, `chunker.go` and `filter.go`.
//! The original's `AggregatePages`/`AggregatePageBlobs` used a non-blocking
//! `select` with a `default:` branch to avoid stalling the producer, which
//! silently dropped pages once the output channel filled up — flagged as a
//! bug in spec section 9. [`Aggregator::push`] instead always blocks
//! (`SyncSender::send`) when the channel is full, trading producer
//! throughput for never losing a page.

use std::collections::BTreeMap;
use std::sync::mpsc::SyncSender;

use crate::model::Page;

/// Buffers pages until `buffer_max` is reached, then blockingly sends the
/// full buffer downstream. Used by processors that emit one output page per
/// input page but want to write in batches (spec section 4.4).
pub struct Aggregator {
    buffer: Vec<Page>,
    buffer_max: usize,
    out: SyncSender<Vec<Page>>,
}

impl Aggregator {
    pub fn new(out: SyncSender<Vec<Page>>, buffer_max: usize) -> Self {
        Aggregator {
            buffer: Vec::with_capacity(buffer_max),
            buffer_max,
            out,
        }
    }

    /// Appends `page`, flushing a full buffer. Blocks if the downstream
    /// channel is at capacity, rather than dropping the buffer.
    pub fn push(&mut self, page: Page) -> anyhow::Result<()> {
        self.buffer.push(page);
        if self.buffer.len() >= self.buffer_max {
            self.flush()?;
        }
        Ok(())
    }

    /// Sends whatever remains, even a partial buffer. Callers must call this
    /// from `teardown` or the final pages of a run are lost.
    pub fn flush(&mut self) -> anyhow::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let full = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.buffer_max));
        self.out.send(full).map_err(|_| anyhow::anyhow!("aggregator output channel closed"))
    }
}

/// Aggregates blob-only pages (as produced by the reverse-link processor)
/// destined for `save_page_blobs` rather than `save_pages`. Unlike
/// [`Aggregator`], which just buffers pages as they arrive, this merges
/// every pushed page's blob entries into a per-title accumulator keyed by
/// title, matching the original's `AggregatePageBlobs`: two blob-marker
/// pages for the same target landing in one flushed buffer must union their
/// blob maps, not clobber each other, so the eventual linker set (spec
/// section 4.4's "downstream aggregator merges all `B` contributions")
/// reflects every contribution rather than just the last one written.
pub struct BlobAggregator {
    buffer: BTreeMap<String, BTreeMap<String, Option<Vec<u8>>>>,
    buffer_max: usize,
    out: SyncSender<Vec<Page>>,
}

impl BlobAggregator {
    pub fn new(out: SyncSender<Vec<Page>>, buffer_max: usize) -> Self {
        BlobAggregator {
            buffer: BTreeMap::new(),
            buffer_max,
            out,
        }
    }

    /// Merges `page`'s blob entries into the buffered entry for its title,
    /// flushing once `buffer_max` distinct titles have accumulated.
    pub fn push(&mut self, page: Page) -> anyhow::Result<()> {
        let entry = self.buffer.entry(page.title).or_default();
        if let Some(blob) = page.blob {
            entry.extend(blob);
        }
        if self.buffer.len() >= self.buffer_max {
            self.flush()?;
        }
        Ok(())
    }

    /// Sends whatever remains, even a partial buffer. Callers must call this
    /// from `teardown` or the final pages are lost.
    pub fn flush(&mut self) -> anyhow::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let merged = std::mem::take(&mut self.buffer);
        let pages: Vec<Page> = merged
            .into_iter()
            .map(|(title, blob)| Page {
                title,
                blob: Some(blob),
                ..Default::default()
            })
            .collect();
        self.out.send(pages).map_err(|_| anyhow::anyhow!("aggregator output channel closed"))
    }
}

/// Splits `pages` into chunks of at most `buffer_max`, preserving order.
pub fn chunk_page_buffers(pages: Vec<Page>, buffer_max: usize) -> Vec<Vec<Page>> {
    if buffer_max == 0 {
        return vec![pages];
    }
    pages
        .chunks(buffer_max)
        .map(|chunk| chunk.to_vec())
        .collect()
}

/// Returns only the pages for which `keep` is true, preserving order.
pub fn filter_pages(pages: Vec<Page>, keep: impl Fn(&Page) -> bool) -> Vec<Page> {
    pages.into_iter().filter(keep).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::sync_channel;

    #[test]
    fn aggregator_flushes_on_buffer_max() {
        let (tx, rx) = sync_channel(4);
        let mut agg = Aggregator::new(tx, 2);
        agg.push(Page::with_links("A", vec![])).unwrap();
        assert!(rx.try_recv().is_err(), "should not flush before buffer_max");
        agg.push(Page::with_links("B", vec![])).unwrap();
        let batch = rx.try_recv().unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn aggregator_flush_sends_partial_buffer() {
        let (tx, rx) = sync_channel(4);
        let mut agg = Aggregator::new(tx, 10);
        agg.push(Page::with_links("A", vec![])).unwrap();
        agg.flush().unwrap();
        let batch = rx.try_recv().unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn blob_aggregator_unions_same_title_entries_before_flush() {
        let (tx, rx) = sync_channel(4);
        let mut agg = BlobAggregator::new(tx, 10);
        agg.push(Page::with_blob_entry("Target", "SourceA", Vec::new())).unwrap();
        agg.push(Page::with_blob_entry("Target", "SourceB", Vec::new())).unwrap();
        agg.flush().unwrap();

        let batch = rx.try_recv().unwrap();
        assert_eq!(batch.len(), 1, "same-title pushes must merge into one page, not clobber");
        let blob = batch[0].blob.as_ref().unwrap();
        assert!(blob.contains_key("SourceA"));
        assert!(blob.contains_key("SourceB"));
    }

    #[test]
    fn blob_aggregator_flushes_on_distinct_title_count() {
        let (tx, rx) = sync_channel(4);
        let mut agg = BlobAggregator::new(tx, 2);
        agg.push(Page::with_blob_entry("A", "Src", Vec::new())).unwrap();
        assert!(rx.try_recv().is_err(), "should not flush before buffer_max distinct titles");
        agg.push(Page::with_blob_entry("B", "Src", Vec::new())).unwrap();
        let batch = rx.try_recv().unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn chunk_page_buffers_splits_evenly() {
        let pages: Vec<Page> = (0..5).map(|i| Page::with_links(format!("P{i}"), vec![])).collect();
        let chunks = chunk_page_buffers(pages, 2);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 2);
        assert_eq!(chunks[2].len(), 1);
    }

    #[test]
    fn filter_pages_keeps_matching_order() {
        let pages = vec![
            Page::with_links("Keep1", vec![]),
            Page::with_links("Drop", vec![]),
            Page::with_links("Keep2", vec![]),
        ];
        let kept = filter_pages(pages, |p| p.title.starts_with("Keep"));
        assert_eq!(kept.iter().map(|p| p.title.as_str()).collect::<Vec<_>>(), vec!["Keep1", "Keep2"]);
    }
}
