//! Batch job output consumers (spec section 4.4): the other end of the
//! channels a processor's [`super::helpers::Aggregator`] feeds into.
//!
//! Each `spawn_*` function starts one consumer thread reading until its
//! sender side is dropped (i.e. every worker has finished and torn down),
//! then returns a `JoinHandle` the caller joins after the job itself
//! completes. Grounded in `batch/consumers/{savepages,deletetitles,histogram}.go`.

use std::collections::BTreeMap;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::model::Page;
use crate::repo::PageRepository;

/// Writes every batch of pages it receives via `save_pages`.
pub fn spawn_save_page_buffers(
    repo: Arc<dyn PageRepository>,
    channel_capacity: usize,
) -> (SyncSender<Vec<Page>>, JoinHandle<anyhow::Result<()>>) {
    let (tx, rx) = sync_channel(channel_capacity);
    let handle = std::thread::spawn(move || drain_save(repo, rx, false));
    (tx, handle)
}

/// As [`spawn_save_page_buffers`], but routes through `save_page_blobs` so
/// only the blob sub-map of each page is written (used by
/// `processors::ReverseLinkMarker`, where touching `links`/`redirect` would
/// be wrong).
pub fn spawn_save_page_buffer_blobs(
    repo: Arc<dyn PageRepository>,
    channel_capacity: usize,
) -> (SyncSender<Vec<Page>>, JoinHandle<anyhow::Result<()>>) {
    let (tx, rx) = sync_channel(channel_capacity);
    let handle = std::thread::spawn(move || drain_save(repo, rx, true));
    (tx, handle)
}

fn drain_save(repo: Arc<dyn PageRepository>, rx: Receiver<Vec<Page>>, blobs_only: bool) -> anyhow::Result<()> {
    while let Ok(batch) = rx.recv() {
        if blobs_only {
            repo.save_page_blobs(&batch)?;
        } else {
            repo.save_pages(&batch)?;
        }
    }
    Ok(())
}

/// Deletes every title it receives.
pub fn spawn_delete_titles(
    repo: Arc<dyn PageRepository>,
    channel_capacity: usize,
) -> (SyncSender<Vec<String>>, JoinHandle<anyhow::Result<()>>) {
    let (tx, rx) = sync_channel(channel_capacity);
    let handle = std::thread::spawn(move || -> anyhow::Result<()> {
        while let Ok(titles) = rx.recv() {
            for title in titles {
                repo.delete_title(&title)?;
            }
        }
        Ok(())
    });
    (tx, handle)
}

/// Bucket boundaries follow powers of two, matching the original's
/// log-scale histogram of link counts (`batch/consumers/histogram.go`).
#[derive(Debug, Default, Clone)]
pub struct Histogram {
    pub buckets: BTreeMap<u32, u64>,
    pub count: u64,
    pub sum: u64,
}

impl Histogram {
    fn bucket_for(value: u64) -> u32 {
        if value == 0 {
            0
        } else {
            64 - value.leading_zeros()
        }
    }

    fn record(&mut self, value: u64) {
        *self.buckets.entry(Self::bucket_for(value)).or_insert(0) += 1;
        self.count += 1;
        self.sum += value;
    }
}

/// Accumulates every value it receives into a [`Histogram`], returned once
/// the sender side is dropped.
pub fn spawn_histogram_ints(channel_capacity: usize) -> (SyncSender<u64>, JoinHandle<Histogram>) {
    let (tx, rx) = sync_channel(channel_capacity);
    let handle = std::thread::spawn(move || -> Histogram {
        let mut histogram = Histogram::default();
        while let Ok(value) = rx.recv() {
            histogram.record(value);
        }
        histogram
    });
    (tx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::sled_repo::SledRepository;

    #[test]
    fn save_page_buffers_writes_each_batch() {
        let dir = tempfile::tempdir().unwrap();
        let repo: Arc<dyn PageRepository> = Arc::new(SledRepository::open(dir.path()).unwrap());

        let (tx, handle) = spawn_save_page_buffers(repo.clone(), 4);
        tx.send(vec![Page::with_links("A", vec!["B".to_string()])]).unwrap();
        drop(tx);
        handle.join().unwrap().unwrap();

        let loaded = repo.load_page("A").unwrap();
        assert_eq!(loaded.links, Some(vec!["B".to_string()]));
    }

    #[test]
    fn delete_titles_removes_every_received_title() {
        let dir = tempfile::tempdir().unwrap();
        let repo: Arc<dyn PageRepository> = Arc::new(SledRepository::open(dir.path()).unwrap());
        repo.save_page(&Page::with_links("Gone", vec![])).unwrap();

        let (tx, handle) = spawn_delete_titles(repo.clone(), 4);
        tx.send(vec!["Gone".to_string()]).unwrap();
        drop(tx);
        handle.join().unwrap().unwrap();

        assert!(repo.load_page("Gone").unwrap_err().is_not_found());
    }

    #[test]
    fn histogram_buckets_by_power_of_two() {
        let (tx, handle) = spawn_histogram_ints(8);
        for v in [0, 1, 2, 3, 4, 100] {
            tx.send(v).unwrap();
        }
        drop(tx);
        let histogram = handle.join().unwrap();
        assert_eq!(histogram.count, 6);
        assert_eq!(histogram.sum, 110);
    }
}
