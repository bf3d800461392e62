//! The ingestion pipeline (spec section 4.3, component C3): a staged,
//! back-pressured producer/consumer pipeline that streams a dump into the
//! repository.
//!
//! Three stages joined by bounded channels, translating the original's
//! goroutine/channel pipeline (`cmd/localimport/main.go`,
//! `localimport/localimport.go`) into `tokio` tasks and
//! `tokio::sync::mpsc` bounded channels:
//!
//! - Stage A ([`xml::scan_dump`]) reads the dump and emits raw page records.
//! - Stage B (`normalize_and_batch`) normalizes titles, parses links,
//!   batches pages.
//! - Stage C (`write_batches`) commits each batch to the repository in one
//!   transaction.
//!
//! Every stage runs on a blocking thread (`spawn_blocking`): the work is
//! either file I/O or CPU-bound parsing, never an async wait, so there is no
//! benefit to cooperative yielding and real benefit to not stalling the
//! runtime's async worker threads. Channel sends block when the receiver is
//! behind, which is exactly the back-pressure spec section 4.3 requires.

pub mod xml;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;

use crate::linkparse::{normalize_title, parse_links};
use crate::model::Page;
use crate::repo::PageRepository;
use xml::RawPageRecord;

/// Tunables for the pipeline; defaults match the original's constants.
#[derive(Debug, Clone, Copy)]
pub struct IngestConfig {
    /// Pages accumulated per write batch (`bufferMax` in spec section 4.3).
    pub buffer_max: usize,
    /// How often progress is logged, in pages.
    pub print_thresh: u64,
    /// Bounded channel capacity between stages.
    pub channel_capacity: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            buffer_max: 10_000,
            print_thresh: 10_000,
            channel_capacity: 64,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IngestStats {
    pub pages_read: u64,
    pub pages_written: u64,
    pub batches_written: u64,
}

/// Runs the full three-stage pipeline against `xml_path`, writing into
/// `repo`. Terminates exactly when the reader reaches EOF, all batches
/// drain, and the writer completes its last transaction (spec 4.3
/// invariant).
pub async fn run_pipeline(
    repo: Arc<dyn PageRepository>,
    xml_path: &Path,
    config: IngestConfig,
) -> anyhow::Result<IngestStats> {
    let (raw_tx, raw_rx) = mpsc::channel::<RawPageRecord>(config.channel_capacity);
    let (batch_tx, batch_rx) = mpsc::channel::<Vec<Page>>(config.channel_capacity);

    let xml_path = xml_path.to_path_buf();
    let reader_handle = tokio::task::spawn_blocking(move || read_stage(&xml_path, raw_tx));

    let buffer_max = config.buffer_max;
    let normalize_handle = tokio::task::spawn_blocking(move || normalize_and_batch(raw_rx, batch_tx, buffer_max));

    let print_thresh = config.print_thresh;
    let write_handle = tokio::task::spawn_blocking(move || write_batches(repo, batch_rx, print_thresh));

    let (read_result, pages_read, pages_written) = tokio::try_join!(
        async { reader_handle.await.map_err(anyhow::Error::from)? },
        async { normalize_handle.await.map_err(anyhow::Error::from) },
        async { write_handle.await.map_err(anyhow::Error::from)? },
    )?;
    let _ = read_result;

    Ok(IngestStats {
        pages_read,
        pages_written: pages_written.1,
        batches_written: pages_written.0,
    })
}

/// Stage A driver: opens the dump file and pushes one record per page onto
/// `tx`, blocking (back-pressure) when the channel is full.
fn read_stage(xml_path: &Path, tx: mpsc::Sender<RawPageRecord>) -> anyhow::Result<u64> {
    let file = File::open(xml_path)
        .map_err(|e| anyhow::anyhow!("failed to open XML dump {}: {e}", xml_path.display()))?;
    let reader = BufReader::new(file);

    let mut count = 0u64;
    xml::scan_dump(reader, |record| {
        count += 1;
        // `blocking_send` parks this thread, not an async task, which is
        // correct here: we are already off the runtime inside
        // `spawn_blocking`.
        if tx.blocking_send(record).is_err() {
            // Receiver dropped (downstream failed); stop reading early.
        }
    })?;

    Ok(count)
}

/// Stage B driver: normalizes and parses each raw record, accumulating a
/// batch of `buffer_max` pages before handing it to stage C.
fn normalize_and_batch(
    mut rx: mpsc::Receiver<RawPageRecord>,
    tx: mpsc::Sender<Vec<Page>>,
    buffer_max: usize,
) -> u64 {
    let mut batch = Vec::with_capacity(buffer_max);
    let mut count = 0u64;

    while let Some(record) = rx.blocking_recv() {
        count += 1;
        let title = normalize_title(&record.title);

        let page = match record.redirect {
            Some(target) => Page::redirect_to(title, normalize_title(&target)),
            None => Page::with_links(title, parse_links(&record.text)),
        };

        batch.push(page);
        if batch.len() >= buffer_max {
            let full = std::mem::replace(&mut batch, Vec::with_capacity(buffer_max));
            if tx.blocking_send(full).is_err() {
                break;
            }
        }
    }

    if !batch.is_empty() && tx.blocking_send(batch).is_err() {
        // Downstream gone; nothing more to do.
    }

    count
}

/// Stage C driver: commits each batch in one `save_pages` transaction and
/// logs progress every `print_thresh` pages.
fn write_batches(
    repo: Arc<dyn PageRepository>,
    mut rx: mpsc::Receiver<Vec<Page>>,
    print_thresh: u64,
) -> anyhow::Result<(u64, u64)> {
    let start = Instant::now();
    let mut pages_written = 0u64;
    let mut batches_written = 0u64;
    let mut next_log = print_thresh;

    while let Some(batch) = rx.blocking_recv() {
        let n = batch.len() as u64;
        repo.save_pages(&batch)?;
        pages_written += n;
        batches_written += 1;

        if pages_written >= next_log {
            tracing::info!(
                pages_written,
                batches_written,
                elapsed_secs = start.elapsed().as_secs_f64(),
                "ingestion progress"
            );
            next_log += print_thresh;
        }
    }

    tracing::info!(
        pages_written,
        batches_written,
        elapsed_secs = start.elapsed().as_secs_f64(),
        "ingestion complete"
    );

    Ok((batches_written, pages_written))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::sled_repo::SledRepository;
    use std::io::Write;

    #[tokio::test]
    async fn pipeline_ingests_small_dump() {
        let dir = tempfile::tempdir().unwrap();
        let xml_path = dir.path().join("dump.xml");
        let mut file = File::create(&xml_path).unwrap();
        write!(
            file,
            r#"<mediawiki>
                <page><title>Alpha</title><revision><text>[[Beta]] [[Gamma]]</text></revision></page>
                <page><title>Beta</title><revision><text>[[Delta]]</text></revision></page>
                <page><title>Gamma</title><revision><text>[[Delta]]</text></revision></page>
                <page><title>Delta</title><revision><text></text></revision></page>
            </mediawiki>"#
        )
        .unwrap();

        let repo: Arc<dyn PageRepository> =
            Arc::new(SledRepository::open(dir.path().join("index")).unwrap());

        let stats = run_pipeline(repo.clone(), &xml_path, IngestConfig::default()).await.unwrap();
        assert_eq!(stats.pages_read, 4);
        assert_eq!(stats.pages_written, 4);

        let alpha = repo.load_page("alpha").unwrap();
        assert_eq!(alpha.links, Some(vec!["Beta".to_string(), "Gamma".to_string()]));
    }

    #[tokio::test]
    async fn pipeline_ingests_redirect_pages() {
        let dir = tempfile::tempdir().unwrap();
        let xml_path = dir.path().join("dump.xml");
        let mut file = File::create(&xml_path).unwrap();
        write!(
            file,
            r#"<mediawiki>
                <page><title>Foo</title><redirect title="Bar"/><revision><text>#REDIRECT [[Bar]]</text></revision></page>
                <page><title>Bar</title><revision><text>[[Baz]]</text></revision></page>
                <page><title>Baz</title><revision><text></text></revision></page>
            </mediawiki>"#
        )
        .unwrap();

        let repo: Arc<dyn PageRepository> =
            Arc::new(SledRepository::open(dir.path().join("index")).unwrap());
        run_pipeline(repo.clone(), &xml_path, IngestConfig::default()).await.unwrap();

        let foo = repo.load_page("foo").unwrap();
        assert_eq!(foo.title, "Bar");
        assert_eq!(foo.redirector, Some("Foo".to_string()));
    }
}
