//! The batch processing framework (spec section 4.4, component C4): runs a
//! user-supplied processor over every title or page in a repository, in
//! fixed-size batches, spread across a worker pool.
//!
//! Grounded in the original's `batch/batch.go`: a single driver thread reads
//! batches from the repository in order (so each worker only ever needs
//! `next_titles`/`next_pages` from the driver, never from each other) and
//! dispatches them over a bounded channel to `concurrency` workers, each
//! running its own processor instance through `setup`/`process*`/`teardown`.
//! The bounded channel is the back-pressure mechanism: the driver blocks on
//! send once workers fall behind, rather than buffering the whole repository
//! in memory.

pub mod consumers;
pub mod helpers;
pub mod processors;

use std::sync::mpsc::sync_channel;
use std::sync::{Arc, Mutex};

use crate::model::Page;
use crate::repo::PageRepository;

/// Tunables for a batch job (spec section 4.4).
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Titles or pages fetched per `next_titles`/`next_pages` call.
    pub batch_size: usize,
    /// Number of worker threads consuming batches concurrently.
    pub concurrency: usize,
    /// Titles to skip before the job starts (used to shard a range across
    /// multiple job invocations; combine with `processors::ReverseLinkMarker::sharded`'s
    /// predicate to restrict the *output* side of a sharded reverse-link job too).
    pub skip: usize,
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            batch_size: 1_000,
            concurrency: num_cpus::get(),
            skip: 0,
            debug: false,
        }
    }
}

/// A processor over title batches. One instance is constructed per worker
/// thread, so no internal synchronization is needed inside an
/// implementation; shared state (if any) is the implementor's job to guard.
pub trait TitleProcessor: Send {
    fn setup(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
    fn process(&mut self, titles: &[String]) -> anyhow::Result<()>;
    fn teardown(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A processor over page batches.
pub trait PageProcessor: Send {
    fn setup(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
    fn process(&mut self, pages: &[Page]) -> anyhow::Result<()>;
    fn teardown(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Runs a title job: `make_processor` is called once per worker thread to
/// build that worker's processor instance.
pub fn run_title_job<P, F>(repo: &dyn PageRepository, config: Config, make_processor: F) -> anyhow::Result<()>
where
    P: TitleProcessor,
    F: Fn() -> P + Send + Sync,
{
    let (tx, rx) = sync_channel::<Vec<String>>(config.concurrency * 2);
    let rx = Arc::new(Mutex::new(rx));
    let first_error: Arc<Mutex<Option<anyhow::Error>>> = Arc::new(Mutex::new(None));

    std::thread::scope(|scope| {
        for worker_id in 0..config.concurrency.max(1) {
            let rx = rx.clone();
            let first_error = first_error.clone();
            let mut processor = make_processor();
            scope.spawn(move || {
                if let Err(e) = processor.setup() {
                    record_first_error(&first_error, e);
                    return;
                }
                loop {
                    let batch = {
                        let rx = rx.lock().expect("title job channel mutex poisoned");
                        rx.recv()
                    };
                    let Ok(batch) = batch else { break };
                    if config.debug {
                        tracing::debug!(worker_id, batch_len = batch.len(), "title worker processing batch");
                    }
                    if let Err(e) = processor.process(&batch) {
                        record_first_error(&first_error, e);
                        break;
                    }
                }
                if let Err(e) = processor.teardown() {
                    record_first_error(&first_error, e);
                }
            });
        }

        drive_titles(repo, config, tx, &first_error);
    });

    take_first_error(first_error)
}

/// Runs a page job, analogous to [`run_title_job`] but over materialized
/// pages (`next_pages` rather than `next_titles`).
pub fn run_page_job<P, F>(repo: &dyn PageRepository, config: Config, make_processor: F) -> anyhow::Result<()>
where
    P: PageProcessor,
    F: Fn() -> P + Send + Sync,
{
    let (tx, rx) = sync_channel::<Vec<Page>>(config.concurrency * 2);
    let rx = Arc::new(Mutex::new(rx));
    let first_error: Arc<Mutex<Option<anyhow::Error>>> = Arc::new(Mutex::new(None));

    std::thread::scope(|scope| {
        for worker_id in 0..config.concurrency.max(1) {
            let rx = rx.clone();
            let first_error = first_error.clone();
            let mut processor = make_processor();
            scope.spawn(move || {
                if let Err(e) = processor.setup() {
                    record_first_error(&first_error, e);
                    return;
                }
                loop {
                    let batch = {
                        let rx = rx.lock().expect("page job channel mutex poisoned");
                        rx.recv()
                    };
                    let Ok(batch) = batch else { break };
                    if config.debug {
                        tracing::debug!(worker_id, batch_len = batch.len(), "page worker processing batch");
                    }
                    if let Err(e) = processor.process(&batch) {
                        record_first_error(&first_error, e);
                        break;
                    }
                }
                if let Err(e) = processor.teardown() {
                    record_first_error(&first_error, e);
                }
            });
        }

        drive_pages(repo, config, tx, &first_error);
    });

    take_first_error(first_error)
}

fn drive_titles(
    repo: &dyn PageRepository,
    config: Config,
    tx: std::sync::mpsc::SyncSender<Vec<String>>,
    first_error: &Arc<Mutex<Option<anyhow::Error>>>,
) {
    let mut cursor = match repo.skip_titles("", config.skip) {
        Ok(t) => t,
        Err(e) => {
            record_first_error(first_error, e.into());
            return;
        }
    };

    loop {
        if first_error.lock().expect("poisoned").is_some() {
            break;
        }
        let batch = match repo.next_titles(&cursor, config.batch_size) {
            Ok(b) => b,
            Err(e) => {
                record_first_error(first_error, e.into());
                break;
            }
        };
        if batch.is_empty() {
            break;
        }
        cursor = batch.last().expect("non-empty checked above").clone();
        // `send` blocks once every worker is busy: the driver deliberately
        // does not outrun the pool (spec section 4.4 back-pressure).
        if tx.send(batch).is_err() {
            break;
        }
    }
}

fn drive_pages(
    repo: &dyn PageRepository,
    config: Config,
    tx: std::sync::mpsc::SyncSender<Vec<Page>>,
    first_error: &Arc<Mutex<Option<anyhow::Error>>>,
) {
    let mut cursor = match repo.skip_titles("", config.skip) {
        Ok(t) => t,
        Err(e) => {
            record_first_error(first_error, e.into());
            return;
        }
    };

    loop {
        if first_error.lock().expect("poisoned").is_some() {
            break;
        }
        let batch = match repo.next_pages(&cursor, config.batch_size) {
            Ok(b) => b,
            Err(e) => {
                record_first_error(first_error, e.into());
                break;
            }
        };
        if batch.is_empty() {
            break;
        }
        cursor = batch.last().expect("non-empty checked above").title.clone();
        if tx.send(batch).is_err() {
            break;
        }
    }
}

fn record_first_error(slot: &Arc<Mutex<Option<anyhow::Error>>>, err: anyhow::Error) {
    let mut slot = slot.lock().expect("error slot mutex poisoned");
    if slot.is_none() {
        *slot = Some(err);
    }
}

fn take_first_error(slot: Arc<Mutex<Option<anyhow::Error>>>) -> anyhow::Result<()> {
    // `thread::scope` has joined every worker by the time this runs, so the
    // driver's clone is the only one left.
    let mut guard = slot.lock().expect("batch job error slot poisoned");
    match guard.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::sled_repo::SledRepository;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProcessor {
        counter: Arc<AtomicUsize>,
    }

    impl TitleProcessor for CountingProcessor {
        fn process(&mut self, titles: &[String]) -> anyhow::Result<()> {
            self.counter.fetch_add(titles.len(), Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn title_job_visits_every_title_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let repo = SledRepository::open(dir.path()).unwrap();
        for i in 0..250 {
            repo.save_page(&Page::with_links(format!("Title{i:04}"), vec![])).unwrap();
        }

        let counter = Arc::new(AtomicUsize::new(0));
        let config = Config {
            batch_size: 17,
            concurrency: 4,
            skip: 0,
            debug: false,
        };
        run_title_job(&repo, config, || CountingProcessor { counter: counter.clone() }).unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 250);
    }

    struct FailingProcessor;
    impl TitleProcessor for FailingProcessor {
        fn process(&mut self, _titles: &[String]) -> anyhow::Result<()> {
            anyhow::bail!("boom")
        }
    }

    #[test]
    fn title_job_propagates_processor_error() {
        let dir = tempfile::tempdir().unwrap();
        let repo = SledRepository::open(dir.path()).unwrap();
        repo.save_page(&Page::with_links("Only", vec![])).unwrap();

        let result = run_title_job(&repo, Config::default(), || FailingProcessor);
        assert!(result.is_err());
    }
}
