//! Generic batch-job driver (spec section 4.4/6): runs one named processor
//! over every title or page in the index.
//!
//! `batchprocess [-db <path>] [-batch N] [-conc N] [-skip N] [-debug] --job <job>`
//!
//! Grounded in the original's `batch/batch.go` plus its
//! `batch/processors/*.go` family; `--job` selects which processor from
//! [`wikidegree::batch::processors`] runs, since the original built one
//! small binary per job rather than a single dispatcher.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};

use wikidegree::batch::processors::{
    DeadLinkFilter, DeadTitleFilter, LinkCounter, LinkerMaterializer, NopPageProcessor, NopTitleProcessor,
    ReverseLinkMarker,
};
use wikidegree::batch::{consumers, run_page_job, run_title_job, Config};
use wikidegree::repo::sled_repo::SledRepository;
use wikidegree::repo::PageRepository;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Job {
    DeadTitles,
    DeadLinks,
    CountLinks,
    ReverseLinks,
    MaterializeLinkers,
    NopTitles,
    NopPages,
}

#[derive(Debug, Parser)]
#[command(name = "batchprocess", about = "Run a batch job over the embedded index")]
struct Cli {
    #[arg(long = "db", default_value = "wiki_index")]
    db_path: String,

    #[arg(long = "job", value_enum)]
    job: Job,

    #[arg(long = "batch", default_value_t = 1_000)]
    batch: usize,

    #[arg(long = "conc", default_value_t = num_cpus::get())]
    conc: usize,

    #[arg(long = "skip", default_value_t = 0)]
    skip: usize,

    #[arg(long = "debug")]
    debug: bool,

    /// Restrict `--job reverse-links` to link targets >= this title
    /// (inclusive), for sharding the job across disjoint title ranges.
    #[arg(long = "shard-start", default_value = "")]
    shard_start: String,

    /// Restrict `--job reverse-links` to link targets < this title
    /// (exclusive). Empty means unbounded.
    #[arg(long = "shard-end", default_value = "")]
    shard_end: String,

    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _log_guard = wikidegree::logging::init(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let repo: Arc<dyn PageRepository> = Arc::new(SledRepository::open(&cli.db_path)?);
    let config = Config {
        batch_size: cli.batch,
        concurrency: cli.conc,
        skip: cli.skip,
        debug: cli.debug,
    };

    match cli.job {
        Job::DeadTitles => {
            let (tx, handle) = consumers::spawn_delete_titles(repo.clone(), config.concurrency * 2);
            run_title_job(&*repo, config, || DeadTitleFilter::new(repo.clone(), tx.clone(), config.batch_size))?;
            drop(tx);
            handle.join().expect("consumer thread panicked")?;
        }
        Job::DeadLinks => {
            let (tx, handle) = consumers::spawn_save_page_buffers(repo.clone(), config.concurrency * 2);
            run_page_job(&*repo, config, || DeadLinkFilter::new(repo.clone(), tx.clone(), config.batch_size))?;
            drop(tx);
            handle.join().expect("consumer thread panicked")?;
        }
        Job::CountLinks => {
            let (tx, handle) = consumers::spawn_histogram_ints(config.concurrency * 2);
            run_page_job(&*repo, config, || LinkCounter::new(tx.clone()))?;
            drop(tx);
            let histogram = handle.join().expect("consumer thread panicked");
            println!("{histogram:#?}");
        }
        Job::ReverseLinks => {
            let (tx, handle) = consumers::spawn_save_page_buffer_blobs(repo.clone(), config.concurrency * 2);
            let shard_start = cli.shard_start.clone();
            let shard_end = cli.shard_end.clone();
            run_page_job(&*repo, config, || {
                let shard_start = shard_start.clone();
                let shard_end = shard_end.clone();
                ReverseLinkMarker::sharded(tx.clone(), config.batch_size, move |target: &str| {
                    (shard_start.is_empty() || target >= shard_start.as_str())
                        && (shard_end.is_empty() || target < shard_end.as_str())
                })
            })?;
            drop(tx);
            handle.join().expect("consumer thread panicked")?;
        }
        Job::MaterializeLinkers => {
            let (tx, handle) = consumers::spawn_save_page_buffers(repo.clone(), config.concurrency * 2);
            run_page_job(&*repo, config, || LinkerMaterializer::new(tx.clone(), config.batch_size))?;
            drop(tx);
            handle.join().expect("consumer thread panicked")?;
        }
        Job::NopTitles => run_title_job(&*repo, config, || NopTitleProcessor)?,
        Job::NopPages => run_page_job(&*repo, config, || NopPageProcessor)?,
    }

    repo.close()?;
    Ok(())
}
