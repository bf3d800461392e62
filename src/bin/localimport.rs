//! Offline dump loader (spec section 4.3/6): streams an XML dump into the
//! embedded index in one pass.
//!
//! `localimport [-xml <path>] [-index <path>]`
//!
//! Grounded in the original's `cmd/localimport/main.go`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use wikidegree::ingest::{run_pipeline, IngestConfig};
use wikidegree::repo::sled_repo::SledRepository;
use wikidegree::repo::PageRepository;

#[derive(Debug, Parser)]
#[command(name = "localimport", about = "Import an XML dump into the embedded index")]
struct Cli {
    #[arg(long = "xml")]
    xml_path: PathBuf,

    #[arg(long = "index", default_value = "wiki_index")]
    index_path: String,

    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _log_guard = wikidegree::logging::init(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(&cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let repo: Arc<dyn PageRepository> = Arc::new(SledRepository::open(&cli.index_path)?);

    let stats = run_pipeline(repo.clone(), &cli.xml_path, IngestConfig::default()).await?;
    tracing::info!(
        pages_read = stats.pages_read,
        pages_written = stats.pages_written,
        batches_written = stats.batches_written,
        "import complete"
    );

    repo.close()?;
    Ok(())
}
