//! The reference query driver (spec section 6): looks up the shortest link
//! path between two articles and prints it.
//!
//! `wikidegree [-src bolt|web] [-alg bfs|iddfs] [-v] <start> <end>`

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;

use wikidegree::facade::Facade;
use wikidegree::repo::sled_repo::SledRepository;
use wikidegree::repo::web_repo::WebRepository;
use wikidegree::repo::PageRepository;
use wikidegree::search::bfs::{ConcurrentBfs, SerialBfs};
use wikidegree::search::iddfs::SerialIddfs;
use wikidegree::search::{Outcome, PathFinder};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Source {
    Bolt,
    Web,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Algorithm {
    Bfs,
    SerialBfs,
    Iddfs,
}

#[derive(Debug, Parser)]
#[command(name = "wikidegree", about = "Shortest link path between two articles")]
struct Cli {
    #[arg(long = "src", value_enum, default_value = "bolt")]
    source: Source,

    #[arg(long = "alg", value_enum, default_value = "bfs")]
    algorithm: Algorithm,

    #[arg(long = "index", default_value = "wiki_index")]
    index_path: String,

    #[arg(long = "api-base")]
    api_base: Option<String>,

    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    start: String,
    end: String,
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
    let repo: Arc<dyn PageRepository> = match cli.source {
        Source::Bolt => Arc::new(SledRepository::open(&cli.index_path)?),
        Source::Web => match &cli.api_base {
            Some(base) => Arc::new(WebRepository::with_api_base(base.clone())),
            None => Arc::new(WebRepository::new()),
        },
    };

    let finder: Arc<dyn PathFinder> = match cli.algorithm {
        Algorithm::Bfs => Arc::new(ConcurrentBfs::new(repo.clone())),
        Algorithm::SerialBfs => Arc::new(SerialBfs::new(repo.clone())),
        Algorithm::Iddfs => Arc::new(SerialIddfs::new(repo.clone())),
    };

    let facade = Facade::new(repo.clone(), finder);
    let outcome = facade.lookup_path(&cli.start, &cli.end, CancellationToken::new())?;

    match outcome {
        Outcome::Found(path) => println!("{path}"),
        Outcome::NotFound => {
            tracing::warn!(start = %cli.start, end = %cli.end, "no path found");
            anyhow::bail!("no path found from '{}' to '{}'", cli.start, cli.end);
        }
        Outcome::Cancelled => anyhow::bail!("search cancelled"),
    }

    repo.close()?;
    Ok(())
}
