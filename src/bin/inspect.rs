//! Index inspection tool (spec section 6): loads and prints one page's raw
//! stored record, for debugging an index by hand.
//!
//! `inspect -db <path> -title <t> [-bare] [-limit N]`

use std::process::ExitCode;

use clap::Parser;

use wikidegree::repo::sled_repo::SledRepository;
use wikidegree::repo::PageRepository;

#[derive(Debug, Parser)]
#[command(name = "inspect", about = "Print one page's stored record")]
struct Cli {
    #[arg(long = "db", default_value = "wiki_index")]
    db_path: String,

    #[arg(long = "title")]
    title: String,

    /// Print only the title, link count and linker count, one line.
    #[arg(long = "bare")]
    bare: bool,

    /// Cap how many links/linkers/blob keys are printed (0 = unlimited).
    #[arg(long = "limit", default_value_t = 0)]
    limit: usize,

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

fn truncated<'a>(items: &'a [String], limit: usize) -> (&'a [String], usize) {
    if limit == 0 || items.len() <= limit {
        (items, 0)
    } else {
        (&items[..limit], items.len() - limit)
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let repo = SledRepository::open(&cli.db_path)?;
    let page = repo.load_page(&cli.title)?;

    let links = page.links.as_deref().unwrap_or(&[]);
    let linkers = page.linkers.as_deref().unwrap_or(&[]);

    if cli.bare {
        println!(
            "{}\tlinks={}\tlinkers={}\tredirect={}",
            page.title,
            links.len(),
            linkers.len(),
            page.redirect.as_deref().unwrap_or("")
        );
        repo.close()?;
        return Ok(());
    }

    println!("title: {}", page.title);
    if let Some(redirector) = &page.redirector {
        println!("resolved from: {redirector}");
    }
    if let Some(target) = &page.redirect {
        println!("redirect: {target}");
    }

    println!("links ({}):", links.len());
    let (shown, omitted) = truncated(links, cli.limit);
    for link in shown {
        println!("  {link}");
    }
    if omitted > 0 {
        println!("  ... ({omitted} more)");
    }

    println!("linkers ({}):", linkers.len());
    let (shown, omitted) = truncated(linkers, cli.limit);
    for linker in shown {
        println!("  {linker}");
    }
    if omitted > 0 {
        println!("  ... ({omitted} more)");
    }

    if let Some(blob) = &page.blob {
        let keys: Vec<String> = blob.keys().cloned().collect();
        println!("blob keys ({}):", keys.len());
        let (shown, omitted) = truncated(&keys, cli.limit);
        for key in shown {
            println!("  {key}");
        }
        if omitted > 0 {
            println!("  ... ({omitted} more)");
        }
    }

    repo.close()?;
    Ok(())
}
