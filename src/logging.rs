//! Shared tracing setup for the binaries (spec section 6's CLI surface).
//!
//! Grounded in `milkydeferwm-pagelistbot-legacy`'s `main.rs`: a
//! `tracing_subscriber::registry()` with one `fmt` layer, filtered by an
//! `EnvFilter`. Quiet by default (`warn`); each repeated `-v` raises the
//! floor by one level, matching this crate's `-v` flag across all four
//! binaries. When `WIKIDEGREE_LOG_DIR` is set, logs go to a daily-rolling
//! file in that directory instead of stderr, via `tracing-appender`'s
//! non-blocking writer — the same pattern
//! `milkydeferwm-pagelistbot-legacy` uses for its bot's own log file.

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Must be held for the program's lifetime when logging to a file: dropping
/// it stops the non-blocking writer's background flush thread.
#[must_use]
pub enum LogGuard {
    Stderr,
    File(tracing_appender::non_blocking::WorkerGuard),
}

pub fn init(verbosity: u8) -> LogGuard {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match std::env::var("WIKIDEGREE_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "wikidegree.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().with_target(false).with_ansi(false).with_writer(non_blocking))
                .with(filter())
                .init();
            LogGuard::File(guard)
        }
        Err(_) => {
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().with_target(false))
                .with(filter())
                .init();
            LogGuard::Stderr
        }
    }
}
