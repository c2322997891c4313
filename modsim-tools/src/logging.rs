//! Logging setup (`SPEC_FULL.md` §3.1): a level-filtered `stdout`
//! layer plus a non-blocking, append-only JSON file sink — one log
//! file per process run, per spec.md §6 ("the logging collaborator").

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global subscriber. The returned guard must be held
/// for the process lifetime; dropping it flushes and stops the
/// non-blocking file writer.
pub fn init(verbose: u8, quiet: u8) -> Result<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(verbose, quiet)));

    std::fs::create_dir_all("logs")?;
    let file_appender = tracing_appender::rolling::never("logs", "modsim.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(fmt::layer().json().with_writer(non_blocking))
        .try_init()?;

    Ok(guard)
}

/// The `RUST_LOG`-less default level: `-v`/`-q` move it one step at a
/// time off `info`, each capped at the ends of the scale.
fn default_level(verbose: u8, quiet: u8) -> &'static str {
    match verbose as i16 - quiet as i16 {
        i16::MIN..=-1 => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(0, 0, "info"; "default")]
    #[test_case(1, 0, "debug"; "one verbose")]
    #[test_case(3, 0, "trace"; "very verbose")]
    #[test_case(0, 1, "error"; "one quiet")]
    #[test_case(0, 5, "error"; "very quiet stays at the floor")]
    fn default_level_tracks_verbosity(verbose: u8, quiet: u8, expected: &str) {
        assert_eq!(default_level(verbose, quiet), expected);
    }
}
