//! Logging setup for the papersync binary
//!
//! Two sinks share one registry: a per-run trace file under the system temp
//! dir, named after a random session UUID, and the console, whose level
//! follows the `-v` count.

use std::path::PathBuf;

use tracing_subscriber::Layer as _;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::progress;

/// Flushes pending file log lines when dropped
pub struct DebugLogGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Where this run logs to
pub struct SessionInfo {
    pub log_path: PathBuf,
    pub _guard: DebugLogGuard,
}

fn console_level(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Install the global subscriber.
///
/// Hold on to the returned [`SessionInfo`] until exit, or the tail of the
/// log file is lost.
pub fn init(verbosity: u8) -> SessionInfo {
    let session_id = uuid::Uuid::new_v4();
    let log_dir = std::env::temp_dir();
    let log_filename = format!("papersync-{session_id}.log");
    let log_path = log_dir.join(&log_filename);

    let file_appender = tracing_appender::rolling::never(&log_dir, &log_filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::ENTER | FmtSpan::EXIT);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(progress::ProgressWriter)
        .with_target(false)
        .with_filter(console_level(verbosity));

    let file_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(
            "warn,papersync=trace,papersync_core=trace,papersync_client=trace",
        )
    });

    tracing_subscriber::registry()
        .with(file_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    SessionInfo {
        log_path,
        _guard: DebugLogGuard { _guard: guard },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_level_by_verbosity() {
        assert_eq!(console_level(0), LevelFilter::INFO);
        assert_eq!(console_level(1), LevelFilter::DEBUG);
        assert_eq!(console_level(2), LevelFilter::TRACE);
        assert_eq!(console_level(9), LevelFilter::TRACE);
    }
}
