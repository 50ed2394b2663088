//! Logging setup shared by the orchestrator and tool server binaries.
//!
//! Every process logs to stderr. When a log directory is configured it also
//! writes `<name>.<date>.log` there, rotated daily and pruned to the last
//! [`LOG_RETENTION_DAYS`] files.

use std::path::Path;

use tracing::{Level, Subscriber};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use super::error::{Error, Result};

/// Number of daily log files kept per process name.
pub const LOG_RETENTION_DAYS: usize = 7;

/// Initialize the logging subsystem.
///
/// Logs go to stderr so stdout stays free for command output. `RUST_LOG`
/// directives are honoured on top of `level`. With `log_dir` set, the same
/// events are also written to a daily file named after `name` (the server id
/// for tool servers).
pub fn init_logging(level: &str, log_dir: Option<&Path>, name: &str) -> Result<()> {
    let file = log_dir
        .map(|dir| daily_log_file(dir, name))
        .transpose()?
        .map(file_layer);

    tracing_subscriber::registry()
        .with(level_filter(level))
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_writer(std::io::stderr),
        )
        .with(file)
        .init();

    Ok(())
}

/// Open the daily rolling log file for `name` under `dir`.
pub fn daily_log_file(dir: &Path, name: &str) -> Result<RollingFileAppender> {
    std::fs::create_dir_all(dir)?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(name)
        .filename_suffix("log")
        .max_log_files(LOG_RETENTION_DAYS)
        .build(dir)
        .map_err(|e| Error::config(format!("cannot open log file in {}: {e}", dir.display())))
}

fn file_layer<S>(appender: RollingFileAppender) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(appender)
}

fn level_filter(level: &str) -> EnvFilter {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    EnvFilter::from_default_env().add_directive(level.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_line_lands_in_daily_file() {
        let dir = tempfile::tempdir().unwrap();
        let appender = daily_log_file(dir.path(), "benefits").unwrap();
        let subscriber = tracing_subscriber::registry().with(file_layer(appender));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(operation = "calculate_rewards", "Request handled");
        });

        let files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(files.len(), 1, "{files:?}");

        let name = files[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("benefits."), "{name}");
        assert!(name.ends_with(".log"), "{name}");

        let contents = std::fs::read_to_string(&files[0]).unwrap();
        assert!(contents.contains("Request handled"), "{contents}");
        assert!(contents.contains("operation=\"calculate_rewards\""), "{contents}");
    }

    #[test]
    fn test_log_directory_is_created() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("nested").join("logs");
        assert!(daily_log_file(&dir, "toolfleet").is_ok());
        assert!(dir.is_dir());
    }
}
