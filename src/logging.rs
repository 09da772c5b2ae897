//! Tracing subscriber setup for the binary.

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Directory for rolling log files.
pub fn log_dir() -> Option<PathBuf> {
  dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .map(|dir| dir.join("profiledir").join("logs"))
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `config.level`. Output goes to stderr so stdout stays
/// clean for command results, or to a daily file when `config.file` is set.
/// Keep the returned guard alive until exit or buffered lines are lost.
pub fn init(config: &LogConfig) -> WorkerGuard {
  let filter = EnvFilter::try_from_default_env()
    .or_else(|_| EnvFilter::try_new(&config.level))
    .unwrap_or_else(|_| EnvFilter::new("info"));

  let (writer, guard) = match log_dir().filter(|_| config.file) {
    Some(dir) => tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "profiledir.log")),
    None => tracing_appender::non_blocking(std::io::stderr()),
  };

  let _ = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_ansi(!config.file)
    .with_target(false)
    .with_writer(writer)
    .try_init();

  guard
}
