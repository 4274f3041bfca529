use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Install the global subscriber.
///
/// The base filter comes from RUST_LOG, then the configured level, then `warn`. Each `-v`
/// raises the default level (info, debug, trace) but never lowers a more verbose base. The
/// returned guard flushes buffered log lines and must live until the program exits.
pub fn init(config: &LogConfig, verbose: u8) -> Result<WorkerGuard> {
  let base = EnvFilter::try_from_default_env()
    .or_else(|_| EnvFilter::try_new(config.level.as_deref().unwrap_or("warn")))
    .map_err(|e| eyre!("Invalid log level: {}", e))?;
  let filter = raise_verbosity(base, verbose);

  let (writer, guard) = match &config.file {
    Some(path) => {
      let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."));
      let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("Log file path has no file name: {}", path.display()))?;
      std::fs::create_dir_all(dir)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;
      tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name))
    }
    None => tracing_appender::non_blocking(std::io::stderr()),
  };

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(config.file.is_none())
    .with_target(true)
    .try_init()
    .map_err(|e| eyre!("Failed to install log subscriber: {}", e))?;

  Ok(guard)
}

fn raise_verbosity(base: EnvFilter, verbose: u8) -> EnvFilter {
  let level = match verbose {
    0 => return base,
    1 => LevelFilter::INFO,
    2 => LevelFilter::DEBUG,
    _ => LevelFilter::TRACE,
  };
  match base.max_level_hint() {
    Some(current) if current >= level => base,
    _ => base.add_directive(level.into()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_no_flag_keeps_base() {
    let filter = raise_verbosity(EnvFilter::new("error"), 0);
    assert_eq!(filter.max_level_hint(), Some(LevelFilter::ERROR));
  }

  #[test]
  fn test_flag_raises_level() {
    let filter = raise_verbosity(EnvFilter::new("warn"), 2);
    assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));

    let filter = raise_verbosity(EnvFilter::new("warn"), 5);
    assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
  }

  #[test]
  fn test_flag_never_lowers_level() {
    let filter = raise_verbosity(EnvFilter::new("debug"), 1);
    assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
  }
}
