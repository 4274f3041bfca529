mod app;
mod config;
mod event;
mod http;
mod logging;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "qfetch")]
#[command(about = "Watch JSON endpoints through a shared query cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./qfetch.yaml or $XDG_CONFIG_HOME/qfetch/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// URL to watch, in addition to configured queries (repeatable)
  #[arg(short, long)]
  url: Vec<Url>,

  /// Default refetch interval in milliseconds; zero or below disables it
  #[arg(long, allow_negative_numbers = true)]
  interval_ms: Option<i64>,

  /// Default cache TTL in milliseconds
  #[arg(long)]
  ttl_ms: Option<u64>,

  /// Exit once every query has settled
  #[arg(long)]
  once: bool,

  /// Increase log verbosity (-v, -vv, -vvv)
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;

  // Command line overrides
  if let Some(interval) = args.interval_ms {
    config.defaults.refetch_interval_ms = Some(interval);
  }
  if let Some(ttl) = args.ttl_ms {
    config.defaults.cache_ttl_ms = Some(ttl);
  }
  config
    .queries
    .extend(args.url.into_iter().map(config::WatchConfig::from_url));

  let _log_guard = logging::init(&config.log, args.verbose)?;

  // Initialize and run the app
  let mut app = app::App::new(config, args.once)?;
  app.run().await?;

  Ok(())
}
