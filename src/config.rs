use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use qfetch::DEFAULT_CACHE_TTL;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub log: LogConfig,
  #[serde(default)]
  pub defaults: QueryDefaults,
  /// Endpoints to watch
  #[serde(default)]
  pub queries: Vec<WatchConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
  /// Filter directive used when RUST_LOG is not set (e.g. "info" or "qfetch=debug")
  pub level: Option<String>,
  /// Write logs to this file instead of stderr
  pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryDefaults {
  pub cache_ttl_ms: Option<u64>,
  /// Values of zero or below disable periodic refetching
  pub refetch_interval_ms: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
  pub name: String,
  pub url: Url,
  /// Extra identity parts appended to the query key
  #[serde(default)]
  pub key: Vec<Value>,
  pub cache_ttl_ms: Option<u64>,
  pub refetch_interval_ms: Option<i64>,
}

impl WatchConfig {
  /// A watch for an ad-hoc URL, named after the URL itself.
  pub fn from_url(url: Url) -> Self {
    Self {
      name: url.to_string(),
      url,
      key: Vec::new(),
      cache_ttl_ms: None,
      refetch_interval_ms: None,
    }
  }

  pub fn cache_ttl(&self, defaults: &QueryDefaults) -> Duration {
    self
      .cache_ttl_ms
      .or(defaults.cache_ttl_ms)
      .map(Duration::from_millis)
      .unwrap_or(DEFAULT_CACHE_TTL)
  }

  pub fn refetch_interval(&self, defaults: &QueryDefaults) -> Option<Duration> {
    self
      .refetch_interval_ms
      .or(defaults.refetch_interval_ms)
      .and_then(|ms| u64::try_from(ms).ok())
      .filter(|ms| *ms > 0)
      .map(Duration::from_millis)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./qfetch.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/qfetch/config.yaml
  ///
  /// Without a file the defaults are used, so queries can come from the command line alone.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("qfetch.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("qfetch").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;

    if let Some(watch) = config.queries.iter().find(|q| q.name.trim().is_empty()) {
      return Err(eyre!("Query for {} has an empty name", watch.url));
    }

    Ok(config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const EXAMPLE: &str = r#"
log:
  level: debug
defaults:
  cache_ttl_ms: 30000
  refetch_interval_ms: 5000
queries:
  - name: todos
    url: https://example.com/todos
  - name: user
    url: https://example.com/users/1
    key: [1, { "expand": true }]
    cache_ttl_ms: 1000
    refetch_interval_ms: 0
"#;

  #[test]
  fn test_parse_example() {
    let config = Config::parse(EXAMPLE).expect("example config parses");

    assert_eq!(config.log.level.as_deref(), Some("debug"));
    assert!(config.log.file.is_none());
    assert_eq!(config.queries.len(), 2);
    assert_eq!(config.queries[1].key.len(), 2);
  }

  #[test]
  fn test_defaults_apply() {
    let config = Config::parse(EXAMPLE).expect("example config parses");
    let todos = &config.queries[0];

    assert_eq!(todos.cache_ttl(&config.defaults), Duration::from_secs(30));
    assert_eq!(
      todos.refetch_interval(&config.defaults),
      Some(Duration::from_secs(5))
    );
  }

  #[test]
  fn test_overrides_apply() {
    let config = Config::parse(EXAMPLE).expect("example config parses");
    let user = &config.queries[1];

    assert_eq!(user.cache_ttl(&config.defaults), Duration::from_secs(1));
    assert_eq!(user.refetch_interval(&config.defaults), None);
  }

  #[test]
  fn test_negative_interval_disables_refetch() {
    let watch = WatchConfig {
      refetch_interval_ms: Some(-10),
      ..WatchConfig::from_url(Url::parse("https://example.com").expect("valid url"))
    };
    assert_eq!(watch.refetch_interval(&QueryDefaults::default()), None);
    assert_eq!(
      watch.cache_ttl(&QueryDefaults::default()),
      DEFAULT_CACHE_TTL
    );
  }

  #[test]
  fn test_empty_config() {
    let config = Config::parse("{}").expect("empty config parses");
    assert!(config.queries.is_empty());
  }

  #[test]
  fn test_empty_name_is_rejected() {
    let result = Config::parse(
      r#"
queries:
  - name: " "
    url: https://example.com
"#,
    );
    assert!(result.is_err());
  }

  #[test]
  fn test_missing_explicit_path() {
    let result = Config::load(Some(Path::new("/definitely/not/here.yaml")));
    assert!(result.is_err());
  }
}
