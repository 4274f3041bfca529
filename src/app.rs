use crate::config::{Config, WatchConfig};
use crate::event::{Event, EventHandler};
use crate::http::HttpClient;
use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use qfetch::{Query, QueryCache, QueryKey, QueryOptions, QueryState, QueryStatus};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// One line of output per state change
#[derive(Debug, Serialize)]
struct Report<'a> {
  query: &'a str,
  at: DateTime<Utc>,
  status: QueryStatus,
  is_loading: bool,
  is_fetching: bool,
  data: Option<&'a Value>,
  error: Option<String>,
}

impl<'a> Report<'a> {
  fn new(query: &'a str, state: &'a QueryState<Value>) -> Self {
    Self {
      query,
      at: Utc::now(),
      status: state.status(),
      is_loading: state.is_loading,
      is_fetching: state.is_fetching,
      data: state.data.as_ref(),
      error: state.error.as_ref().map(|e| e.message()),
    }
  }
}

/// A query being watched, with the name it is reported under
struct Watched {
  name: String,
  query: Query<Value>,
}

/// Main application state
pub struct App {
  /// Application configuration
  config: Config,

  /// Shared by every watched query, so equal identities share results
  cache: Arc<QueryCache>,

  http: HttpClient,

  /// Exit once every query has settled
  once: bool,
}

impl App {
  pub fn new(config: Config, once: bool) -> Result<Self> {
    Ok(Self {
      config,
      cache: Arc::new(QueryCache::new()),
      http: HttpClient::new(HTTP_TIMEOUT)?,
      once,
    })
  }

  pub async fn run(&mut self) -> Result<()> {
    if self.config.queries.is_empty() {
      return Err(eyre!(
        "No queries configured. Pass --url or add queries to ~/.config/qfetch/config.yaml"
      ));
    }

    let mut events = EventHandler::new();
    let mut watched = Vec::with_capacity(self.config.queries.len());
    for watch in &self.config.queries {
      let query = Query::new(Arc::clone(&self.cache), self.options_for(watch));
      info!(name = %watch.name, key = %query.cache_key(), "watching query");
      events.watch(watch.name.clone(), query.subscribe());
      watched.push(Watched {
        name: watch.name.clone(),
        query,
      });
    }

    let mut unsettled: BTreeSet<String> = watched.iter().map(|w| w.name.clone()).collect();
    let mut stdout = std::io::stdout();

    // Main loop
    while let Some(event) = events.next().await {
      match event {
        Event::Update { name, state } => {
          let line = serde_json::to_string(&Report::new(&name, &state))?;
          writeln!(stdout, "{}", line)?;

          if state.is_settled() {
            unsettled.remove(&name);
          }
          if self.once && unsettled.is_empty() {
            break;
          }
        }
        Event::Interrupt => {
          info!("interrupted, shutting down");
          break;
        }
      }
    }

    for w in &mut watched {
      info!(name = %w.name, status = ?w.query.status(), "closing query");
      w.query.close();
    }

    Ok(())
  }

  fn options_for(&self, watch: &WatchConfig) -> QueryOptions<Value> {
    let defaults = &self.config.defaults;
    let mut key = QueryKey::new().part("GET").part(watch.url.as_str());
    key.extend(watch.key.iter().cloned());

    let http = self.http.clone();
    let url = watch.url.clone();
    let options = QueryOptions::new(key, move || {
      let http = http.clone();
      let url = url.clone();
      async move { http.get_json(&url).await }
    })
    .with_cache_ttl(watch.cache_ttl(defaults));

    match watch.refetch_interval(defaults) {
      Some(interval) => options.with_refetch_interval(interval),
      None => options,
    }
  }
}
