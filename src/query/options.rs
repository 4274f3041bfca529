use color_eyre::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::QueryKey;

/// Freshness window used when none is configured: 10 minutes.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

/// A factory function that creates futures for fetching data
pub(crate) type FetcherFn<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// Configuration of a single query.
pub struct QueryOptions<T> {
  pub(crate) key: QueryKey,
  pub(crate) fetcher: FetcherFn<T>,
  pub(crate) refetch_interval: Option<Duration>,
  pub(crate) cache_ttl: Duration,
}

impl<T> QueryOptions<T> {
  /// Create options for the query identified by `key`, fetched by `fetcher`.
  ///
  /// The fetcher is called each time the query needs data. It should fail with an
  /// `eyre` report when the data cannot be produced.
  ///
  /// ```ignore
  /// let api = api.clone();
  /// let options = QueryOptions::new(query_key!["todos", user_id], move || {
  ///     let api = api.clone();
  ///     async move { api.todos_for(user_id).await }
  /// });
  /// ```
  pub fn new<K, F, Fut>(key: K, fetcher: F) -> Self
  where
    K: Into<QueryKey>,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    Self {
      key: key.into(),
      fetcher: Arc::new(move || fetcher().boxed()),
      refetch_interval: None,
      cache_ttl: DEFAULT_CACHE_TTL,
    }
  }

  /// Refetch periodically. A zero interval disables periodic refetching.
  pub fn with_refetch_interval(mut self, interval: Duration) -> Self {
    self.refetch_interval = Some(interval);
    self
  }

  /// Set how long cached data is served without refetching.
  pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
    self.cache_ttl = ttl;
    self
  }

  pub fn key(&self) -> &QueryKey {
    &self.key
  }

  pub fn cache_key(&self) -> String {
    self.key.cache_hash()
  }

  pub fn cache_ttl(&self) -> Duration {
    self.cache_ttl
  }

  /// The configured interval, if it enables periodic refetching.
  pub fn refetch_interval(&self) -> Option<Duration> {
    self.refetch_interval.filter(|interval| !interval.is_zero())
  }
}

impl<T> Clone for QueryOptions<T> {
  fn clone(&self) -> Self {
    Self {
      key: self.key.clone(),
      fetcher: Arc::clone(&self.fetcher),
      refetch_interval: self.refetch_interval,
      cache_ttl: self.cache_ttl,
    }
  }
}

impl<T> std::fmt::Debug for QueryOptions<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("QueryOptions")
      .field("key", &self.key)
      .field("refetch_interval", &self.refetch_interval)
      .field("cache_ttl", &self.cache_ttl)
      .finish_non_exhaustive()
  }
}
