//! Fetch lifecycle coordination for a single query.
//!
//! Inspired by TanStack Query, a [`Query<T>`] owns one query key and decides on every
//! trigger whether the cache can answer or the fetcher has to run:
//!
//! - [`Query::sync`] runs on creation and whenever the options change. A fresh cache entry
//!   is served immediately; otherwise a fetch starts unless one is already in flight.
//! - A configured refetch interval fires a fetch on every tick.
//! - [`Query::refetch`] always fetches and waits for the result.
//! - [`Query::invalidate`] drops the cached entry and fetches again.
//!
//! Failures are counted. After each failure the query re-evaluates itself and retries
//! without delay, until [`MAX_ATTEMPTS`] consecutive failures exhaust it. An exhausted query
//! reports [`FetchError::Exhausted`] instead of calling the fetcher until `sync`, `refetch`,
//! `invalidate` or an interval tick resets the count.
//!
//! # Example
//!
//! ```ignore
//! let options = QueryOptions::new(query_key!["todos", user_id], move || {
//!     let api = api.clone();
//!     async move { api.todos_for(user_id).await }
//! })
//! .with_cache_ttl(Duration::from_secs(60));
//!
//! let mut query = Query::new(QueryCache::global(), options);
//! let mut updates = query.subscribe();
//!
//! // In the event loop
//! if updates.has_changed().unwrap_or(false) {
//!     match updates.borrow_and_update().status() {
//!         QueryStatus::Fetching => render_spinner(),
//!         QueryStatus::Success => render_data(query.data()),
//!         QueryStatus::Failed | QueryStatus::Exhausted => render_error(query.error()),
//!         QueryStatus::Idle => {}
//!     }
//! }
//!
//! // When the view goes away
//! query.close();
//! ```

mod options;
mod state;

pub use options::{QueryOptions, DEFAULT_CACHE_TTL};
pub use state::{QueryState, QueryStatus};

use color_eyre::Result;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::cache::{CacheValue, QueryCache};
use crate::error::{FetchError, MAX_ATTEMPTS};
use options::FetcherFn;

/// Lifecycle coordinator for one query.
///
/// Dropping the query closes it. Fetches already in flight still complete and write the
/// cache, but no longer update this query's state.
pub struct Query<T: CacheValue> {
  shared: Arc<Shared<T>>,
  timer: Option<JoinHandle<()>>,
}

/// State shared between the query handle, its interval timer and its in-flight fetches.
struct Shared<T> {
  cache: Arc<QueryCache>,
  inner: Mutex<Inner<T>>,
  state: watch::Sender<QueryState<T>>,
}

struct Inner<T> {
  options: QueryOptions<T>,
  cache_key: String,
  /// Consecutive failures since the last reset
  attempts: u32,
  in_flight: usize,
  closed: bool,
}

/// An admitted fetch, captured with the key it will write to.
struct Pending<T> {
  key: String,
  fetcher: FetcherFn<T>,
}

impl<T: CacheValue> Shared<T> {
  fn lock(&self) -> MutexGuard<'_, Inner<T>> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Apply `f` to the published state and notify subscribers once.
  fn publish<R: Default>(&self, f: impl FnOnce(&mut QueryState<T>) -> R) -> R {
    let mut out = R::default();
    self.state.send_modify(|state| out = f(state));
    out
  }

  /// Serve a fresh cache entry, or admit a fetch if none is in flight.
  fn evaluate(
    &self,
    inner: &mut Inner<T>,
    state: &mut QueryState<T>,
    reset_attempts: bool,
  ) -> Option<Pending<T>> {
    if inner.closed {
      return None;
    }

    if let Some(entry) = self.cache.get_entry::<T>(&inner.cache_key) {
      if entry.is_fresh(inner.options.cache_ttl) {
        debug!(key = %inner.cache_key, "serving query from cache");
        state.data = Some(entry.value);
        state.is_loading = false;
        state.is_fetching = inner.in_flight > 0;
        return None;
      }
    }

    if inner.in_flight > 0 {
      trace!(key = %inner.cache_key, "fetch already in flight");
      return None;
    }

    if reset_attempts {
      inner.attempts = 0;
    }
    self.begin(inner, state)
  }

  /// Admit a fetch unless the attempt cap is reached.
  fn begin(&self, inner: &mut Inner<T>, state: &mut QueryState<T>) -> Option<Pending<T>> {
    if inner.attempts >= MAX_ATTEMPTS {
      warn!(
        key = %inner.cache_key,
        attempts = inner.attempts,
        "query exhausted its fetch attempts"
      );
      state.error = Some(FetchError::exhausted());
      state.is_loading = false;
      state.is_fetching = inner.in_flight > 0;
      return None;
    }

    inner.in_flight += 1;
    debug!(key = %inner.cache_key, attempt = inner.attempts + 1, "fetching query");
    state.is_fetching = true;
    state.error = None;

    Some(Pending {
      key: inner.cache_key.clone(),
      fetcher: Arc::clone(&inner.options.fetcher),
    })
  }

  /// Commit a fetch result.
  ///
  /// Returns the next fetch to run: a retry after a failure, or the current key after a key change.
  fn settle(&self, key: &str, result: Result<T>) -> Option<Pending<T>> {
    let mut inner = self.lock();
    inner.in_flight = inner.in_flight.saturating_sub(1);

    // The cache is written even when the query was closed in the meantime
    if let Ok(value) = &result {
      self.cache.set(key, value.clone());
    }
    if inner.closed {
      trace!(key, "query closed, dropping fetch result");
      return None;
    }

    if key != inner.cache_key {
      // The key changed while this fetch ran; fetch the current key unless its entry is fresh
      debug!(key, current = %inner.cache_key, "fetch result belongs to a superseded key");
      return self.publish(|state| {
        state.is_fetching = inner.in_flight > 0;
        self.evaluate(&mut inner, state, true)
      });
    }

    self.publish(|state| {
      match result {
        Ok(value) => {
          debug!(key, "query fetch succeeded");
          inner.attempts = 0;
          state.data = Some(value);
          state.error = None;
        }
        Err(report) => {
          inner.attempts += 1;
          warn!(key, attempt = inner.attempts, error = %report, "query fetch failed");
          state.data = None;
          state.error = Some(FetchError::from(report));
        }
      }
      state.is_loading = false;
      state.is_fetching = inner.in_flight > 0;

      let Some(error) = state.error.clone() else {
        return None;
      };
      let retry = self.evaluate(&mut inner, state, false);
      if retry.is_some() {
        // The last failure stays visible until the retry settles
        state.error = Some(error);
      }
      retry
    })
  }

  /// Await an admitted fetch and any retries it leads to.
  async fn run(self: Arc<Self>, mut pending: Pending<T>) {
    loop {
      let result = (pending.fetcher)().await;
      match self.settle(&pending.key, result) {
        Some(retry) => pending = retry,
        None => break,
      }
    }
  }

  fn spawn(self: &Arc<Self>, pending: Option<Pending<T>>) {
    if let Some(pending) = pending {
      tokio::spawn(Arc::clone(self).run(pending));
    }
  }
}

/// Fire a fetch every `period`, skipping ticks while one is already in flight.
fn spawn_interval<T: CacheValue>(shared: &Arc<Shared<T>>, period: Duration) -> JoinHandle<()> {
  let weak: Weak<Shared<T>> = Arc::downgrade(shared);

  tokio::spawn(async move {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
      ticker.tick().await;
      let Some(shared) = weak.upgrade() else {
        break;
      };

      let pending = {
        let mut inner = shared.lock();
        if inner.closed {
          break;
        }
        if inner.in_flight > 0 {
          trace!(key = %inner.cache_key, "interval tick skipped, fetch in flight");
          continue;
        }
        inner.attempts = 0;
        shared.publish(|state| shared.begin(&mut inner, state))
      };
      shared.spawn(pending);
    }
  })
}

impl<T: CacheValue> Query<T> {
  /// Create a query and run its first sync step.
  ///
  /// Must be called within a Tokio runtime.
  pub fn new(cache: Arc<QueryCache>, options: QueryOptions<T>) -> Self {
    let cache_key = options.cache_key();
    let seeded = cache.get::<T>(&cache_key);
    let (state, _) = watch::channel(QueryState::seeded(seeded));

    let shared = Arc::new(Shared {
      cache,
      inner: Mutex::new(Inner {
        options,
        cache_key,
        attempts: 0,
        in_flight: 0,
        closed: false,
      }),
      state,
    });

    let mut query = Self {
      shared,
      timer: None,
    };
    query.sync();
    query
  }

  /// Create a query backed by [`QueryCache::global`].
  pub fn with_global_cache(options: QueryOptions<T>) -> Self {
    Self::new(QueryCache::global(), options)
  }

  /// Snapshot of the current state.
  pub fn state(&self) -> QueryState<T> {
    self.shared.state.borrow().clone()
  }

  pub fn data(&self) -> Option<T> {
    self.shared.state.borrow().data.clone()
  }

  pub fn is_loading(&self) -> bool {
    self.shared.state.borrow().is_loading
  }

  pub fn is_fetching(&self) -> bool {
    self.shared.state.borrow().is_fetching
  }

  pub fn error(&self) -> Option<FetchError> {
    self.shared.state.borrow().error.clone()
  }

  pub fn status(&self) -> QueryStatus {
    self.shared.state.borrow().status()
  }

  /// Watch state changes from now on. Receivers see the latest state, not every step.
  pub fn subscribe(&self) -> watch::Receiver<QueryState<T>> {
    self.shared.state.subscribe()
  }

  pub fn cache_key(&self) -> String {
    self.shared.lock().cache_key.clone()
  }

  /// Consecutive failures since the last reset.
  pub fn attempts(&self) -> u32 {
    self.shared.lock().attempts
  }

  pub fn is_closed(&self) -> bool {
    self.shared.lock().closed
  }

  /// Re-run the sync step and restart the interval timer.
  ///
  /// Serves the cached value when it is fresh. Otherwise resets the attempt count and starts
  /// a fetch, unless one is already in flight.
  pub fn sync(&mut self) {
    self.stop_timer();

    let (pending, interval) = {
      let mut inner = self.shared.lock();
      if inner.closed {
        return;
      }
      let interval = inner.options.refetch_interval();
      let pending = self
        .shared
        .publish(|state| self.shared.evaluate(&mut inner, state, true));
      (pending, interval)
    };

    self.shared.spawn(pending);
    if let Some(period) = interval {
      self.timer = Some(spawn_interval(&self.shared, period));
    }
  }

  /// Replace key, fetcher, interval and TTL, then sync.
  pub fn set_options(&mut self, options: QueryOptions<T>) {
    {
      let mut inner = self.shared.lock();
      inner.cache_key = options.cache_key();
      inner.options = options;
    }
    self.sync();
  }

  /// Like [`sync`](Self::sync), but keeps the attempt count and the timer.
  ///
  /// An exhausted query reports the exhaustion error again without calling the fetcher.
  pub fn revalidate(&self) {
    let pending = {
      let mut inner = self.shared.lock();
      self
        .shared
        .publish(|state| self.shared.evaluate(&mut inner, state, false))
    };
    self.shared.spawn(pending);
  }

  /// Fetch regardless of cache freshness or fetches in flight, and wait for the result.
  pub async fn refetch(&self) {
    let pending = {
      let mut inner = self.shared.lock();
      if inner.closed {
        return;
      }
      inner.attempts = 0;
      self
        .shared
        .publish(|state| self.shared.begin(&mut inner, state))
    };

    if let Some(pending) = pending {
      Arc::clone(&self.shared).run(pending).await;
    }
  }

  /// Drop the cached entry and local data, then fetch in the background.
  pub fn invalidate(&self) {
    let pending = {
      let mut inner = self.shared.lock();
      if inner.closed {
        return;
      }
      self.shared.cache.delete(&inner.cache_key);
      debug!(key = %inner.cache_key, "query invalidated");
      inner.attempts = 0;
      self.shared.publish(|state| {
        state.data = None;
        self.shared.begin(&mut inner, state)
      })
    };
    self.shared.spawn(pending);
  }

  /// Stop the interval timer and ignore results of fetches still in flight.
  pub fn close(&mut self) {
    self.stop_timer();
    self.shared.lock().closed = true;
  }

  fn stop_timer(&mut self) {
    if let Some(timer) = self.timer.take() {
      timer.abort();
    }
  }
}

impl<T: CacheValue> Drop for Query<T> {
  fn drop(&mut self) {
    self.close();
  }
}

impl<T: CacheValue + std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let inner = self.shared.lock();
    f.debug_struct("Query")
      .field("state", &*self.shared.state.borrow())
      .field("cache_key", &inner.cache_key)
      .field("attempts", &inner.attempts)
      .field("in_flight", &inner.in_flight)
      .finish_non_exhaustive()
  }
}
