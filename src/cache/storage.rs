//! In-memory cache storage shared by every query.

use color_eyre::Result;
use once_cell::sync::Lazy;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::time::{Duration, Instant};
use tracing::{debug, trace};

use super::key::QueryKey;
use super::traits::CacheValue;

/// A cached value and the instant it was written.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
  pub value: T,
  pub cached_at: Instant,
}

impl<T> CacheEntry<T> {
  /// Time elapsed since the entry was written.
  pub fn age(&self) -> Duration {
    Instant::now().saturating_duration_since(self.cached_at)
  }

  /// Whether the entry is still within `ttl`. An entry exactly `ttl` old is fresh.
  pub fn is_fresh(&self, ttl: Duration) -> bool {
    !is_expired(Some(self.cached_at), ttl)
  }
}

/// Entry as stored, with the value type erased so one cache serves every query.
#[derive(Clone)]
struct StoredEntry {
  value: Arc<dyn Any + Send + Sync>,
  cached_at: Instant,
}

static GLOBAL: Lazy<Arc<QueryCache>> = Lazy::new(|| Arc::new(QueryCache::new()));

/// Mapping from cache key to the latest value written for it.
///
/// Writes replace value and timestamp together. Nothing is ever evicted: entries live until
/// they are deleted, the cache is cleared, or the cache itself is dropped.
#[derive(Default)]
pub struct QueryCache {
  entries: RwLock<HashMap<String, StoredEntry>>,
}

impl QueryCache {
  /// Create an empty cache, e.g. one per test or per subsystem.
  pub fn new() -> Self {
    Self::default()
  }

  /// The process-wide cache. Created on first use and never torn down.
  pub fn global() -> Arc<Self> {
    Arc::clone(&GLOBAL)
  }

  fn read(&self) -> RwLockReadGuard<'_, HashMap<String, StoredEntry>> {
    self.entries.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, StoredEntry>> {
    self.entries.write().unwrap_or_else(PoisonError::into_inner)
  }

  /// Store `value` under `key`, replacing any previous entry and stamping the current time.
  pub fn set<T: CacheValue>(&self, key: &str, value: T) {
    let entry = StoredEntry {
      value: Arc::new(value),
      cached_at: Instant::now(),
    };
    self.write().insert(key.to_string(), entry);
    debug!(key, "cache entry written");
  }

  /// Get the value stored under `key`, regardless of its age.
  ///
  /// A value stored with a different type reads as a miss.
  pub fn get<T: CacheValue>(&self, key: &str) -> Option<T> {
    self.get_entry(key).map(|entry| entry.value)
  }

  /// Get the value and its timestamp in one read.
  pub fn get_entry<T: CacheValue>(&self, key: &str) -> Option<CacheEntry<T>> {
    let stored = self.read().get(key).cloned()?;
    match stored.value.downcast_ref::<T>() {
      Some(value) => Some(CacheEntry {
        value: value.clone(),
        cached_at: stored.cached_at,
      }),
      None => {
        trace!(
          key,
          expected = std::any::type_name::<T>(),
          "cache entry has a different type"
        );
        None
      }
    }
  }

  /// When `key` was last written, if it is present.
  pub fn get_timestamp(&self, key: &str) -> Option<Instant> {
    self.read().get(key).map(|entry| entry.cached_at)
  }

  /// Whether `key` holds a value written no longer than `ttl` ago.
  pub fn is_fresh(&self, key: &str, ttl: Duration) -> bool {
    !is_expired(self.get_timestamp(key), ttl)
  }

  pub fn contains(&self, key: &str) -> bool {
    self.read().contains_key(key)
  }

  /// Remove `key`. Returns whether an entry was present.
  pub fn delete(&self, key: &str) -> bool {
    let removed = self.write().remove(key).is_some();
    if removed {
      debug!(key, "cache entry deleted");
    }
    removed
  }

  /// Remove every entry.
  pub fn clear(&self) {
    self.write().clear();
    debug!("cache cleared");
  }

  pub fn len(&self) -> usize {
    self.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.read().is_empty()
  }

  /// Snapshot of the keys currently stored, in no particular order.
  pub fn keys(&self) -> Vec<String> {
    self.read().keys().cloned().collect()
  }

  /// Run `fetcher` outside of any query and store its result under `key` on success.
  ///
  /// Queries created afterwards for the same key are seeded from the stored value.
  pub async fn prefetch<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> Result<T>
  where
    T: CacheValue,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    let cache_key = key.cache_hash();
    let value = fetcher().await?;
    self.set(&cache_key, value.clone());
    Ok(value)
  }
}

impl std::fmt::Debug for QueryCache {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("QueryCache")
      .field("len", &self.len())
      .finish_non_exhaustive()
  }
}

/// A timestamp is expired when it is missing or strictly older than `ttl`.
fn is_expired(cached_at: Option<Instant>, ttl: Duration) -> bool {
  match cached_at {
    Some(cached_at) => Instant::now().saturating_duration_since(cached_at) > ttl,
    None => true,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use color_eyre::eyre::eyre;
  use serde_json::{json, Value};

  #[test]
  fn test_set_then_get() {
    let cache = QueryCache::new();
    cache.set("todos|1", json!({ "id": 1 }));

    assert_eq!(cache.get::<Value>("todos|1"), Some(json!({ "id": 1 })));
    assert!(cache.get_timestamp("todos|1").is_some());
    assert!(cache.contains("todos|1"));
    assert_eq!(cache.len(), 1);
  }

  #[test]
  fn test_missing_key() {
    let cache = QueryCache::new();

    assert_eq!(cache.get::<Value>("nope"), None);
    assert_eq!(cache.get_timestamp("nope"), None);
    assert!(!cache.is_fresh("nope", Duration::from_secs(60)));
  }

  #[test]
  fn test_set_overwrites_value() {
    let cache = QueryCache::new();
    cache.set("k", 1u32);
    let first = cache.get_timestamp("k");
    cache.set("k", 2u32);
    let second = cache.get_timestamp("k");

    assert_eq!(cache.get::<u32>("k"), Some(2));
    assert_eq!(cache.len(), 1);
    assert!(second >= first);
  }

  #[test]
  fn test_delete() {
    let cache = QueryCache::new();
    cache.set("k", "value".to_string());

    assert!(cache.delete("k"));
    assert_eq!(cache.get::<String>("k"), None);
    assert_eq!(cache.get_timestamp("k"), None);

    // Deleting again is a no-op
    assert!(!cache.delete("k"));
  }

  #[test]
  fn test_clear() {
    let cache = QueryCache::new();
    cache.set("a", 1u8);
    cache.set("b", 2u8);

    cache.clear();
    assert!(cache.is_empty());
    assert!(cache.keys().is_empty());
  }

  #[test]
  fn test_type_mismatch_reads_as_miss() {
    let cache = QueryCache::new();
    cache.set("k", 42u64);

    assert_eq!(cache.get::<String>("k"), None);
    assert_eq!(cache.get::<u64>("k"), Some(42));
    // The timestamp is type agnostic
    assert!(cache.get_timestamp("k").is_some());
  }

  #[test]
  fn test_global_is_shared() {
    let key = "storage-tests|global";
    QueryCache::global().set(key, 7i32);

    assert_eq!(QueryCache::global().get::<i32>(key), Some(7));
    QueryCache::global().delete(key);
  }

  #[tokio::test(start_paused = true)]
  async fn test_freshness_boundary() {
    let ttl = Duration::from_millis(1000);
    let cache = QueryCache::new();
    cache.set("k", 1u32);

    tokio::time::advance(Duration::from_millis(999)).await;
    assert!(cache.is_fresh("k", ttl));
    assert!(cache.get_entry::<u32>("k").is_some_and(|e| e.is_fresh(ttl)));

    tokio::time::advance(Duration::from_millis(2)).await;
    assert!(!cache.is_fresh("k", ttl));
    // Stale entries are still readable
    assert_eq!(cache.get::<u32>("k"), Some(1));
  }

  #[tokio::test(start_paused = true)]
  async fn test_exactly_ttl_old_is_fresh() {
    let ttl = Duration::from_millis(500);
    let cache = QueryCache::new();
    cache.set("k", 1u32);

    tokio::time::advance(ttl).await;
    assert!(cache.is_fresh("k", ttl));
  }

  #[tokio::test(start_paused = true)]
  async fn test_timestamps_advance_with_writes() {
    let cache = QueryCache::new();
    cache.set("k", 1u32);
    let first = cache.get_timestamp("k");

    tokio::time::advance(Duration::from_millis(250)).await;
    cache.set("k", 2u32);
    let second = cache.get_timestamp("k");

    assert_eq!(
      second.zip(first).map(|(b, a)| b - a),
      Some(Duration::from_millis(250))
    );
  }

  #[tokio::test]
  async fn test_prefetch_stores_result() {
    let cache = QueryCache::new();
    let key = QueryKey::from("users").part(3);

    let value = cache
      .prefetch(&key, || async { Ok(json!({ "name": "ada" })) })
      .await;

    assert!(value.is_ok());
    assert_eq!(cache.get::<Value>("users|3"), Some(json!({ "name": "ada" })));
  }

  #[tokio::test]
  async fn test_prefetch_failure_leaves_cache_untouched() {
    let cache = QueryCache::new();
    let key = QueryKey::from("users");

    let result = cache
      .prefetch(&key, || async { Err::<Value, _>(eyre!("offline")) })
      .await;

    assert!(result.is_err());
    assert!(!cache.contains("users"));
  }
}
