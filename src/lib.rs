//! Client-side query result cache with a per-query fetch lifecycle.
//!
//! Inspired by TanStack Query. A [`QueryCache`] holds time-stamped results keyed by a
//! [`QueryKey`], and a [`Query`] drives one key through its lifecycle: serving fresh results
//! from the cache, fetching when the cache cannot answer, retrying failures up to a bound,
//! refreshing on an interval and invalidating on demand.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use qfetch::{query_key, Query, QueryCache, QueryOptions};
//!
//! let cache = QueryCache::global();
//! let options = QueryOptions::new(query_key!["todos", 7], || async {
//!     Ok(serde_json::json!({ "id": 7 }))
//! })
//! .with_refetch_interval(Duration::from_secs(30));
//!
//! let mut query = Query::new(cache, options);
//! let mut updates = query.subscribe();
//! while updates.changed().await.is_ok() {
//!     println!("{:?}", updates.borrow().status());
//! }
//! query.close();
//! ```

pub mod cache;
pub mod error;
pub mod query;

pub use cache::{CacheEntry, CacheValue, QueryCache, QueryKey};
pub use error::{FetchError, MAX_ATTEMPTS};
pub use query::{Query, QueryOptions, QueryState, QueryStatus, DEFAULT_CACHE_TTL};
