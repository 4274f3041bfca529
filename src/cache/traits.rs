//! Core traits for values held in the query cache.

/// Trait for values that can be stored in a [`QueryCache`](super::QueryCache).
///
/// Values are cloned out of the cache on every read, so cheap clones (or an `Arc` around the
/// payload) are preferable for large results.
pub trait CacheValue: Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Send + Sync + 'static {}
