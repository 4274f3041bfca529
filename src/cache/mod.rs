//! Time-stamped cache for query results.
//!
//! This module is independent of fetching:
//! - Stores one value per string key together with the instant it was written
//! - Never evicts; the TTL only decides whether a stored value counts as fresh
//! - Derives string keys from ordered identity lists ([`QueryKey`])

mod key;
mod storage;
mod traits;

pub use key::{QueryKey, KEY_SEPARATOR};
pub use storage::{CacheEntry, QueryCache};
pub use traits::CacheValue;
