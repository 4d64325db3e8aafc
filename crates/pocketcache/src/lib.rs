//! # pocketcache
//!
//! Least-recently-used cache used by PocketDB to memoize query results.
//!
//! ## Architecture
//! - **HashMap**: AHash for fast lookups (O(1))
//! - **LRU List**: index-linked list for promotion and eviction (O(1))
//! - **Capacity**: bounded, or unbounded when no positive capacity is given
//! - **Stats**: lock-free hit/miss/eviction counters

#![warn(missing_docs)]

mod lru;
mod stats;

pub use lru::{Iter, KeyNotFound, LruCache};
pub use stats::CacheStats;
