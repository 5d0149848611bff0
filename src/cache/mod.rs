//! Caches used while scanning stores backward.
//!
//! Two independent layers:
//!
//! - [`BlocksCache`]: position to block-envelope memo owned by the
//!   [`Blocks`](crate::blocks::Blocks) engine. Unbounded, cleared explicitly.
//! - [`ReadCache`]: weighted LRU of raw `reverse_read` windows, wrapped
//!   around any store by [`CachedStore`] so repeated sorted-block lookups
//!   stop hitting the backing store.

mod blocks_cache;
mod lru;

pub use blocks_cache::{BlocksCache, LocalBlocksCache};
pub use lru::{CacheKey, CacheStats, CachedStore, ReadCache};
