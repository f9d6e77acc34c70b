//! Cache module for AI nutrition estimates
//!
//! This module provides a nutrition cache that persists estimates to a single
//! JSON file keyed by a normalized food description. Entries expire after a
//! fixed TTL and are evicted lazily when a read finds them stale. All access
//! goes through the file's lock, so concurrent handlers and cooperating
//! processes can share one cache file.

mod manager;
mod normalize;

pub use manager::{
    ttl, CacheEntry, CacheStats, CacheStore, CachedNutrition, NutritionCache, CACHE_TTL_DAYS,
};
pub use normalize::normalize;
