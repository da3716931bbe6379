//! 响应缓存模块：质量感知、TTL 自适应的内存缓存。
//!
//! # Response Caching Module
//!
//! Quality-aware, TTL-adaptive, capacity-bounded cache of prior responses.
//! Caching is what keeps the pipeline cheap and responsive under repeated
//! requests, and it doubles as the first fallback source when the upstream
//! API is down.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ResponseCache`] | Capacity-bounded store with adaptive TTLs |
//! | [`CacheConfig`] | Configuration for TTL, capacity and sweeping |
//! | [`CacheKey`] / [`CacheKeyGenerator`] | Normalized-request hashing |
//! | [`score_quality`] | Response quality heuristic in `[0, 1]` |
//! | [`CacheStats`] | Hit/miss/eviction counters |
//!
//! ## Adaptive TTL
//!
//! Entries start from a 10-minute base TTL which is extended for responses
//! the heuristic considers worth keeping: high quality scores, long bodies,
//! and structured content all multiply the TTL. The quality score only biases
//! retention; it never rejects output.
//!
//! ## Eviction
//!
//! Above the capacity cap, the lowest-scoring batch of entries is removed,
//! scored by `0.7·quality + 0.2·hits − 0.1·normalized_age`. A periodic sweep
//! purges strictly expired entries regardless of the cap.

mod key;
mod quality;
mod store;

pub use key::{CacheKey, CacheKeyGenerator};
pub use quality::score_quality;
pub use store::{CacheConfig, CacheStats, ResponseCache};
