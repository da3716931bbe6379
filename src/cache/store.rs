//! Capacity-bounded store with adaptive TTLs.

use super::key::CacheKey;
use super::quality::has_structure_markers;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub base_ttl: Duration,
    pub capacity: usize,
    /// Fraction of entries removed in one eviction batch.
    pub evict_fraction: f64,
    pub sweep_interval: Duration,
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            base_ttl: Duration::from_secs(600),
            capacity: 150,
            evict_fraction: 0.3,
            sweep_interval: Duration::from_secs(300),
            enabled: true,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_ttl(mut self, ttl: Duration) -> Self {
        self.base_ttl = ttl;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    insertions: AtomicU64,
    evictions: AtomicU64,
}

impl AtomicStats {
    fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            insertions: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    response: String,
    quality: f64,
    inserted_at: Instant,
    ttl: Duration,
    hit_count: u64,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() > self.ttl
    }

    /// Retention score: higher is worth keeping. Age is normalized against
    /// the entry's own TTL and clamped to `[0, 1]`.
    fn retention_score(&self) -> f64 {
        let normalized_age = (self.inserted_at.elapsed().as_secs_f64()
            / self.ttl.as_secs_f64().max(f64::EPSILON))
        .clamp(0.0, 1.0);
        0.7 * self.quality + 0.2 * self.hit_count as f64 - 0.1 * normalized_age
    }
}

/// Quality-scored, TTL-adaptive, capacity-bounded response cache.
///
/// Entries are readable only while unexpired; reads bump `hit_count`, which
/// feeds the retention score used during eviction. Created once per service
/// instance and shared across all call sites.
pub struct ResponseCache {
    cfg: CacheConfig,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    stats: AtomicStats,
}

impl ResponseCache {
    pub fn new(cfg: CacheConfig) -> Self {
        Self {
            cfg,
            entries: Mutex::new(HashMap::new()),
            stats: AtomicStats::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up an unexpired entry, bumping its hit count.
    ///
    /// Expired entries read as misses but are left in place: removal is the
    /// sweep's job, and a recently expired entry is still a candidate for
    /// [`get_if_younger`](Self::get_if_younger) on the fallback path.
    pub fn get(&self, key: &CacheKey) -> Option<String> {
        if !self.cfg.enabled {
            return None;
        }
        let mut entries = self.lock();
        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired() => {
                entry.hit_count += 1;
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.response.clone())
            }
            _ => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Look up an entry no older than `max_age`, ignoring its TTL.
    ///
    /// Fallback path: a stale-but-recent result beats no result when the
    /// upstream API is down.
    pub fn get_if_younger(&self, key: &CacheKey, max_age: Duration) -> Option<String> {
        if !self.cfg.enabled {
            return None;
        }
        let entries = self.lock();
        entries
            .get(key)
            .filter(|e| e.inserted_at.elapsed() <= max_age)
            .map(|e| e.response.clone())
    }

    /// Adaptive TTL: base 10 minutes, extended for responses worth keeping.
    pub(crate) fn adaptive_ttl(&self, quality: f64, response: &str) -> Duration {
        let mut ttl_ms = self.cfg.base_ttl.as_millis() as f64;
        if quality > 0.8 {
            ttl_ms *= 2.0;
        }
        if quality > 0.9 {
            ttl_ms *= 1.5;
        }
        if response.len() > 1000 {
            ttl_ms *= 1.2;
        }
        if has_structure_markers(response) {
            ttl_ms *= 1.3;
        }
        Duration::from_millis(ttl_ms as u64)
    }

    pub fn put(&self, key: CacheKey, response: &str, quality: f64) {
        if !self.cfg.enabled {
            return;
        }
        let ttl = self.adaptive_ttl(quality, response);
        let mut entries = self.lock();
        entries.insert(
            key,
            CacheEntry {
                response: response.to_string(),
                quality: quality.clamp(0.0, 1.0),
                inserted_at: Instant::now(),
                ttl,
                hit_count: 0,
            },
        );
        self.stats.insertions.fetch_add(1, Ordering::Relaxed);
        self.evict_locked(&mut entries);
    }

    /// Batch eviction above the capacity cap: drop the lowest-scoring
    /// fraction of entries (always at least enough to return under the cap).
    fn evict_locked(&self, entries: &mut HashMap<CacheKey, CacheEntry>) {
        if entries.len() <= self.cfg.capacity {
            return;
        }
        let over = entries.len() - self.cfg.capacity;
        let batch = (entries.len() as f64 * self.cfg.evict_fraction).floor() as usize;
        let remove = batch.max(over);

        let mut scored: Vec<(CacheKey, f64)> = entries
            .iter()
            .map(|(k, e)| (k.clone(), e.retention_score()))
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        for (key, _) in scored.into_iter().take(remove) {
            entries.remove(&key);
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
        tracing::debug!(removed = remove, remaining = entries.len(), "cache eviction");
    }

    /// Purge strictly expired entries. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired());
        before - entries.len()
    }

    /// Clear entries: expired-only when `selective`, everything otherwise.
    /// Returns the number removed.
    pub fn clear(&self, selective: bool) -> usize {
        if selective {
            self.sweep()
        } else {
            let mut entries = self.lock();
            let removed = entries.len();
            entries.clear();
            removed
        }
    }

    pub fn len(&self) -> usize {
        self.lock().values().filter(|e| !e.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            insertions: self.stats.insertions.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        self.cfg.sweep_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheKeyGenerator;
    use crate::types::GenerationParams;

    fn key(prompt: &str) -> CacheKey {
        CacheKeyGenerator::new().generate(&GenerationParams::new(prompt))
    }

    fn cache() -> ResponseCache {
        ResponseCache::new(CacheConfig::default())
    }

    #[test]
    fn test_round_trip_before_ttl() {
        let cache = cache();
        let k = key("hello");
        cache.put(k.clone(), "cached response", 0.5);
        assert_eq!(cache.get(&k).as_deref(), Some("cached response"));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_expired_entry_misses() {
        let cache = ResponseCache::new(CacheConfig::new().with_base_ttl(Duration::from_millis(10)));
        let k = key("hello");
        cache.put(k.clone(), "cached", 0.1);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get(&k), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_hit_count_increments() {
        let cache = cache();
        let k = key("hello");
        cache.put(k.clone(), "cached", 0.5);
        for _ in 0..3 {
            cache.get(&k);
        }
        assert_eq!(cache.stats().hits, 3);
    }

    #[test]
    fn test_adaptive_ttl_quality_scenario() {
        // quality 0.85, 900 chars: x2 for quality > 0.8 only.
        let cache = cache();
        let response = "x".repeat(900);
        assert_eq!(
            cache.adaptive_ttl(0.85, &response),
            Duration::from_millis(1_200_000)
        );
    }

    #[test]
    fn test_adaptive_ttl_stacks_multipliers() {
        let cache = cache();
        // quality 0.95: x2 and x1.5; length 1200: x1.2 => 600_000 * 3.6
        let response = "y".repeat(1200);
        assert_eq!(
            cache.adaptive_ttl(0.95, &response),
            Duration::from_millis(2_160_000)
        );
    }

    #[test]
    fn test_adaptive_ttl_structure_bonus() {
        let cache = cache();
        assert_eq!(
            cache.adaptive_ttl(0.5, "intro\n\nbody"),
            Duration::from_millis(780_000)
        );
    }

    #[test]
    fn test_eviction_prefers_low_scores_and_respects_batch() {
        let cfg = CacheConfig::new().with_capacity(10);
        let cache = ResponseCache::new(cfg);
        // 10 low-quality entries, then one high-quality entry tips it over.
        for i in 0..10 {
            cache.put(key(&format!("low-{i}")), "short", 0.1);
        }
        let good = key("good");
        cache.put(good.clone(), "a thorough, well-structured answer", 0.95);

        let stats = cache.stats();
        assert!(stats.entries <= 10, "must return under capacity");
        // Batch is 30% of 11 = 3; never more than the batch.
        assert!(stats.evictions <= 3, "evicted {} > batch", stats.evictions);
        // The high-quality entry survives.
        assert!(cache.get(&good).is_some());
    }

    #[test]
    fn test_frequently_hit_entries_survive_eviction() {
        let cache = ResponseCache::new(CacheConfig::new().with_capacity(5));
        let hot = key("hot");
        cache.put(hot.clone(), "hot entry", 0.1);
        for _ in 0..5 {
            cache.get(&hot);
        }
        for i in 0..5 {
            cache.put(key(&format!("cold-{i}")), "cold entry", 0.1);
        }
        assert!(cache.get(&hot).is_some(), "hot entry should be retained");
    }

    #[test]
    fn test_sweep_purges_only_expired() {
        let cache = ResponseCache::new(CacheConfig::new().with_base_ttl(Duration::from_millis(20)));
        cache.put(key("a"), "a", 0.1);
        cache.put(key("b"), "b", 0.1);
        // High quality entry gets a longer TTL and survives the sweep.
        cache.put(key("c"), "c", 0.85);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.sweep(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clear_selective_and_full() {
        let cache = ResponseCache::new(CacheConfig::new().with_base_ttl(Duration::from_millis(20)));
        cache.put(key("a"), "a", 0.1);
        cache.put(key("b"), "b", 0.95);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.clear(true), 1);
        assert_eq!(cache.clear(false), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_get_if_younger_ignores_ttl() {
        let cache = ResponseCache::new(CacheConfig::new().with_base_ttl(Duration::from_millis(10)));
        let k = key("stale");
        cache.put(k.clone(), "stale but recent", 0.1);
        std::thread::sleep(Duration::from_millis(20));
        // Expired for normal reads, still served on the fallback path.
        assert_eq!(cache.get(&k), None);
        assert!(cache.get_if_younger(&k, Duration::from_secs(3600)).is_some());
        assert!(cache.get_if_younger(&k, Duration::from_millis(1)).is_none());
    }

    #[test]
    fn test_disabled_cache_stores_nothing() {
        let cache = ResponseCache::new(CacheConfig::new().with_enabled(false));
        let k = key("x");
        cache.put(k.clone(), "value", 0.9);
        assert!(cache.get(&k).is_none());
    }
}
