use crate::clock::Clock;
use crate::error::Result;
use crate::storage::{KeyValueStore, CACHE_TIMESTAMP_KEY, INVENTORY_CACHE_KEY};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

pub const INVENTORY: &str = "inventory";

const CACHE_PREFIX: &str = "sibim_";
const DATA_SUFFIX: &str = "_cache";
const TIMESTAMP_SUFFIX: &str = "_cache_timestamp";

/// Time-boxed cache of remote collections, one entry per logical sheet.
///
/// A read hits iff `now - timestamp < ttl`. Invalidation drops the timestamp
/// only; the payload stays behind for [`ResponseCache::get_stale`].
pub struct ResponseCache {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { store, clock, ttl }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let (data_key, ts_key) = storage_keys(key);

        let timestamp: i64 = self.store.get(&ts_key)?.trim().parse().ok()?;
        let age = self.clock.now_millis() - timestamp;
        if age < 0 || age >= self.ttl.as_millis() as i64 {
            return None;
        }

        let data = self.store.get(&data_key)?;
        match serde_json::from_str(&data) {
            Ok(value) => {
                tracing::debug!("📦 Cache hit for {} ({}s old)", key, age / 1000);
                Some(value)
            }
            Err(e) => {
                tracing::warn!("Discarding unreadable cache entry {}: {}", key, e);
                None
            }
        }
    }

    /// Last stored payload regardless of age or invalidation.
    pub fn get_stale<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let (data_key, _) = storage_keys(key);
        let data = self.store.get(&data_key)?;
        serde_json::from_str(&data).ok()
    }

    pub fn put<T: Serialize + ?Sized>(&self, key: &str, data: &T) -> Result<()> {
        let (data_key, ts_key) = storage_keys(key);
        let payload = serde_json::to_string(data)?;
        self.store.set(&data_key, &payload)?;
        self.store.set(&ts_key, &self.clock.now_millis().to_string())?;
        Ok(())
    }

    pub fn invalidate(&self, key: &str) -> Result<()> {
        let (_, ts_key) = storage_keys(key);
        tracing::debug!("Invalidating cache entry {}", key);
        self.store.remove(&ts_key)
    }

    pub fn invalidate_all(&self) -> Result<()> {
        for key in self.store.keys() {
            if key == CACHE_TIMESTAMP_KEY
                || (key.starts_with(CACHE_PREFIX) && key.ends_with(TIMESTAMP_SUFFIX))
            {
                self.store.remove(&key)?;
            }
        }
        Ok(())
    }

    /// Remove payloads as well as timestamps.
    pub fn purge(&self) -> Result<()> {
        self.invalidate_all()?;
        for key in self.store.keys() {
            if key.starts_with(CACHE_PREFIX) && key.ends_with(DATA_SUFFIX) {
                self.store.remove(&key)?;
            }
        }
        Ok(())
    }
}

/// Storage keys for a logical cache key. The inventory keeps the historical names.
pub fn storage_keys(key: &str) -> (String, String) {
    if key == INVENTORY {
        return (INVENTORY_CACHE_KEY.to_string(), CACHE_TIMESTAMP_KEY.to_string());
    }
    let key = key.to_lowercase();
    (
        format!("{}{}{}", CACHE_PREFIX, key, DATA_SUFFIX),
        format!("{}{}{}", CACHE_PREFIX, key, TIMESTAMP_SUFFIX),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;

    fn cache_at_zero() -> (ResponseCache, Arc<ManualClock>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::at_millis(1_700_000_000_000));
        let cache = ResponseCache::new(store.clone(), clock.clone(), Duration::from_secs(300));
        (cache, clock, store)
    }

    #[test]
    fn test_hit_inside_ttl_and_miss_after() {
        let (cache, clock, _) = cache_at_zero();
        cache.put(INVENTORY, &vec!["a", "b", "c"]).unwrap();

        clock.advance(Duration::from_secs(299));
        let hit: Option<Vec<String>> = cache.get(INVENTORY);
        assert_eq!(hit.map(|v| v.len()), Some(3));

        clock.advance(Duration::from_secs(2));
        let miss: Option<Vec<String>> = cache.get(INVENTORY);
        assert!(miss.is_none());
    }

    #[test]
    fn test_exact_ttl_boundary_misses() {
        let (cache, clock, _) = cache_at_zero();
        cache.put(INVENTORY, &vec![1, 2]).unwrap();

        clock.advance(Duration::from_secs(300));
        assert!(cache.get::<Vec<i32>>(INVENTORY).is_none());
    }

    #[test]
    fn test_invalidate_then_get_misses_but_stale_survives() {
        let (cache, _, _) = cache_at_zero();
        cache.put(INVENTORY, &vec![1, 2, 3]).unwrap();

        cache.invalidate(INVENTORY).unwrap();
        assert!(cache.get::<Vec<i32>>(INVENTORY).is_none());
        assert_eq!(cache.get_stale::<Vec<i32>>(INVENTORY), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_inventory_uses_historical_storage_keys() {
        let (cache, _, store) = cache_at_zero();
        cache.put(INVENTORY, &vec![1]).unwrap();
        cache.put("Departamentos", &vec![2]).unwrap();

        assert!(store.get("sibim_inventory_cache").is_some());
        assert!(store.get("sibim_cache_timestamp").is_some());
        assert!(store.get("sibim_departamentos_cache").is_some());
        assert!(store.get("sibim_departamentos_cache_timestamp").is_some());
    }

    #[test]
    fn test_invalidate_all_and_purge() {
        let (cache, _, store) = cache_at_zero();
        store.set("sibim_theme", "dark").unwrap();
        cache.put(INVENTORY, &vec![1]).unwrap();
        cache.put("movements", &vec![2]).unwrap();

        cache.invalidate_all().unwrap();
        assert!(cache.get::<Vec<i32>>(INVENTORY).is_none());
        assert!(cache.get::<Vec<i32>>("movements").is_none());
        assert!(cache.get_stale::<Vec<i32>>("movements").is_some());

        cache.purge().unwrap();
        assert!(cache.get_stale::<Vec<i32>>(INVENTORY).is_none());
        assert!(cache.get_stale::<Vec<i32>>("movements").is_none());
        assert_eq!(store.get("sibim_theme").as_deref(), Some("dark"));
    }

    #[test]
    fn test_timestamp_from_the_future_is_a_miss() {
        let (cache, clock, _) = cache_at_zero();
        cache.put(INVENTORY, &vec![1]).unwrap();
        clock.set(clock.now() - chrono::Duration::seconds(10));
        assert!(cache.get::<Vec<i32>>(INVENTORY).is_none());
    }
}
