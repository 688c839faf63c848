use async_trait::async_trait;
use dashmap::DashMap;
use haven_core::repository::{AvailabilityCache, CacheKey};
use haven_core::CoreResult;
use std::collections::HashSet;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    available: bool,
    expires_at: Instant,
}

/// Concurrent availability cache with a hotel -> keys secondary index.
///
/// `put` and `invalidate` for one hotel are serialized on that hotel's
/// epoch slot, so an invalidation can never interleave with a store.
/// Lock order is always epochs, then keys, then entries.
#[derive(Default)]
pub struct MemoryAvailabilityCache {
    entries: DashMap<CacheKey, CacheEntry>,
    keys_by_hotel: DashMap<String, HashSet<CacheKey>>,
    epochs: DashMap<String, u64>,
}

impl MemoryAvailabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live and expired-but-unswept entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops expired entries. Reads already ignore them; this only
    /// reclaims memory.
    ///
    /// Each hotel is pruned under its epoch slot so a concurrent `put`
    /// cannot have its key unindexed before its entry lands.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let hotels: Vec<String> = self.keys_by_hotel.iter().map(|e| e.key().clone()).collect();

        let mut purged = 0;
        for hotel in hotels {
            let slot = self.epochs.entry(hotel.clone()).or_insert(0);
            if let Some(mut keys) = self.keys_by_hotel.get_mut(&hotel) {
                keys.retain(|key| {
                    if self.entries.remove_if(key, |_, entry| entry.expires_at <= now).is_some() {
                        purged += 1;
                        return false;
                    }
                    self.entries.contains_key(key)
                });
            }
            self.keys_by_hotel.remove_if(&hotel, |_, keys| keys.is_empty());
            drop(slot);
        }
        purged
    }
}

#[async_trait]
impl AvailabilityCache for MemoryAvailabilityCache {
    async fn get(&self, key: &CacheKey) -> CoreResult<Option<bool>> {
        let now = Instant::now();
        let hit = self.entries.get(key).map(|entry| *entry.value());

        match hit {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.available)),
            Some(_) => {
                self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn epoch(&self, hotel_id: &str) -> CoreResult<u64> {
        Ok(self.epochs.get(hotel_id).map(|e| *e.value()).unwrap_or(0))
    }

    async fn put(&self, key: &CacheKey, available: bool, ttl: Duration, epoch: u64) -> CoreResult<bool> {
        let current = self.epochs.entry(key.hotel_id.clone()).or_insert(0);
        if *current != epoch {
            return Ok(false);
        }

        self.keys_by_hotel
            .entry(key.hotel_id.clone())
            .or_default()
            .insert(key.clone());
        self.entries.insert(
            key.clone(),
            CacheEntry {
                available,
                expires_at: Instant::now() + ttl,
            },
        );
        drop(current);
        Ok(true)
    }

    async fn invalidate(&self, hotel_id: &str) -> CoreResult<usize> {
        let mut current = self.epochs.entry(hotel_id.to_string()).or_insert(0);
        *current += 1;

        let keys = self
            .keys_by_hotel
            .remove(hotel_id)
            .map(|(_, keys)| keys)
            .unwrap_or_default();
        let removed = keys
            .iter()
            .filter(|key| self.entries.remove(*key).is_some())
            .count();
        drop(current);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use haven_core::StayDates;

    fn key(hotel: &str, check_in: &str, check_out: &str) -> CacheKey {
        CacheKey::new(hotel, StayDates::parse(check_in, check_out).unwrap())
    }

    const TTL: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn test_put_then_get() {
        let cache = MemoryAvailabilityCache::new();
        let k = key("h1", "2024-06-01", "2024-06-05");

        assert_eq!(cache.get(&k).await.unwrap(), None);
        assert!(cache.put(&k, true, TTL, 0).await.unwrap());
        assert_eq!(cache.get(&k).await.unwrap(), Some(true));
    }

    #[tokio::test]
    async fn test_expired_entries_are_misses() {
        let cache = MemoryAvailabilityCache::new();
        let k = key("h1", "2024-06-01", "2024-06-05");

        cache.put(&k, false, Duration::from_millis(10), 0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get(&k).await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_drops_every_range_of_the_hotel() {
        let cache = MemoryAvailabilityCache::new();
        let a = key("h1", "2024-06-01", "2024-06-05");
        let b = key("h1", "2024-06-02", "2024-06-03");
        let other = key("h2", "2024-06-02", "2024-06-03");
        for k in [&a, &b, &other] {
            cache.put(k, true, TTL, 0).await.unwrap();
        }

        assert_eq!(cache.invalidate("h1").await.unwrap(), 2);
        assert_eq!(cache.get(&a).await.unwrap(), None);
        assert_eq!(cache.get(&b).await.unwrap(), None);
        assert_eq!(cache.get(&other).await.unwrap(), Some(true));
        assert_eq!(cache.invalidate("h-unknown").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_put_with_stale_epoch_is_discarded() {
        let cache = MemoryAvailabilityCache::new();
        let k = key("h1", "2024-06-02", "2024-06-03");

        let before = cache.epoch("h1").await.unwrap();
        cache.invalidate("h1").await.unwrap();

        assert!(!cache.put(&k, true, TTL, before).await.unwrap());
        assert_eq!(cache.get(&k).await.unwrap(), None);

        let now = cache.epoch("h1").await.unwrap();
        assert_eq!(now, before + 1);
        assert!(cache.put(&k, false, TTL, now).await.unwrap());
        assert_eq!(cache.get(&k).await.unwrap(), Some(false));
    }

    #[tokio::test]
    async fn test_purge_reclaims_expired_entries() {
        let cache = MemoryAvailabilityCache::new();
        cache
            .put(&key("h1", "2024-06-01", "2024-06-05"), true, Duration::from_millis(5), 0)
            .await
            .unwrap();
        cache.put(&key("h2", "2024-06-01", "2024-06-05"), true, TTL, 0).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sweeper_never_hides_entries_from_invalidate() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        for round in 0..50 {
            let cache = Arc::new(MemoryAvailabilityCache::new());
            let stop = Arc::new(AtomicBool::new(false));

            let sweeper = {
                let cache = cache.clone();
                let stop = stop.clone();
                std::thread::spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        cache.purge_expired();
                    }
                })
            };

            for day in 1..=28 {
                for month in 1..=10 {
                    let check_in = format!("2024-{:02}-{:02}", month, day);
                    let check_out = format!("2024-{:02}-{:02}", month + 1, day);
                    cache.put(&key("h1", &check_in, &check_out), true, TTL, 0).await.unwrap();
                }
            }

            stop.store(true, Ordering::Relaxed);
            sweeper.join().unwrap();

            cache.invalidate("h1").await.unwrap();
            assert_eq!(cache.len(), 0, "round {}: entries survived invalidate", round);
        }
    }
}
