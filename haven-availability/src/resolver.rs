use async_trait::async_trait;
use haven_core::repository::{AvailabilityCache, AvailabilityCheck, CacheKey, IntervalStore};
use haven_core::{CoreError, CoreResult, StayDates};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Lifetime of a memoized answer.
    pub cache_ttl: Duration,
    /// Upper bound on one interval-store read.
    pub store_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(10),
            store_timeout: Duration::from_secs(3),
        }
    }
}

/// Cache-fronted availability decision over the interval store.
///
/// Cache faults are never fatal: reads fall through to the store and
/// failed writes are only logged. Store faults are always surfaced, a
/// hotel is never reported free when the store could not be asked.
pub struct AvailabilityResolver {
    store: Arc<dyn IntervalStore>,
    cache: Arc<dyn AvailabilityCache>,
    config: ResolverConfig,
}

impl AvailabilityResolver {
    pub fn new(store: Arc<dyn IntervalStore>, cache: Arc<dyn AvailabilityCache>, config: ResolverConfig) -> Self {
        Self { store, cache, config }
    }

    pub async fn is_available(&self, hotel_id: &str, stay: &StayDates) -> CoreResult<bool> {
        if hotel_id.trim().is_empty() {
            return Err(CoreError::ValidationError("hotel id is required".to_string()));
        }

        let key = CacheKey::new(hotel_id, *stay);
        match self.cache.get(&key).await {
            Ok(Some(available)) => {
                debug!(key = %key.render(), available, "Availability cache hit");
                return Ok(available);
            }
            Ok(None) => {}
            Err(e) => warn!(key = %key.render(), error = %e, "Availability cache read failed"),
        }

        // Taken before the store read so that a booking landing in between
        // invalidates and makes this put a no-op.
        let epoch = match self.cache.epoch(hotel_id).await {
            Ok(epoch) => Some(epoch),
            Err(e) => {
                warn!(hotel_id, error = %e, "Availability cache epoch unavailable");
                None
            }
        };

        let count = tokio::time::timeout(self.config.store_timeout, self.store.count_overlapping(hotel_id, stay))
            .await
            .map_err(|_| CoreError::StorageUnavailable(format!("interval store timed out for hotel {}", hotel_id)))??;
        let available = count == 0;

        if let Some(epoch) = epoch {
            match self.cache.put(&key, available, self.config.cache_ttl, epoch).await {
                Ok(true) => {}
                Ok(false) => debug!(key = %key.render(), "Discarded availability computed before an invalidation"),
                Err(e) => warn!(key = %key.render(), error = %e, "Availability cache write failed"),
            }
        }

        Ok(available)
    }

    /// Must complete before a booking is reported as created.
    pub async fn invalidate(&self, hotel_id: &str) -> CoreResult<usize> {
        let removed = self.cache.invalidate(hotel_id).await?;
        debug!(hotel_id, removed, "Availability cache invalidated");
        Ok(removed)
    }
}

#[async_trait]
impl AvailabilityCheck for AvailabilityResolver {
    async fn is_available(&self, hotel_id: &str, stay: &StayDates) -> CoreResult<bool> {
        AvailabilityResolver::is_available(self, hotel_id, stay).await
    }
}
