use haven_availability::{
    AvailabilityResolver, BookingLedger, MemoryAvailabilityCache, MemoryIntervalStore, ResolverConfig,
    SimulatedProvider,
};
use haven_bus::{Publisher, RetryPolicy, TopicExchange};
use haven_catalog::{HotelCatalog, LocalRecordSource, MemoryHotelRepository};
use haven_core::repository::{
    AvailabilityCache, AvailabilityCheck, BookingValidator, HotelRepository, IntervalStore, RecordSource,
    SearchIndex,
};
use haven_search::{FanoutConfig, IndexSynchronizer, MemorySearchIndex, SearchConfig, SearchEngine};
use haven_shared::{HOTEL_EXCHANGE, SEARCH_BINDING, SEARCH_QUEUE};
use haven_store::Config;
use std::sync::Arc;
use std::time::Duration;

use crate::metrics::ApiMetrics;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<HotelCatalog>,
    pub ledger: Arc<BookingLedger>,
    pub resolver: Arc<AvailabilityResolver>,
    pub search: Arc<SearchEngine>,
    pub metrics: Arc<ApiMetrics>,
}

/// Tunables lifted out of [`Config`].
#[derive(Debug, Clone)]
pub struct Settings {
    pub resolver: ResolverConfig,
    pub search: SearchConfig,
    pub retry: RetryPolicy,
    pub retry_backoff: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            resolver: ResolverConfig::default(),
            search: SearchConfig::default(),
            retry: RetryPolicy::default(),
            retry_backoff: Duration::from_millis(200),
        }
    }
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            resolver: ResolverConfig {
                cache_ttl: Duration::from_secs(config.availability.cache_ttl_seconds),
                store_timeout: Duration::from_millis(config.availability.store_timeout_ms),
            },
            search: SearchConfig {
                max_page_size: config.search.max_page_size,
                fanout: FanoutConfig {
                    check_timeout: Duration::from_millis(config.search.check_timeout_ms),
                    network_margin: Duration::from_millis(config.search.network_margin_ms),
                },
            },
            retry: RetryPolicy::new(config.bus.max_attempts),
            retry_backoff: Duration::from_millis(config.bus.retry_backoff_ms),
        }
    }
}

/// The infrastructure a process runs against.
pub struct Backends {
    pub hotels: Arc<dyn HotelRepository>,
    pub intervals: Arc<dyn IntervalStore>,
    pub cache: Arc<dyn AvailabilityCache>,
    pub index: Arc<dyn SearchIndex>,
    pub publisher: Arc<dyn Publisher>,
    pub records: Arc<dyn RecordSource>,
    /// Remote booking service; the local resolver is used when absent.
    pub availability: Option<Arc<dyn AvailabilityCheck>>,
    pub provider: Arc<dyn BookingValidator>,
}

/// A fully in-process deployment, used by `main` without infrastructure
/// config and by the integration tests.
pub struct InMemoryApp {
    pub state: AppState,
    pub synchronizer: Arc<IndexSynchronizer>,
    pub exchange: Arc<TopicExchange>,
}

impl AppState {
    pub fn build(backends: Backends, settings: &Settings) -> Result<(Self, Arc<IndexSynchronizer>), prometheus::Error> {
        let resolver = Arc::new(AvailabilityResolver::new(
            backends.intervals.clone(),
            backends.cache,
            settings.resolver.clone(),
        ));
        let ledger = Arc::new(BookingLedger::new(
            backends.intervals,
            resolver.clone(),
            backends.provider,
        ));
        let catalog = Arc::new(HotelCatalog::new(backends.hotels, backends.publisher));

        let availability: Arc<dyn AvailabilityCheck> = match backends.availability {
            Some(remote) => remote,
            None => resolver.clone() as Arc<dyn AvailabilityCheck>,
        };
        let search = Arc::new(SearchEngine::new(
            backends.index.clone(),
            availability,
            settings.search.clone(),
        ));
        let synchronizer = Arc::new(IndexSynchronizer::new(backends.records, backends.index));

        let state = AppState {
            catalog,
            ledger,
            resolver,
            search,
            metrics: Arc::new(ApiMetrics::new()?),
        };
        Ok((state, synchronizer))
    }

    pub fn in_memory(settings: &Settings) -> Result<InMemoryApp, anyhow::Error> {
        let exchange = in_memory_exchange(settings.retry)?;
        let hotels: Arc<dyn HotelRepository> = Arc::new(MemoryHotelRepository::new());

        let backends = Backends {
            records: Arc::new(LocalRecordSource::new(hotels.clone())),
            hotels,
            intervals: Arc::new(MemoryIntervalStore::new()),
            cache: Arc::new(MemoryAvailabilityCache::new()),
            index: Arc::new(MemorySearchIndex::new()),
            publisher: exchange.clone(),
            availability: None,
            provider: Arc::new(SimulatedProvider::new()),
        };
        let (state, synchronizer) = AppState::build(backends, settings)?;

        Ok(InMemoryApp {
            state,
            synchronizer,
            exchange,
        })
    }
}

/// Exchange with the search queue declared and bound.
pub fn in_memory_exchange(policy: RetryPolicy) -> Result<Arc<TopicExchange>, haven_bus::BusError> {
    let exchange = Arc::new(TopicExchange::new(HOTEL_EXCHANGE, policy));
    exchange.declare_queue(SEARCH_QUEUE);
    exchange.bind(SEARCH_QUEUE, SEARCH_BINDING)?;
    Ok(exchange)
}
