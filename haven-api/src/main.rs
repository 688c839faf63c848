use anyhow::Context;
use haven_api::app;
use haven_api::state::{in_memory_exchange, AppState, Backends, Settings};
use haven_api::worker::start_index_sync_worker;
use haven_availability::{MemoryAvailabilityCache, MemoryIntervalStore, SimulatedProvider};
use haven_bus::{ConsumerConfig, Publisher, Subscription};
use haven_catalog::{LocalRecordSource, MemoryHotelRepository};
use haven_core::repository::{AvailabilityCache, AvailabilityCheck, HotelRepository, IntervalStore, RecordSource, SearchIndex};
use haven_search::MemorySearchIndex;
use haven_shared::SEARCH_QUEUE;
use haven_store::{
    Config, DbClient, HttpAvailabilityClient, HttpRecordClient, PgHotelRepository, PgIntervalStore,
    RedisAvailabilityCache, SolrSearchIndex,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "haven_api=debug,haven_search=debug,haven_bus=info,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    let settings = Settings::from_config(&config);
    tracing::info!("Starting Haven API on port {}", config.server.port);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Postgres
    let hotels: Arc<dyn HotelRepository>;
    let intervals: Arc<dyn IntervalStore>;
    match &config.database {
        Some(db) => {
            let client = DbClient::new(&db.url, db.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            client.migrate().await.context("Failed to run migrations")?;
            hotels = Arc::new(PgHotelRepository::new(client.pool.clone()));
            intervals = Arc::new(PgIntervalStore::new(client.pool));
        }
        None => {
            tracing::warn!("No [database] section, hotels and bookings are kept in memory");
            hotels = Arc::new(MemoryHotelRepository::new());
            intervals = Arc::new(MemoryIntervalStore::new());
        }
    }

    // Redis
    let cache: Arc<dyn AvailabilityCache> = match &config.redis {
        Some(redis) => Arc::new(
            RedisAvailabilityCache::new(&redis.url, Duration::from_millis(redis.timeout_ms))
                .context("Invalid Redis URL")?,
        ),
        None => {
            let cache = Arc::new(MemoryAvailabilityCache::new());
            spawn_cache_sweeper(cache.clone(), shutdown_rx.clone());
            cache as Arc<dyn AvailabilityCache>
        }
    };

    // Solr
    let index: Arc<dyn SearchIndex> = match &config.solr {
        Some(solr) => Arc::new(
            SolrSearchIndex::new(&solr.url, Duration::from_millis(solr.timeout_ms))
                .context("Failed to build Solr client")?,
        ),
        None => Arc::new(MemorySearchIndex::new()),
    };

    // Remote peers
    let service_timeout = config
        .services
        .as_ref()
        .map(|s| Duration::from_millis(s.timeout_ms))
        .unwrap_or(Duration::from_secs(5));
    let records: Arc<dyn RecordSource> = match config.services.as_ref().and_then(|s| s.record_url.as_deref()) {
        Some(url) => Arc::new(HttpRecordClient::new(url, service_timeout).context("Failed to build record client")?),
        None => Arc::new(LocalRecordSource::new(hotels.clone())),
    };
    let availability: Option<Arc<dyn AvailabilityCheck>> =
        match config.services.as_ref().and_then(|s| s.availability_url.as_deref()) {
            Some(url) => {
                let client = HttpAvailabilityClient::new(url, service_timeout)
                    .context("Failed to build availability client")?;
                Some(Arc::new(client) as Arc<dyn AvailabilityCheck>)
            }
            None => None,
        };

    // Change bus
    let (publisher, subscription) = change_bus(&config, &settings)?;

    let backends = Backends {
        hotels,
        intervals,
        cache,
        index,
        publisher,
        records,
        availability,
        provider: Arc::new(SimulatedProvider::new()),
    };
    let (app_state, synchronizer) = AppState::build(backends, &settings)?;

    let (worker, _stats) = start_index_sync_worker(
        subscription,
        synchronizer,
        app_state.metrics.clone(),
        shutdown_rx,
        ConsumerConfig {
            retry_backoff: settings.retry_backoff,
            ..ConsumerConfig::default()
        },
    );

    let app = app(app_state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped, draining index sync worker");
    let _ = shutdown_tx.send(true);
    worker.await?;
    Ok(())
}

#[cfg(feature = "kafka")]
fn change_bus(config: &Config, settings: &Settings) -> anyhow::Result<(Arc<dyn Publisher>, Box<dyn Subscription>)> {
    use haven_shared::SEARCH_BINDING;
    use haven_store::{KafkaPublisher, KafkaSubscription};

    if let Some(kafka) = &config.kafka {
        let publisher = KafkaPublisher::new(&kafka.brokers)?;
        let subscription = KafkaSubscription::new(&kafka.brokers, SEARCH_QUEUE, SEARCH_BINDING, settings.retry)?;
        let publisher: Arc<dyn Publisher> = Arc::new(publisher);
        let subscription: Box<dyn Subscription> = Box::new(subscription);
        return Ok((publisher, subscription));
    }
    in_process_bus(settings)
}

#[cfg(not(feature = "kafka"))]
fn change_bus(config: &Config, settings: &Settings) -> anyhow::Result<(Arc<dyn Publisher>, Box<dyn Subscription>)> {
    if config.kafka.is_some() {
        tracing::warn!("[kafka] is configured but this build lacks the `kafka` feature; using the in-process bus");
    }
    in_process_bus(settings)
}

fn in_process_bus(settings: &Settings) -> anyhow::Result<(Arc<dyn Publisher>, Box<dyn Subscription>)> {
    let exchange = in_memory_exchange(settings.retry)?;
    let subscription: Box<dyn Subscription> = Box::new(exchange.subscribe(SEARCH_QUEUE)?);
    let publisher: Arc<dyn Publisher> = exchange;
    Ok((publisher, subscription))
}

fn spawn_cache_sweeper(cache: Arc<MemoryAvailabilityCache>, mut shutdown: watch::Receiver<bool>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let purged = cache.purge_expired();
                    if purged > 0 {
                        tracing::debug!(purged, "Expired availability entries purged");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
