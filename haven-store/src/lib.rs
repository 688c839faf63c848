//! Configuration and infrastructure adapters: Postgres, Redis, Solr,
//! HTTP service clients and (behind the `kafka` feature) the Kafka bus.

pub mod app_config;
pub mod availability_client;
pub mod database;
#[cfg(feature = "kafka")]
pub mod events;
pub mod hotel_repo;
pub mod interval_repo;
pub mod record_client;
pub mod redis_repo;
pub mod solr_index;

use haven_core::CoreError;
use std::fmt::Display;

pub use app_config::Config;
pub use availability_client::HttpAvailabilityClient;
pub use database::DbClient;
#[cfg(feature = "kafka")]
pub use events::{KafkaPublisher, KafkaSubscription};
pub use hotel_repo::PgHotelRepository;
pub use interval_repo::PgIntervalStore;
pub use record_client::HttpRecordClient;
pub use redis_repo::RedisAvailabilityCache;
pub use solr_index::SolrSearchIndex;

pub(crate) fn storage_error(context: &str, e: impl Display) -> CoreError {
    CoreError::StorageUnavailable(format!("{}: {}", context, e))
}
