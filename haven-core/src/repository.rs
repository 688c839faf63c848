use async_trait::async_trait;
use haven_shared::{BookingInterval, BookingStatus, HotelDraft, HotelRecord, IndexDocument};
use std::time::Duration;
use uuid::Uuid;

use crate::search::{IndexPage, IndexQuery};
use crate::{CoreResult, StayDates};

/// Canonical hotel record storage, owned by the catalog service.
#[async_trait]
pub trait HotelRepository: Send + Sync {
    async fn get_hotel(&self, id: &str) -> CoreResult<Option<HotelRecord>>;

    async fn insert_hotel(&self, record: &HotelRecord) -> CoreResult<()>;

    /// Returns the updated record, or `None` when the id is unknown.
    async fn update_hotel(&self, id: &str, draft: HotelDraft) -> CoreResult<Option<HotelRecord>>;

    /// Returns the removed record, or `None` when the id is unknown.
    async fn delete_hotel(&self, id: &str) -> CoreResult<Option<HotelRecord>>;
}

/// Read-by-id access to the canonical record, as seen by the synchronizer.
///
/// `Ok(None)` is authoritative: the record no longer exists.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch_record(&self, id: &str) -> CoreResult<Option<HotelRecord>>;
}

/// Durable booking intervals per hotel.
#[async_trait]
pub trait IntervalStore: Send + Sync {
    /// Unconditional insert.
    async fn record_interval(&self, interval: &BookingInterval) -> CoreResult<Uuid>;

    /// Number of pending/confirmed intervals overlapping `stay`.
    async fn count_overlapping(&self, hotel_id: &str, stay: &StayDates) -> CoreResult<u64>;

    /// Atomic check-and-insert, serialized per hotel.
    /// Returns `false` without writing when an occupying interval overlaps.
    async fn insert_if_free(&self, interval: &BookingInterval) -> CoreResult<bool>;

    async fn get_interval(&self, id: Uuid) -> CoreResult<Option<BookingInterval>>;

    /// Atomic status change. `ValidationError` when the transition is not allowed,
    /// `Ok(None)` when the id is unknown.
    async fn transition(&self, id: Uuid, status: BookingStatus) -> CoreResult<Option<BookingInterval>>;

    async fn list_for_user(&self, user_id: &str) -> CoreResult<Vec<BookingInterval>>;

    async fn list_all(&self) -> CoreResult<Vec<BookingInterval>>;
}

/// Key of a memoized availability answer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub hotel_id: String,
    pub stay: StayDates,
}

impl CacheKey {
    pub fn new(hotel_id: &str, stay: StayDates) -> Self {
        Self {
            hotel_id: hotel_id.to_string(),
            stay,
        }
    }

    pub fn render(&self) -> String {
        format!(
            "availability:{}:{}:{}",
            self.hotel_id,
            self.stay.check_in(),
            self.stay.check_out()
        )
    }
}

/// Short-lived memoization of availability answers.
///
/// Every hotel carries an epoch that `invalidate` advances; a `put` made
/// with an older epoch is dropped so a value computed before a booking
/// can never land after that booking's invalidation.
#[async_trait]
pub trait AvailabilityCache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> CoreResult<Option<bool>>;

    async fn epoch(&self, hotel_id: &str) -> CoreResult<u64>;

    /// Returns whether the value was stored.
    async fn put(&self, key: &CacheKey, available: bool, ttl: Duration, epoch: u64) -> CoreResult<bool>;

    /// Drops every entry of the hotel. Returns the number of entries removed.
    async fn invalidate(&self, hotel_id: &str) -> CoreResult<usize>;
}

/// Queryable search index.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn upsert(&self, document: IndexDocument) -> CoreResult<()>;

    /// Returns whether a document was removed. Unknown ids are not an error.
    async fn remove(&self, id: &str) -> CoreResult<bool>;

    async fn fetch(&self, id: &str) -> CoreResult<Option<IndexDocument>>;

    async fn query(&self, query: &IndexQuery) -> CoreResult<IndexPage>;
}

/// Single "is this hotel free" decision, local or remote.
#[async_trait]
pub trait AvailabilityCheck: Send + Sync {
    async fn is_available(&self, hotel_id: &str, stay: &StayDates) -> CoreResult<bool>;
}

/// External booking provider that must accept a stay before it is held.
#[async_trait]
pub trait BookingValidator: Send + Sync {
    /// Returns the provider's booking reference. `ValidationError` when the
    /// provider refuses the request, `UpstreamUnavailable` when it cannot
    /// be reached.
    async fn validate(&self, hotel_id: &str, stay: &StayDates, guests: u32) -> CoreResult<String>;
}
