use async_trait::async_trait;
use dashmap::DashMap;
use haven_core::repository::IntervalStore;
use haven_core::{CoreError, CoreResult, StayDates};
use haven_shared::{BookingInterval, BookingStatus};
use uuid::Uuid;

/// In-process interval store.
///
/// Intervals are sharded by hotel; the shard guard is the per-hotel
/// serialization point for check-and-insert and status changes.
#[derive(Default)]
pub struct MemoryIntervalStore {
    by_hotel: DashMap<String, Vec<BookingInterval>>,
    hotel_of: DashMap<Uuid, String>,
}

impl MemoryIntervalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn occupied(intervals: &[BookingInterval], stay: &StayDates) -> u64 {
        intervals
            .iter()
            .filter(|i| i.status.occupies() && i.overlaps(stay.check_in(), stay.check_out()))
            .count() as u64
    }
}

#[async_trait]
impl IntervalStore for MemoryIntervalStore {
    async fn record_interval(&self, interval: &BookingInterval) -> CoreResult<Uuid> {
        self.by_hotel
            .entry(interval.hotel_id.clone())
            .or_default()
            .push(interval.clone());
        self.hotel_of.insert(interval.id, interval.hotel_id.clone());
        Ok(interval.id)
    }

    async fn count_overlapping(&self, hotel_id: &str, stay: &StayDates) -> CoreResult<u64> {
        Ok(self
            .by_hotel
            .get(hotel_id)
            .map(|intervals| Self::occupied(&intervals, stay))
            .unwrap_or(0))
    }

    async fn insert_if_free(&self, interval: &BookingInterval) -> CoreResult<bool> {
        let stay = StayDates::new(interval.check_in, interval.check_out)?;

        let mut intervals = self.by_hotel.entry(interval.hotel_id.clone()).or_default();
        if interval.status.occupies() && Self::occupied(&intervals, &stay) > 0 {
            return Ok(false);
        }
        intervals.push(interval.clone());
        drop(intervals);

        self.hotel_of.insert(interval.id, interval.hotel_id.clone());
        Ok(true)
    }

    async fn get_interval(&self, id: Uuid) -> CoreResult<Option<BookingInterval>> {
        let Some(hotel_id) = self.hotel_of.get(&id).map(|h| h.value().clone()) else {
            return Ok(None);
        };
        Ok(self
            .by_hotel
            .get(&hotel_id)
            .and_then(|intervals| intervals.iter().find(|i| i.id == id).cloned()))
    }

    async fn transition(&self, id: Uuid, status: BookingStatus) -> CoreResult<Option<BookingInterval>> {
        let Some(hotel_id) = self.hotel_of.get(&id).map(|h| h.value().clone()) else {
            return Ok(None);
        };
        let Some(mut intervals) = self.by_hotel.get_mut(&hotel_id) else {
            return Ok(None);
        };
        let Some(interval) = intervals.iter_mut().find(|i| i.id == id) else {
            return Ok(None);
        };

        if !interval.status.can_transition_to(status) {
            return Err(CoreError::ValidationError(format!(
                "booking {} cannot move from {} to {}",
                id, interval.status, status
            )));
        }
        if interval.status != status {
            interval.update_status(status);
        }
        Ok(Some(interval.clone()))
    }

    async fn list_for_user(&self, user_id: &str) -> CoreResult<Vec<BookingInterval>> {
        let mut found: Vec<BookingInterval> = self
            .by_hotel
            .iter()
            .flat_map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|i| i.user_id.as_deref() == Some(user_id))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn list_all(&self) -> CoreResult<Vec<BookingInterval>> {
        let mut all: Vec<BookingInterval> = self
            .by_hotel
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use haven_shared::BookingRequest;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn booking(hotel: &str, check_in: &str, check_out: &str, status: BookingStatus) -> BookingInterval {
        BookingInterval::new(
            &BookingRequest {
                hotel_id: hotel.to_string(),
                user_id: Some("u1".to_string()),
                check_in: date(check_in),
                check_out: date(check_out),
                guests: 2,
                total_price: 200.0,
            },
            status,
        )
    }

    fn stay(check_in: &str, check_out: &str) -> StayDates {
        StayDates::parse(check_in, check_out).unwrap()
    }

    #[tokio::test]
    async fn test_counts_only_overlapping_live_intervals() {
        let store = MemoryIntervalStore::new();
        store
            .record_interval(&booking("h1", "2024-01-10", "2024-01-15", BookingStatus::Confirmed))
            .await
            .unwrap();
        store
            .record_interval(&booking("h1", "2024-01-12", "2024-01-14", BookingStatus::Cancelled))
            .await
            .unwrap();
        store
            .record_interval(&booking("h2", "2024-01-10", "2024-01-15", BookingStatus::Pending))
            .await
            .unwrap();

        assert_eq!(store.count_overlapping("h1", &stay("2024-01-14", "2024-01-20")).await.unwrap(), 1);
        assert_eq!(store.count_overlapping("h1", &stay("2024-01-15", "2024-01-20")).await.unwrap(), 0);
        assert_eq!(store.count_overlapping("h3", &stay("2024-01-10", "2024-01-20")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_insert_if_free_refuses_overlap() {
        let store = MemoryIntervalStore::new();
        let first = booking("h1", "2024-06-01", "2024-06-05", BookingStatus::Confirmed);
        let clash = booking("h1", "2024-06-04", "2024-06-06", BookingStatus::Confirmed);
        let after = booking("h1", "2024-06-05", "2024-06-06", BookingStatus::Confirmed);

        assert!(store.insert_if_free(&first).await.unwrap());
        assert!(!store.insert_if_free(&clash).await.unwrap());
        assert!(store.insert_if_free(&after).await.unwrap());
        assert!(store.get_interval(clash.id).await.unwrap().is_none());
        assert_eq!(store.list_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_transition_frees_the_room() {
        let store = MemoryIntervalStore::new();
        let first = booking("h1", "2024-06-01", "2024-06-05", BookingStatus::Confirmed);
        store.insert_if_free(&first).await.unwrap();

        let cancelled = store
            .transition(first.id, BookingStatus::Cancelled)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(store.count_overlapping("h1", &stay("2024-06-02", "2024-06-03")).await.unwrap(), 0);

        let revive = store.transition(first.id, BookingStatus::Confirmed).await;
        assert!(matches!(revive, Err(CoreError::ValidationError(_))));
        assert!(store.transition(Uuid::new_v4(), BookingStatus::Cancelled).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lists_by_user() {
        let store = MemoryIntervalStore::new();
        let mine = booking("h1", "2024-06-01", "2024-06-05", BookingStatus::Confirmed);
        let mut theirs = booking("h2", "2024-06-01", "2024-06-05", BookingStatus::Confirmed);
        theirs.user_id = Some("u2".to_string());
        store.record_interval(&mine).await.unwrap();
        store.record_interval(&theirs).await.unwrap();

        let found = store.list_for_user("u1").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, mine.id);
    }
}
