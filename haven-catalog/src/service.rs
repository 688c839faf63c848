use async_trait::async_trait;
use chrono::Utc;
use haven_bus::Publisher;
use haven_core::repository::{HotelRepository, RecordSource};
use haven_core::{CoreError, CoreResult};
use haven_shared::{ChangeAction, ChangeEvent, HotelDraft, HotelRecord};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Owner of the canonical hotel records.
///
/// Every committed mutation is announced on the bus. Publishing happens
/// after the write and its failure does not undo the write.
pub struct HotelCatalog {
    repo: Arc<dyn HotelRepository>,
    publisher: Arc<dyn Publisher>,
}

impl HotelCatalog {
    pub fn new(repo: Arc<dyn HotelRepository>, publisher: Arc<dyn Publisher>) -> Self {
        Self { repo, publisher }
    }

    pub async fn get_hotel(&self, id: &str) -> CoreResult<HotelRecord> {
        self.repo
            .get_hotel(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("hotel {}", id)))
    }

    pub async fn create_hotel(&self, draft: HotelDraft) -> CoreResult<HotelRecord> {
        check_draft(&draft)?;

        let now = Utc::now();
        let id = Uuid::new_v4().simple().to_string();
        let provider_id = format!("PRV{}", now.timestamp_millis());
        let record = HotelRecord::from_draft(id, provider_id, draft, now);

        self.repo.insert_hotel(&record).await?;
        info!(hotel_id = %record.id, city = %record.city, "Hotel created");

        self.announce(ChangeAction::Created, &record).await;
        Ok(record)
    }

    pub async fn update_hotel(&self, id: &str, draft: HotelDraft) -> CoreResult<HotelRecord> {
        check_draft(&draft)?;

        let record = self
            .repo
            .update_hotel(id, draft)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("hotel {}", id)))?;
        info!(hotel_id = %record.id, "Hotel updated");

        self.announce(ChangeAction::Updated, &record).await;
        Ok(record)
    }

    pub async fn delete_hotel(&self, id: &str) -> CoreResult<()> {
        let record = self
            .repo
            .delete_hotel(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("hotel {}", id)))?;
        info!(hotel_id = %record.id, "Hotel deleted");

        self.announce(ChangeAction::Deleted, &record).await;
        Ok(())
    }

    async fn announce(&self, action: ChangeAction, record: &HotelRecord) {
        let event = ChangeEvent::new(action, record);
        let payload = match event.to_bytes() {
            Ok(payload) => payload,
            Err(e) => {
                error!(hotel_id = %record.id, error = %e, "Failed to encode change event");
                return;
            }
        };

        if let Err(e) = self
            .publisher
            .publish(event.routing_key(), &event.hotel_id, payload)
            .await
        {
            error!(
                hotel_id = %record.id,
                routing_key = event.routing_key(),
                error = %e,
                "Failed to publish change event; index will lag until the next change"
            );
        }
    }
}

fn check_draft(draft: &HotelDraft) -> CoreResult<()> {
    if draft.name.trim().is_empty() {
        return Err(CoreError::ValidationError("name is required".to_string()));
    }
    if draft.city.trim().is_empty() {
        return Err(CoreError::ValidationError("city is required".to_string()));
    }
    Ok(())
}

/// Serves synchronizer re-fetches straight from the repository when the
/// catalog runs in the same process.
pub struct LocalRecordSource {
    repo: Arc<dyn HotelRepository>,
}

impl LocalRecordSource {
    pub fn new(repo: Arc<dyn HotelRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl RecordSource for LocalRecordSource {
    async fn fetch_record(&self, id: &str) -> CoreResult<Option<HotelRecord>> {
        self.repo.get_hotel(id).await
    }
}
