use async_trait::async_trait;
use chrono::Utc;
use haven_core::repository::HotelRepository;
use haven_core::{CoreError, CoreResult};
use haven_shared::{HotelDraft, HotelRecord};
use parking_lot::RwLock;
use std::collections::HashMap;

/// In-memory hotel records (will be swapped for Postgres when configured)
#[derive(Default)]
pub struct MemoryHotelRepository {
    hotels: RwLock<HashMap<String, HotelRecord>>,
}

impl MemoryHotelRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.hotels.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hotels.read().is_empty()
    }
}

#[async_trait]
impl HotelRepository for MemoryHotelRepository {
    async fn get_hotel(&self, id: &str) -> CoreResult<Option<HotelRecord>> {
        Ok(self.hotels.read().get(id).cloned())
    }

    async fn insert_hotel(&self, record: &HotelRecord) -> CoreResult<()> {
        let mut hotels = self.hotels.write();
        if hotels.contains_key(&record.id) {
            return Err(CoreError::Conflict(format!("hotel {} already exists", record.id)));
        }
        hotels.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update_hotel(&self, id: &str, draft: HotelDraft) -> CoreResult<Option<HotelRecord>> {
        let mut hotels = self.hotels.write();
        Ok(hotels.get_mut(id).map(|record| {
            record.apply(draft, Utc::now());
            record.clone()
        }))
    }

    async fn delete_hotel(&self, id: &str) -> CoreResult<Option<HotelRecord>> {
        Ok(self.hotels.write().remove(id))
    }
}
