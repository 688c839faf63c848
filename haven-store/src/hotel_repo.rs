use async_trait::async_trait;
use chrono::{DateTime, Utc};
use haven_core::repository::HotelRepository;
use haven_core::{CoreError, CoreResult};
use haven_shared::{HotelDraft, HotelRecord};
use sqlx::PgPool;

use crate::storage_error;

pub struct PgHotelRepository {
    pool: PgPool,
}

impl PgHotelRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct HotelRow {
    id: String,
    name: String,
    description: String,
    city: String,
    address: String,
    photos: Vec<String>,
    thumbnail: String,
    amenities: Vec<String>,
    rating: f64,
    price_per_night: f64,
    provider_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<HotelRow> for HotelRecord {
    fn from(row: HotelRow) -> Self {
        HotelRecord {
            id: row.id,
            name: row.name,
            description: row.description,
            city: row.city,
            address: row.address,
            photos: row.photos,
            thumbnail: row.thumbnail,
            amenities: row.amenities,
            rating: row.rating,
            price_per_night: row.price_per_night,
            provider_id: row.provider_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const COLUMNS: &str = "id, name, description, city, address, photos, thumbnail, amenities, \
                       rating, price_per_night, provider_id, created_at, updated_at";

#[async_trait]
impl HotelRepository for PgHotelRepository {
    async fn get_hotel(&self, id: &str) -> CoreResult<Option<HotelRecord>> {
        let row = sqlx::query_as::<_, HotelRow>(&format!("SELECT {} FROM hotels WHERE id = $1", COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_error("hotel lookup failed", e))?;
        Ok(row.map(HotelRecord::from))
    }

    async fn insert_hotel(&self, record: &HotelRecord) -> CoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO hotels (id, name, description, city, address, photos, thumbnail, amenities,
                                rating, price_per_night, provider_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.description)
        .bind(&record.city)
        .bind(&record.address)
        .bind(&record.photos)
        .bind(&record.thumbnail)
        .bind(&record.amenities)
        .bind(record.rating)
        .bind(record.price_per_night)
        .bind(&record.provider_id)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(CoreError::Conflict(
                format!("hotel {} already exists", record.id),
            )),
            Err(e) => Err(storage_error("hotel insert failed", e)),
        }
    }

    async fn update_hotel(&self, id: &str, draft: HotelDraft) -> CoreResult<Option<HotelRecord>> {
        let row = sqlx::query_as::<_, HotelRow>(&format!(
            r#"
            UPDATE hotels
               SET name = $2, description = $3, city = $4, address = $5, photos = $6,
                   thumbnail = $7, amenities = $8, rating = $9, price_per_night = $10,
                   updated_at = now()
             WHERE id = $1
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(id)
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(&draft.city)
        .bind(&draft.address)
        .bind(&draft.photos)
        .bind(&draft.thumbnail)
        .bind(&draft.amenities)
        .bind(draft.rating)
        .bind(draft.price_per_night)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_error("hotel update failed", e))?;
        Ok(row.map(HotelRecord::from))
    }

    async fn delete_hotel(&self, id: &str) -> CoreResult<Option<HotelRecord>> {
        let row = sqlx::query_as::<_, HotelRow>(&format!("DELETE FROM hotels WHERE id = $1 RETURNING {}", COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_error("hotel delete failed", e))?;
        Ok(row.map(HotelRecord::from))
    }
}
