use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use haven_core::repository::IntervalStore;
use haven_core::{CoreError, CoreResult, StayDates};
use haven_shared::{BookingInterval, BookingStatus};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::storage_error;

/// Booking intervals in Postgres.
///
/// Check-and-insert and status changes run in one transaction holding a
/// transaction-scoped advisory lock on the hotel id, so concurrent
/// writers for the same hotel are serialized while other hotels proceed.
pub struct PgIntervalStore {
    pool: PgPool,
}

impl PgIntervalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_hotel(tx: &mut Transaction<'_, Postgres>, hotel_id: &str) -> CoreResult<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(hotel_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| storage_error("hotel lock failed", e))?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    hotel_id: String,
    user_id: Option<String>,
    check_in: NaiveDate,
    check_out: NaiveDate,
    guests: i32,
    total_price: f64,
    status: String,
    provider_booking_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for BookingInterval {
    type Error = CoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status = BookingStatus::parse(&row.status)
            .ok_or_else(|| CoreError::Malformed(format!("booking {} has status '{}'", row.id, row.status)))?;
        Ok(BookingInterval {
            id: row.id,
            hotel_id: row.hotel_id,
            user_id: row.user_id,
            check_in: row.check_in,
            check_out: row.check_out,
            guests: u32::try_from(row.guests).unwrap_or(0),
            total_price: row.total_price,
            status,
            provider_booking_id: row.provider_booking_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const COLUMNS: &str = "id, hotel_id, user_id, check_in, check_out, guests, total_price, status, \
                       provider_booking_id, created_at, updated_at";

const COUNT_OVERLAPPING: &str = r#"
    SELECT COUNT(*) FROM bookings
     WHERE hotel_id = $1
       AND status IN ('pending', 'confirmed')
       AND check_in < $3
       AND $2 < check_out
"#;

fn rows_to_intervals(rows: Vec<BookingRow>) -> CoreResult<Vec<BookingInterval>> {
    rows.into_iter().map(BookingInterval::try_from).collect()
}

async fn insert(executor: &mut sqlx::PgConnection, interval: &BookingInterval) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO bookings (id, hotel_id, user_id, check_in, check_out, guests, total_price,
                              status, provider_booking_id, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(interval.id)
    .bind(&interval.hotel_id)
    .bind(&interval.user_id)
    .bind(interval.check_in)
    .bind(interval.check_out)
    .bind(i32::try_from(interval.guests).unwrap_or(i32::MAX))
    .bind(interval.total_price)
    .bind(interval.status.as_str())
    .bind(&interval.provider_booking_id)
    .bind(interval.created_at)
    .bind(interval.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl IntervalStore for PgIntervalStore {
    async fn record_interval(&self, interval: &BookingInterval) -> CoreResult<Uuid> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| storage_error("booking store unreachable", e))?;
        insert(&mut conn, interval)
            .await
            .map_err(|e| storage_error("booking insert failed", e))?;
        Ok(interval.id)
    }

    async fn count_overlapping(&self, hotel_id: &str, stay: &StayDates) -> CoreResult<u64> {
        let count: i64 = sqlx::query_scalar(COUNT_OVERLAPPING)
            .bind(hotel_id)
            .bind(stay.check_in())
            .bind(stay.check_out())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| storage_error("overlap query failed", e))?;
        Ok(count.max(0) as u64)
    }

    async fn insert_if_free(&self, interval: &BookingInterval) -> CoreResult<bool> {
        let stay = StayDates::new(interval.check_in, interval.check_out)?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("booking store unreachable", e))?;
        Self::lock_hotel(&mut tx, &interval.hotel_id).await?;

        let taken: i64 = sqlx::query_scalar(COUNT_OVERLAPPING)
            .bind(&interval.hotel_id)
            .bind(stay.check_in())
            .bind(stay.check_out())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| storage_error("overlap query failed", e))?;
        if interval.status.occupies() && taken > 0 {
            debug!(hotel_id = %interval.hotel_id, taken, "Interval overlaps live bookings");
            return Ok(false);
        }

        insert(&mut tx, interval)
            .await
            .map_err(|e| storage_error("booking insert failed", e))?;
        tx.commit()
            .await
            .map_err(|e| storage_error("booking commit failed", e))?;
        Ok(true)
    }

    async fn get_interval(&self, id: Uuid) -> CoreResult<Option<BookingInterval>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!("SELECT {} FROM bookings WHERE id = $1", COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_error("booking lookup failed", e))?;
        row.map(BookingInterval::try_from).transpose()
    }

    async fn transition(&self, id: Uuid, status: BookingStatus) -> CoreResult<Option<BookingInterval>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("booking store unreachable", e))?;

        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE id = $1 FOR UPDATE",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| storage_error("booking lookup failed", e))?;
        let Some(row) = row else {
            return Ok(None);
        };

        let mut current = BookingInterval::try_from(row)?;
        if !current.status.can_transition_to(status) {
            return Err(CoreError::ValidationError(format!(
                "booking {} cannot move from {} to {}",
                id, current.status, status
            )));
        }
        if current.status == status {
            return Ok(Some(current));
        }

        current.update_status(status);
        sqlx::query("UPDATE bookings SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .bind(current.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_error("booking update failed", e))?;
        tx.commit()
            .await
            .map_err(|e| storage_error("booking commit failed", e))?;
        Ok(Some(current))
    }

    async fn list_for_user(&self, user_id: &str) -> CoreResult<Vec<BookingInterval>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE user_id = $1 ORDER BY created_at DESC",
            COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("booking list failed", e))?;
        rows_to_intervals(rows)
    }

    async fn list_all(&self) -> CoreResult<Vec<BookingInterval>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings ORDER BY created_at DESC",
            COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("booking list failed", e))?;
        rows_to_intervals(rows)
    }
}
