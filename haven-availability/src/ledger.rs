use haven_core::repository::{BookingValidator, IntervalStore};
use haven_core::{CoreError, CoreResult, StayDates};
use haven_shared::{BookingInterval, BookingRequest, BookingStatus};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::AvailabilityResolver;

/// Booking write path.
///
/// The provider must accept a stay before its interval is written. A
/// booking is reported as created only after its interval is committed
/// and the hotel's cached availability has been dropped.
pub struct BookingLedger {
    store: Arc<dyn IntervalStore>,
    resolver: Arc<AvailabilityResolver>,
    provider: Arc<dyn BookingValidator>,
}

impl BookingLedger {
    pub fn new(
        store: Arc<dyn IntervalStore>,
        resolver: Arc<AvailabilityResolver>,
        provider: Arc<dyn BookingValidator>,
    ) -> Self {
        Self {
            store,
            resolver,
            provider,
        }
    }

    pub async fn create_booking(&self, request: BookingRequest) -> CoreResult<BookingInterval> {
        let stay = validate(&request)?;

        let reference = self
            .provider
            .validate(&request.hotel_id, &stay, request.guests)
            .await
            .map_err(|e| {
                warn!(hotel_id = %request.hotel_id, error = %e, "Provider refused booking");
                e
            })?;

        let mut booking = BookingInterval::new(&request, BookingStatus::Confirmed);
        booking.provider_booking_id = Some(reference);
        if !self.store.insert_if_free(&booking).await? {
            info!(
                hotel_id = %booking.hotel_id,
                check_in = %booking.check_in,
                check_out = %booking.check_out,
                "Booking refused, dates taken"
            );
            return Err(CoreError::Conflict(format!(
                "hotel {} is not available from {} to {}",
                booking.hotel_id, booking.check_in, booking.check_out
            )));
        }

        if let Err(e) = self.resolver.invalidate(&booking.hotel_id).await {
            // Leaving the interval live would let a stale "available" answer
            // outlive this booking; withdraw it instead.
            error!(booking_id = %booking.id, error = %e, "Cache invalidation failed, rejecting booking");
            if let Err(undo) = self.store.transition(booking.id, BookingStatus::Rejected).await {
                error!(booking_id = %booking.id, error = %undo, "Failed to withdraw booking");
            }
            return Err(CoreError::StorageUnavailable(format!(
                "booking could not be finalized: {}",
                e
            )));
        }

        info!(
            booking_id = %booking.id,
            hotel_id = %booking.hotel_id,
            nights = (booking.check_out - booking.check_in).num_days(),
            "Booking created"
        );
        Ok(booking)
    }

    pub async fn update_status(&self, id: Uuid, status: BookingStatus) -> CoreResult<BookingInterval> {
        let booking = self
            .store
            .transition(id, status)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("booking {}", id)))?;

        if let Err(e) = self.resolver.invalidate(&booking.hotel_id).await {
            // Entries expire on their own; a stale "unavailable" is the only
            // possible outcome of a status change.
            warn!(booking_id = %id, error = %e, "Cache invalidation after status change failed");
        }

        info!(booking_id = %id, status = %booking.status, "Booking status updated");
        Ok(booking)
    }

    pub async fn get_booking(&self, id: Uuid) -> CoreResult<BookingInterval> {
        self.store
            .get_interval(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("booking {}", id)))
    }

    pub async fn bookings_for_user(&self, user_id: &str) -> CoreResult<Vec<BookingInterval>> {
        self.store.list_for_user(user_id).await
    }

    pub async fn all_bookings(&self) -> CoreResult<Vec<BookingInterval>> {
        self.store.list_all().await
    }
}

fn validate(request: &BookingRequest) -> CoreResult<StayDates> {
    if request.hotel_id.trim().is_empty() {
        return Err(CoreError::ValidationError("hotelId is required".to_string()));
    }
    let stay = StayDates::new(request.check_in, request.check_out)?;
    if request.guests == 0 {
        return Err(CoreError::ValidationError("at least one guest is required".to_string()));
    }
    if !request.total_price.is_finite() || request.total_price < 0.0 {
        return Err(CoreError::ValidationError("totalPrice must be a non-negative amount".to_string()));
    }
    Ok(stay)
}
