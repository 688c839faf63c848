use async_trait::async_trait;
use haven_core::repository::BookingValidator;
use haven_core::{CoreError, CoreResult, StayDates};
use tracing::debug;
use uuid::Uuid;

/// Largest party a single room booking may carry.
pub const MAX_GUESTS: u32 = 10;

/// Stand-in for the booking provider when no provider account is configured.
///
/// Applies the provider's own acceptance rules and issues a `SIM_` reference.
#[derive(Debug, Default, Clone)]
pub struct SimulatedProvider;

impl SimulatedProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BookingValidator for SimulatedProvider {
    async fn validate(&self, hotel_id: &str, stay: &StayDates, guests: u32) -> CoreResult<String> {
        if !(1..=MAX_GUESTS).contains(&guests) {
            return Err(CoreError::ValidationError(format!(
                "guests must be between 1 and {}",
                MAX_GUESTS
            )));
        }

        let reference = format!("SIM_{}_{}", hotel_id, Uuid::new_v4().simple());
        debug!(hotel_id, nights = stay.nights(), %reference, "Provider accepted booking");
        Ok(reference)
    }
}
