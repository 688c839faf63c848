use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, patch, post},
    Json, Router,
};
use haven_core::{CoreError, StayDates};
use haven_shared::{BookingInterval, BookingRequest, BookingStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// Set by the gateway once the caller is authenticated.
pub const USER_HEADER: &str = "x-user-id";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/availability/{hotel_id}", get(check_availability))
        .route("/api/bookings", post(create_booking).get(list_bookings))
        .route("/api/bookings/user", get(list_user_bookings))
        .route("/api/bookings/{id}", get(get_booking))
        .route("/api/bookings/{id}/status", patch(update_status))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityParams {
    pub check_in: String,
    pub check_out: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    pub available: bool,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

fn user_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

async fn check_availability(
    State(state): State<AppState>,
    Path(hotel_id): Path<String>,
    Query(params): Query<AvailabilityParams>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let stay = StayDates::parse(&params.check_in, &params.check_out)?;
    let available = state.resolver.is_available(&hotel_id, &stay).await?;
    Ok(Json(AvailabilityResponse { available }))
}

async fn create_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut request): Json<BookingRequest>,
) -> Result<(StatusCode, Json<BookingInterval>), AppError> {
    if let Some(user) = user_id(&headers) {
        request.user_id = Some(user);
    }

    let result = state.ledger.create_booking(request).await;
    let label = match &result {
        Ok(_) => "created",
        Err(CoreError::Conflict(_)) => "conflict",
        Err(CoreError::ValidationError(_)) => "invalid",
        Err(_) => "failed",
    };
    state.metrics.bookings.with_label_values(&[label]).inc();

    Ok((StatusCode::CREATED, Json(result?)))
}

async fn list_bookings(State(state): State<AppState>) -> Result<Json<Vec<BookingInterval>>, AppError> {
    Ok(Json(state.ledger.all_bookings().await?))
}

async fn list_user_bookings(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<BookingInterval>>, AppError> {
    let user = user_id(&headers)
        .ok_or_else(|| AppError::ValidationError(format!("{} header is required", USER_HEADER)))?;
    Ok(Json(state.ledger.bookings_for_user(&user).await?))
}

async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingInterval>, AppError> {
    Ok(Json(state.ledger.get_booking(id).await?))
}

async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<BookingInterval>, AppError> {
    let status = BookingStatus::parse(update.status.trim()).ok_or_else(|| {
        AppError::ValidationError(format!(
            "status must be one of {}",
            BookingStatus::ALL.map(|s| s.as_str()).join(", ")
        ))
    })?;
    Ok(Json(state.ledger.update_status(id, status).await?))
}
