use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use haven_shared::{HotelDraft, HotelRecord};

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/hotels", axum::routing::post(create_hotel))
        .route(
            "/api/hotels/{id}",
            get(get_hotel).put(update_hotel).delete(delete_hotel),
        )
}

async fn get_hotel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<HotelRecord>, AppError> {
    Ok(Json(state.catalog.get_hotel(&id).await?))
}

async fn create_hotel(
    State(state): State<AppState>,
    Json(draft): Json<HotelDraft>,
) -> Result<(StatusCode, Json<HotelRecord>), AppError> {
    let record = state.catalog.create_hotel(draft).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn update_hotel(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(draft): Json<HotelDraft>,
) -> Result<Json<HotelRecord>, AppError> {
    Ok(Json(state.catalog.update_hotel(&id, draft).await?))
}

async fn delete_hotel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.catalog.delete_hotel(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
