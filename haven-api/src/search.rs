use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use haven_core::search::{SearchFilters, SearchRequest, SearchResults, DEFAULT_PAGE_SIZE};
use haven_core::StayDates;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/hotels/search", get(search_hotels))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub city: Option<String>,
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub check_in: Option<String>,
    pub check_out: Option<String>,
    pub min_rating: Option<f64>,
    pub max_price: Option<f64>,
    /// Comma separated, every one must be offered.
    pub amenities: Option<String>,
}

impl SearchParams {
    fn into_request(self) -> Result<SearchRequest, AppError> {
        let city = self
            .city
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AppError::ValidationError("city is required".to_string()))?;

        let stay = match (self.check_in.as_deref(), self.check_out.as_deref()) {
            (Some(check_in), Some(check_out)) => Some(StayDates::parse(check_in, check_out)?),
            (None, None) => None,
            _ => {
                return Err(AppError::ValidationError(
                    "checkIn and checkOut must be given together".to_string(),
                ))
            }
        };

        let amenities = self
            .amenities
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(SearchRequest {
            filters: SearchFilters {
                city: Some(city),
                min_rating: self.min_rating,
                max_price: self.max_price,
                amenities,
            },
            page: self.page.unwrap_or(1),
            size: self.size.unwrap_or(DEFAULT_PAGE_SIZE),
            stay,
        })
    }
}

async fn search_hotels(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResults>, AppError> {
    let request = params.into_request()?;
    let results = state.search.search(&request).await?;

    state.metrics.searches.inc();
    state.metrics.degraded_flags.inc_by(results.degraded as u64);
    Ok(Json(results))
}
