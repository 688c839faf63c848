use async_trait::async_trait;
use haven_core::repository::AvailabilityCheck;
use haven_core::{CoreError, CoreResult, StayDates};
use serde::Deserialize;
use std::time::Duration;

#[derive(Deserialize)]
struct AvailabilityAnswer {
    available: bool,
}

/// Asks a remote booking service whether a hotel is free.
pub struct HttpAvailabilityClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAvailabilityClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

fn upstream(e: impl std::fmt::Display) -> CoreError {
    CoreError::UpstreamUnavailable(format!("booking service: {}", e))
}

#[async_trait]
impl AvailabilityCheck for HttpAvailabilityClient {
    async fn is_available(&self, hotel_id: &str, stay: &StayDates) -> CoreResult<bool> {
        let response = self
            .http
            .get(format!("{}/api/availability/{}", self.base_url, hotel_id))
            .query(&[
                ("checkIn", stay.check_in().to_string()),
                ("checkOut", stay.check_out().to_string()),
            ])
            .send()
            .await
            .map_err(upstream)?;

        if !response.status().is_success() {
            return Err(upstream(format!("unexpected status {}", response.status())));
        }
        let answer: AvailabilityAnswer = response.json().await.map_err(upstream)?;
        Ok(answer.available)
    }
}
