use async_trait::async_trait;
use haven_core::repository::RecordSource;
use haven_core::{CoreError, CoreResult};
use haven_shared::HotelRecord;
use reqwest::StatusCode;
use std::time::Duration;

/// Reads canonical hotel records from a remote catalog service.
pub struct HttpRecordClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRecordClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

fn upstream(e: impl std::fmt::Display) -> CoreError {
    CoreError::UpstreamUnavailable(format!("record service: {}", e))
}

#[async_trait]
impl RecordSource for HttpRecordClient {
    async fn fetch_record(&self, id: &str) -> CoreResult<Option<HotelRecord>> {
        let response = self
            .http
            .get(format!("{}/api/hotels/{}", self.base_url, id))
            .send()
            .await
            .map_err(upstream)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response.json::<HotelRecord>().await.map(Some).map_err(upstream),
            status => Err(upstream(format!("unexpected status {}", status))),
        }
    }
}
