use async_trait::async_trait;
use haven_core::repository::SearchIndex;
use haven_core::search::{IndexPage, IndexQuery, SearchFilters};
use haven_core::CoreResult;
use haven_shared::IndexDocument;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::storage_error;

const SORT: &str = "rating desc,id asc";

/// Search index backed by a Solr core.
///
/// The core's `city` field is expected to be a lowercased string type so
/// that city matches are case-insensitive.
pub struct SolrSearchIndex {
    http: reqwest::Client,
    core_url: String,
}

#[derive(Deserialize)]
struct SelectResponse {
    response: SelectBody,
}

#[derive(Deserialize)]
struct SelectBody {
    #[serde(rename = "numFound")]
    num_found: u64,
    docs: Vec<IndexDocument>,
}

#[derive(Deserialize)]
struct GetResponse {
    doc: Option<IndexDocument>,
}

impl SolrSearchIndex {
    pub fn new(core_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            core_url: core_url.trim_end_matches('/').to_string(),
        })
    }

    async fn update(&self, body: serde_json::Value) -> CoreResult<()> {
        let response = self
            .http
            .post(format!("{}/update", self.core_url))
            .query(&[("commit", "true")])
            .json(&body)
            .send()
            .await
            .map_err(|e| storage_error("solr update", e))?;
        if !response.status().is_success() {
            return Err(storage_error("solr update", response.status()));
        }
        Ok(())
    }
}

/// Quotes a value for use inside a Solr phrase.
fn phrase(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn filter_queries(filters: &SearchFilters) -> Vec<String> {
    let mut fq = Vec::new();
    if let Some(city) = &filters.city {
        fq.push(format!("city:{}", phrase(&city.trim().to_lowercase())));
    }
    if let Some(min) = filters.min_rating {
        fq.push(format!("rating:[{} TO *]", min));
    }
    if let Some(max) = filters.max_price {
        fq.push(format!("price_per_night:[* TO {}]", max));
    }
    for amenity in &filters.amenities {
        fq.push(format!("amenities:{}", phrase(amenity)));
    }
    fq
}

#[async_trait]
impl SearchIndex for SolrSearchIndex {
    async fn upsert(&self, document: IndexDocument) -> CoreResult<()> {
        self.update(json!([document])).await?;
        debug!(hotel_id = %document.id, "Solr document upserted");
        Ok(())
    }

    async fn remove(&self, id: &str) -> CoreResult<bool> {
        let existed = self.fetch(id).await?.is_some();
        self.update(json!({ "delete": { "id": id } })).await?;
        Ok(existed)
    }

    async fn fetch(&self, id: &str) -> CoreResult<Option<IndexDocument>> {
        let response = self
            .http
            .get(format!("{}/get", self.core_url))
            .query(&[("id", id)])
            .send()
            .await
            .map_err(|e| storage_error("solr get", e))?;
        if !response.status().is_success() {
            return Err(storage_error("solr get", response.status()));
        }
        let body: GetResponse = response.json().await.map_err(|e| storage_error("solr get", e))?;
        Ok(body.doc)
    }

    async fn query(&self, query: &IndexQuery) -> CoreResult<IndexPage> {
        let mut params: Vec<(&str, String)> = vec![
            ("q", "*:*".to_string()),
            ("start", query.offset.to_string()),
            ("rows", query.limit.to_string()),
            ("sort", SORT.to_string()),
            ("wt", "json".to_string()),
        ];
        params.extend(filter_queries(&query.filters).into_iter().map(|fq| ("fq", fq)));

        let response = self
            .http
            .get(format!("{}/select", self.core_url))
            .query(&params)
            .send()
            .await
            .map_err(|e| storage_error("solr select", e))?;
        if !response.status().is_success() {
            return Err(storage_error("solr select", response.status()));
        }
        let body: SelectResponse = response.json().await.map_err(|e| storage_error("solr select", e))?;

        Ok(IndexPage {
            total: body.response.num_found,
            documents: body.response.docs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_queries() {
        let filters = SearchFilters {
            city: Some(" Lisbon ".to_string()),
            min_rating: Some(4.0),
            max_price: Some(150.5),
            amenities: vec!["wifi".to_string(), "sea \"view\"".to_string()],
        };

        assert_eq!(
            filter_queries(&filters),
            vec![
                "city:\"lisbon\"".to_string(),
                "rating:[4 TO *]".to_string(),
                "price_per_night:[* TO 150.5]".to_string(),
                "amenities:\"wifi\"".to_string(),
                "amenities:\"sea \\\"view\\\"\"".to_string(),
            ]
        );
        assert!(filter_queries(&SearchFilters::default()).is_empty());
    }

    #[test]
    fn test_select_response_shape() {
        let raw = r#"{
            "responseHeader": {"status": 0},
            "response": {"numFound": 7, "start": 0, "docs": [{
                "id": "h1", "name": "Azul", "description": "", "city": "Lisbon",
                "address": "", "photos": [], "thumbnail": "", "amenities": ["wifi"],
                "rating": 4.5, "price_per_night": 90.0, "provider_id": "PRV1"
            }]}
        }"#;
        let parsed: SelectResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.response.num_found, 7);
        assert_eq!(parsed.response.docs[0].id, "h1");

        let missing: GetResponse = serde_json::from_str(r#"{"doc": null}"#).unwrap();
        assert!(missing.doc.is_none());
    }
}
