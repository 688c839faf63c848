use haven_core::repository::{AvailabilityCheck, SearchIndex};
use haven_core::search::{SearchHit, SearchRequest, SearchResults};
use haven_core::CoreResult;
use std::sync::Arc;
use tracing::info;

use crate::fanout::{enrich_availability, FanoutConfig};

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub max_page_size: u32,
    pub fanout: FanoutConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_page_size: 50,
            fanout: FanoutConfig::default(),
        }
    }
}

pub struct SearchEngine {
    index: Arc<dyn SearchIndex>,
    availability: Arc<dyn AvailabilityCheck>,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(index: Arc<dyn SearchIndex>, availability: Arc<dyn AvailabilityCheck>, config: SearchConfig) -> Self {
        Self {
            index,
            availability,
            config,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Runs the query and, when dates are given, flags each hit on the page.
    ///
    /// Only an unreachable index fails the search; availability problems
    /// degrade individual hits instead.
    pub async fn search(&self, request: &SearchRequest) -> CoreResult<SearchResults> {
        let query = request.to_index_query(self.config.max_page_size)?;
        let page = self.index.query(&query).await?;

        let mut hits: Vec<SearchHit> = page.documents.into_iter().map(SearchHit::from).collect();
        let degraded = match &request.stay {
            Some(stay) => enrich_availability(&mut hits, &self.availability, stay, &self.config.fanout).await,
            None => 0,
        };

        info!(
            city = request.filters.city.as_deref().unwrap_or("*"),
            page = request.page,
            total = page.total,
            returned = hits.len(),
            degraded,
            "Search served"
        );

        Ok(SearchResults {
            hotels: hits,
            total: page.total,
            page: request.page,
            size: request.size,
            degraded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemorySearchIndex;
    use async_trait::async_trait;
    use haven_core::search::{IndexPage, IndexQuery, SearchFilters};
    use haven_core::{CoreError, StayDates};
    use haven_shared::IndexDocument;

    struct BookedOut(&'static str);

    #[async_trait]
    impl AvailabilityCheck for BookedOut {
        async fn is_available(&self, hotel_id: &str, _stay: &StayDates) -> CoreResult<bool> {
            Ok(hotel_id != self.0)
        }
    }

    struct DownIndex;

    #[async_trait]
    impl SearchIndex for DownIndex {
        async fn upsert(&self, _document: IndexDocument) -> CoreResult<()> {
            Err(CoreError::StorageUnavailable("index down".to_string()))
        }

        async fn remove(&self, _id: &str) -> CoreResult<bool> {
            Err(CoreError::StorageUnavailable("index down".to_string()))
        }

        async fn fetch(&self, _id: &str) -> CoreResult<Option<IndexDocument>> {
            Err(CoreError::StorageUnavailable("index down".to_string()))
        }

        async fn query(&self, _query: &IndexQuery) -> CoreResult<IndexPage> {
            Err(CoreError::StorageUnavailable("index down".to_string()))
        }
    }

    fn doc(id: &str, rating: f64) -> IndexDocument {
        IndexDocument {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            city: "Lisbon".to_string(),
            address: String::new(),
            photos: vec![],
            thumbnail: String::new(),
            amenities: vec![],
            rating,
            price_per_night: 100.0,
            provider_id: "PRV1".to_string(),
        }
    }

    fn request(page: u32, size: u32, stay: Option<StayDates>) -> SearchRequest {
        SearchRequest {
            filters: SearchFilters::for_city("lisbon"),
            page,
            size,
            stay,
        }
    }

    async fn seeded() -> Arc<MemorySearchIndex> {
        let index = Arc::new(MemorySearchIndex::new());
        for (id, rating) in [("a", 3.0), ("b", 5.0), ("c", 4.0)] {
            index.upsert(doc(id, rating)).await.unwrap();
        }
        index
    }

    #[tokio::test]
    async fn test_search_with_dates_flags_each_hit() {
        let engine = SearchEngine::new(seeded().await, Arc::new(BookedOut("c")), SearchConfig::default());
        let stay = StayDates::parse("2024-06-01", "2024-06-05").unwrap();

        let results = engine.search(&request(1, 10, Some(stay))).await.unwrap();

        assert_eq!(results.total, 3);
        let flagged: Vec<(&str, Option<bool>)> = results
            .hotels
            .iter()
            .map(|h| (h.document.id.as_str(), h.availability))
            .collect();
        assert_eq!(flagged, vec![("b", Some(true)), ("c", Some(false)), ("a", Some(true))]);
    }

    #[tokio::test]
    async fn test_search_without_dates_leaves_flags_off() {
        let engine = SearchEngine::new(seeded().await, Arc::new(BookedOut("c")), SearchConfig::default());

        let results = engine.search(&request(2, 2, None)).await.unwrap();

        assert_eq!(results.page, 2);
        assert_eq!(results.hotels.len(), 1);
        assert_eq!(results.hotels[0].document.id, "a");
        assert_eq!(results.hotels[0].availability, None);
    }

    #[tokio::test]
    async fn test_bad_paging_and_dead_index_fail() {
        let engine = SearchEngine::new(seeded().await, Arc::new(BookedOut("c")), SearchConfig::default());
        assert!(matches!(engine.search(&request(0, 10, None)).await, Err(CoreError::ValidationError(_))));
        assert!(matches!(engine.search(&request(1, 51, None)).await, Err(CoreError::ValidationError(_))));

        let down = SearchEngine::new(Arc::new(DownIndex), Arc::new(BookedOut("c")), SearchConfig::default());
        assert!(matches!(down.search(&request(1, 10, None)).await, Err(CoreError::StorageUnavailable(_))));
    }
}
