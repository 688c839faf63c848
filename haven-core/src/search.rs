use haven_shared::IndexDocument;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::{CoreError, CoreResult, StayDates};

pub const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Exact, case-insensitive city match.
    pub city: Option<String>,
    pub min_rating: Option<f64>,
    pub max_price: Option<f64>,
    /// Every listed amenity must be offered.
    #[serde(default)]
    pub amenities: Vec<String>,
}

impl SearchFilters {
    pub fn for_city(city: &str) -> Self {
        Self {
            city: Some(city.to_string()),
            ..Default::default()
        }
    }

    pub fn matches(&self, doc: &IndexDocument) -> bool {
        if let Some(city) = &self.city {
            if !doc.city.eq_ignore_ascii_case(city.trim()) {
                return false;
            }
        }
        if let Some(min) = self.min_rating {
            if doc.rating < min {
                return false;
            }
        }
        if let Some(max) = self.max_price {
            if doc.price_per_night > max {
                return false;
            }
        }
        self.amenities.iter().all(|wanted| {
            doc.amenities
                .iter()
                .any(|offered| offered.eq_ignore_ascii_case(wanted))
        })
    }
}

/// Index ranking: rating descending, id ascending on ties so that pages
/// are deterministic.
pub fn rank_order(a: &IndexDocument, b: &IndexDocument) -> Ordering {
    b.rating
        .total_cmp(&a.rating)
        .then_with(|| a.id.cmp(&b.id))
}

/// What the search engine asks of the index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexQuery {
    pub filters: SearchFilters,
    pub offset: u64,
    pub limit: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexPage {
    pub total: u64,
    pub documents: Vec<IndexDocument>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub filters: SearchFilters,
    pub page: u32,
    pub size: u32,
    pub stay: Option<StayDates>,
}

impl SearchRequest {
    /// Validate paging and translate it into an index query.
    pub fn to_index_query(&self, max_page_size: u32) -> CoreResult<IndexQuery> {
        if self.page == 0 {
            return Err(CoreError::ValidationError("page starts at 1".to_string()));
        }
        if self.size == 0 || self.size > max_page_size {
            return Err(CoreError::ValidationError(format!(
                "size must be between 1 and {}",
                max_page_size
            )));
        }

        Ok(IndexQuery {
            filters: self.filters.clone(),
            offset: (self.page as u64 - 1) * self.size as u64,
            limit: self.size,
        })
    }
}

/// One search result; the availability flag is attached per request and
/// never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub document: IndexDocument,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability: Option<bool>,
}

impl From<IndexDocument> for SearchHit {
    fn from(document: IndexDocument) -> Self {
        Self {
            document,
            availability: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub hotels: Vec<SearchHit>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
    /// Hits whose availability could not be resolved and defaulted to false.
    #[serde(skip)]
    pub degraded: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, rating: f64) -> IndexDocument {
        IndexDocument {
            id: id.to_string(),
            name: format!("Hotel {}", id),
            description: String::new(),
            city: "Madrid".to_string(),
            address: String::new(),
            photos: vec![],
            thumbnail: String::new(),
            amenities: vec!["WiFi".to_string(), "pool".to_string()],
            rating,
            price_per_night: 100.0,
            provider_id: String::new(),
        }
    }

    #[test]
    fn test_offset_from_page() {
        let req = SearchRequest {
            filters: SearchFilters::for_city("Madrid"),
            page: 3,
            size: 10,
            stay: None,
        };
        let query = req.to_index_query(50).expect("valid paging");
        assert_eq!(query.offset, 20);
        assert_eq!(query.limit, 10);

        let zero = SearchRequest { page: 0, ..req.clone() };
        assert!(matches!(zero.to_index_query(50), Err(CoreError::ValidationError(_))));

        let huge = SearchRequest { size: 500, ..req };
        assert!(matches!(huge.to_index_query(50), Err(CoreError::ValidationError(_))));
    }

    #[test]
    fn test_rank_order_breaks_ties_by_id() {
        let mut docs = vec![doc("c", 4.0), doc("a", 4.0), doc("b", 4.8)];
        docs.sort_by(rank_order);
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_filters() {
        let d = doc("a", 4.2);
        assert!(SearchFilters::for_city("madrid").matches(&d));
        assert!(!SearchFilters::for_city("Madri").matches(&d));

        let picky = SearchFilters {
            amenities: vec!["wifi".to_string(), "spa".to_string()],
            ..SearchFilters::for_city("Madrid")
        };
        assert!(!picky.matches(&d));

        let cheap = SearchFilters {
            max_price: Some(80.0),
            ..Default::default()
        };
        assert!(!cheap.matches(&d));
    }

    #[test]
    fn test_hit_serializes_flat() {
        let hit = SearchHit {
            document: doc("a", 4.0),
            availability: Some(false),
        };
        let json = serde_json::to_value(&hit).expect("serialize");
        assert_eq!(json["id"], "a");
        assert_eq!(json["availability"], false);

        let bare = serde_json::to_value(SearchHit::from(doc("b", 3.0))).expect("serialize");
        assert!(bare.get("availability").is_none());
    }
}
