use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical hotel record, owned by the catalog service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotelRecord {
    pub id: String,
    pub name: String,
    pub description: String,
    pub city: String,
    pub address: String,
    #[serde(default)]
    pub photos: Vec<String>,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub rating: f64,
    pub price_per_night: f64,
    #[serde(default)]
    pub provider_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Writable fields of a hotel, as accepted on create and update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HotelDraft {
    pub name: String,
    pub description: String,
    pub city: String,
    pub address: String,
    #[serde(default)]
    pub photos: Vec<String>,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub rating: f64,
    pub price_per_night: f64,
}

impl HotelRecord {
    pub fn from_draft(id: String, provider_id: String, draft: HotelDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: draft.name,
            description: draft.description,
            city: draft.city,
            address: draft.address,
            photos: draft.photos,
            thumbnail: draft.thumbnail,
            amenities: draft.amenities,
            rating: draft.rating,
            price_per_night: draft.price_per_night,
            provider_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite the writable fields, keeping identity and creation time.
    pub fn apply(&mut self, draft: HotelDraft, now: DateTime<Utc>) {
        self.name = draft.name;
        self.description = draft.description;
        self.city = draft.city;
        self.address = draft.address;
        self.photos = draft.photos;
        self.thumbnail = draft.thumbnail;
        self.amenities = draft.amenities;
        self.rating = draft.rating;
        self.price_per_night = draft.price_per_night;
        self.updated_at = now;
    }
}

/// Search-index projection of a [`HotelRecord`].
///
/// Carries no availability information; the per-query flag lives on the
/// search response only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub id: String,
    pub name: String,
    pub description: String,
    pub city: String,
    pub address: String,
    #[serde(default)]
    pub photos: Vec<String>,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub rating: f64,
    pub price_per_night: f64,
    #[serde(default)]
    pub provider_id: String,
}

impl From<&HotelRecord> for IndexDocument {
    fn from(record: &HotelRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            description: record.description.clone(),
            city: record.city.clone(),
            address: record.address.clone(),
            photos: record.photos.clone(),
            thumbnail: record.thumbnail.clone(),
            amenities: record.amenities.clone(),
            rating: record.rating,
            price_per_night: record.price_per_night,
            provider_id: record.provider_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str) -> HotelDraft {
        HotelDraft {
            name: name.to_string(),
            description: "Sea view".to_string(),
            city: "Lisbon".to_string(),
            address: "Rua Augusta 1".to_string(),
            amenities: vec!["wifi".to_string()],
            rating: 4.5,
            price_per_night: 120.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_apply_keeps_identity_and_creation_time() {
        let created = Utc::now();
        let mut record = HotelRecord::from_draft("h1".into(), "PRV1".into(), draft("Old"), created);

        let later = created + chrono::Duration::seconds(30);
        record.apply(draft("New"), later);

        assert_eq!(record.id, "h1");
        assert_eq!(record.provider_id, "PRV1");
        assert_eq!(record.name, "New");
        assert_eq!(record.created_at, created);
        assert_eq!(record.updated_at, later);
    }

    #[test]
    fn test_index_projection_drops_timestamps() {
        let record = HotelRecord::from_draft("h1".into(), "PRV1".into(), draft("Azul"), Utc::now());
        let doc = IndexDocument::from(&record);
        let json = serde_json::to_value(&doc).unwrap();

        assert_eq!(json["name"], "Azul");
        assert!(json.get("created_at").is_none());
        assert!(json.get("availability").is_none());
    }
}
