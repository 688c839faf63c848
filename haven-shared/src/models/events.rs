use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::hotel::HotelRecord;

/// Exchange hotel mutations are published to.
pub const HOTEL_EXCHANGE: &str = "hotel.events";
/// Durable queue the search service consumes.
pub const SEARCH_QUEUE: &str = "hotel.search.updates";
/// Binding for [`SEARCH_QUEUE`]; matches every hotel action.
pub const SEARCH_BINDING: &str = "hotel.*";

/// Highest payload version this build understands.
pub const SCHEMA_VERSION: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Created,
    Updated,
    Deleted,
}

impl ChangeAction {
    pub fn routing_key(&self) -> &'static str {
        match self {
            ChangeAction::Created => "hotel.created",
            ChangeAction::Updated => "hotel.updated",
            ChangeAction::Deleted => "hotel.deleted",
        }
    }
}

/// Immutable fact that a hotel record changed.
///
/// The snapshot is informational only; consumers re-read the canonical
/// record because delivery may duplicate or reorder events.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChangeEvent {
    pub schema_version: u16,
    pub event_id: Uuid,
    pub action: ChangeAction,
    pub hotel_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hotel: Option<HotelRecord>,
    pub emitted_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Invalid change event payload: {0}")]
    Invalid(#[from] serde_json::Error),
    #[error("Unsupported change event schema version {0}")]
    UnsupportedVersion(u16),
}

impl ChangeEvent {
    pub fn new(action: ChangeAction, hotel: &HotelRecord) -> Self {
        let snapshot = match action {
            ChangeAction::Deleted => None,
            _ => Some(hotel.clone()),
        };

        Self {
            schema_version: SCHEMA_VERSION,
            event_id: Uuid::new_v4(),
            action,
            hotel_id: hotel.id.clone(),
            hotel: snapshot,
            emitted_at: Utc::now(),
        }
    }

    pub fn routing_key(&self) -> &'static str {
        self.action.routing_key()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_slice(payload: &[u8]) -> Result<Self, DecodeError> {
        let event: ChangeEvent = serde_json::from_slice(payload)?;
        if event.schema_version > SCHEMA_VERSION {
            return Err(DecodeError::UnsupportedVersion(event.schema_version));
        }
        Ok(event)
    }
}
