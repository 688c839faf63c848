use async_trait::async_trait;
use haven_bus::{Delivery, HandlerError, MessageHandler};
use haven_core::repository::{RecordSource, SearchIndex};
use haven_core::{CoreError, CoreResult};
use haven_shared::{ChangeAction, ChangeEvent, IndexDocument};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What applying one event did to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Indexed,
    Removed { existed: bool },
}

/// Folds hotel change events into the search index.
///
/// Events are treated as hints: creates and updates re-read the current
/// record and overwrite the document, so duplicates and stale replays
/// converge on the catalog's present state.
pub struct IndexSynchronizer {
    source: Arc<dyn RecordSource>,
    index: Arc<dyn SearchIndex>,
}

impl IndexSynchronizer {
    pub fn new(source: Arc<dyn RecordSource>, index: Arc<dyn SearchIndex>) -> Self {
        Self { source, index }
    }

    pub async fn on_event(&self, event: &ChangeEvent) -> CoreResult<SyncOutcome> {
        if event.hotel_id.trim().is_empty() {
            return Err(CoreError::Malformed(format!("event {} has no hotel id", event.event_id)));
        }

        match event.action {
            ChangeAction::Deleted => self.remove(&event.hotel_id).await,
            ChangeAction::Created | ChangeAction::Updated => {
                match self.source.fetch_record(&event.hotel_id).await {
                    Ok(Some(record)) => {
                        self.index.upsert(IndexDocument::from(&record)).await?;
                        debug!(hotel_id = %record.id, "Index document upserted");
                        Ok(SyncOutcome::Indexed)
                    }
                    Ok(None) | Err(CoreError::NotFound(_)) => {
                        info!(hotel_id = %event.hotel_id, "Record gone since the event fired, removing from index");
                        self.remove(&event.hotel_id).await
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    async fn remove(&self, hotel_id: &str) -> CoreResult<SyncOutcome> {
        let existed = self.index.remove(hotel_id).await?;
        debug!(hotel_id, existed, "Index document removed");
        Ok(SyncOutcome::Removed { existed })
    }
}

#[async_trait]
impl MessageHandler for IndexSynchronizer {
    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        let event = ChangeEvent::from_slice(&delivery.payload).map_err(|e| {
            warn!(message_id = %delivery.message_id, error = %e, "Undecodable change event");
            HandlerError::Permanent(e.to_string())
        })?;

        match self.on_event(&event).await {
            Ok(outcome) => {
                info!(
                    hotel_id = %event.hotel_id,
                    action = ?event.action,
                    outcome = ?outcome,
                    attempt = delivery.attempt,
                    "Change event applied"
                );
                Ok(())
            }
            Err(e) if e.is_transient() => Err(HandlerError::Transient(e.to_string())),
            Err(e) => Err(HandlerError::Permanent(e.to_string())),
        }
    }
}
