use async_trait::async_trait;
use haven_bus::{run_consumer, ConsumerConfig, ConsumerStats, Delivery, HandlerError, MessageHandler, Subscription};
use haven_search::IndexSynchronizer;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::metrics::ApiMetrics;

/// Counts what the synchronizer made of each delivery.
struct MeteredSync {
    inner: Arc<IndexSynchronizer>,
    metrics: Arc<ApiMetrics>,
}

#[async_trait]
impl MessageHandler for MeteredSync {
    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        let result = self.inner.handle(delivery).await;
        let outcome = match &result {
            Ok(()) => "applied",
            Err(HandlerError::Transient(_)) => "transient",
            Err(HandlerError::Permanent(_)) => "permanent",
        };
        self.metrics.sync_events.with_label_values(&[outcome]).inc();
        result
    }
}

/// Starts the background task that folds change events into the index.
pub fn start_index_sync_worker(
    subscription: Box<dyn Subscription>,
    synchronizer: Arc<IndexSynchronizer>,
    metrics: Arc<ApiMetrics>,
    shutdown: watch::Receiver<bool>,
    config: ConsumerConfig,
) -> (JoinHandle<()>, Arc<ConsumerStats>) {
    let stats = Arc::new(ConsumerStats::default());
    metrics.track_consumer(stats.clone());
    let handler = Arc::new(MeteredSync {
        inner: synchronizer,
        metrics,
    });

    info!("Index sync worker starting");
    let handle = tokio::spawn(run_consumer(subscription, handler, shutdown, config, stats.clone()));
    (handle, stats)
}
