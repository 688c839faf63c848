use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::{BusError, Delivery, Disposition, HandlerError, MessageHandler, Subscription};

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Pause after a transient handler failure before taking the next message.
    pub retry_backoff: Duration,
    /// Pause after a transport error from the subscription.
    pub error_backoff: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            retry_backoff: Duration::from_millis(200),
            error_backoff: Duration::from_secs(1),
        }
    }
}

/// Counters shared between a running consumer and whoever reports on it.
#[derive(Debug, Default)]
pub struct ConsumerStats {
    pub acked: AtomicU64,
    pub requeued: AtomicU64,
    pub dead_lettered: AtomicU64,
    pub transport_errors: AtomicU64,
}

impl ConsumerStats {
    pub fn acked(&self) -> u64 {
        self.acked.load(Ordering::Relaxed)
    }

    pub fn requeued(&self) -> u64 {
        self.requeued.load(Ordering::Relaxed)
    }

    pub fn dead_lettered(&self) -> u64 {
        self.dead_lettered.load(Ordering::Relaxed)
    }

    pub fn transport_errors(&self) -> u64 {
        self.transport_errors.load(Ordering::Relaxed)
    }
}

/// Drives `handler` over `subscription` until `shutdown` flips to true or
/// its sender is dropped.
///
/// A delivery is acked only when the handler succeeds. Transient failures
/// go back through the subscription's retry policy; permanent ones are
/// dead-lettered straight away.
pub async fn run_consumer(
    mut subscription: Box<dyn Subscription>,
    handler: Arc<dyn MessageHandler>,
    mut shutdown: watch::Receiver<bool>,
    config: ConsumerConfig,
    stats: Arc<ConsumerStats>,
) {
    info!("Consumer started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let next = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            next = subscription.next_delivery() => next,
        };

        let delivery = match next {
            Ok(delivery) => delivery,
            Err(e) => {
                error!(error = %e, "Failed to receive message");
                stats.transport_errors.fetch_add(1, Ordering::Relaxed);
                tokio::time::sleep(config.error_backoff).await;
                continue;
            }
        };

        debug!(
            message_id = %delivery.message_id,
            routing_key = %delivery.routing_key,
            attempt = delivery.attempt,
            "Processing message"
        );

        let verdict = match handler.handle(&delivery).await {
            Ok(()) => Verdict::Ack,
            Err(HandlerError::Transient(reason)) => Verdict::Retry(reason),
            Err(HandlerError::Permanent(reason)) => Verdict::Park(reason),
        };

        if !settle(subscription.as_mut(), &delivery, &verdict, &mut shutdown, &config, &stats).await {
            break;
        }
    }

    info!("Consumer stopped");
}

enum Verdict {
    Ack,
    Retry(String),
    Park(String),
}

/// Acks, rejects or dead-letters one delivery, retrying the settlement
/// itself while the transport fails. The next delivery is only pulled once
/// this returns, so offset-based backends never commit past an unsettled
/// message. Returns false when shutdown interrupted the retries.
async fn settle(
    subscription: &mut dyn Subscription,
    delivery: &Delivery,
    verdict: &Verdict,
    shutdown: &mut watch::Receiver<bool>,
    config: &ConsumerConfig,
    stats: &ConsumerStats,
) -> bool {
    let message_id = &delivery.message_id;
    loop {
        let result = match verdict {
            Verdict::Ack => subscription.ack(delivery).await.map(|()| {
                stats.acked.fetch_add(1, Ordering::Relaxed);
            }),
            Verdict::Retry(reason) => match subscription.reject(delivery.clone(), reason).await {
                Ok(Disposition::Requeued { next_attempt }) => {
                    warn!(%message_id, next_attempt, %reason, "Message requeued");
                    stats.requeued.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(config.retry_backoff).await;
                    Ok(())
                }
                Ok(Disposition::DeadLettered) => {
                    error!(%message_id, %reason, "Retries exhausted");
                    stats.dead_lettered.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }
                Err(e) => Err(e),
            },
            Verdict::Park(reason) => subscription.dead_letter(delivery.clone(), reason).await.map(|()| {
                error!(%message_id, %reason, "Unprocessable message dead-lettered");
                stats.dead_lettered.fetch_add(1, Ordering::Relaxed);
            }),
        };

        match result {
            Ok(()) => return true,
            Err(BusError::UnknownDelivery(tag)) => {
                warn!(%message_id, tag, "Delivery no longer held by this subscription");
                return true;
            }
            Err(e) => {
                error!(%message_id, error = %e, "Failed to settle message, retrying");
                stats.transport_errors.fetch_add(1, Ordering::Relaxed);
                tokio::select! {
                    _ = tokio::time::sleep(config.error_backoff) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            return false;
                        }
                    }
                }
            }
        }
    }
}
