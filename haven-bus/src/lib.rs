//! Topic-routed, at-least-once delivery of change events.
//!
//! Publishers address a routing key (`hotel.updated`); subscribers bind a
//! durable queue to a wildcard pattern (`hotel.*`) so new consumers can be
//! added without touching publishers. A delivery is acknowledged only after
//! its effect is applied. Failed deliveries are requeued until the
//! [`RetryPolicy`] gives up, then moved to the queue's dead letters.

pub mod consumer;
pub mod exchange;
pub mod routing;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use consumer::{run_consumer, ConsumerConfig, ConsumerStats};
pub use exchange::{DeadLetter, DurableQueue, QueueSubscription, TopicExchange};
pub use routing::RoutingPattern;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BusError {
    #[error("Invalid routing pattern '{0}'")]
    InvalidPattern(String),
    #[error("Invalid routing key '{0}'")]
    InvalidRoutingKey(String),
    #[error("Unknown queue '{0}'")]
    UnknownQueue(String),
    #[error("Unknown delivery tag {0}")]
    UnknownDelivery(u64),
    #[error("Publish failed for '{routing_key}': {reason}")]
    PublishFailed { routing_key: String, reason: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Subscription closed")]
    Closed,
}

/// Outcome reported by a message handler.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HandlerError {
    /// The effect could not be applied now; deliver again later.
    #[error("transient failure: {0}")]
    Transient(String),
    /// The message can never be applied; park it for inspection.
    #[error("permanent failure: {0}")]
    Permanent(String),
}

/// One message handed to a consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Subscription-local handle used to ack or reject.
    pub tag: u64,
    pub message_id: String,
    pub routing_key: String,
    /// Partitioning key chosen by the publisher (the hotel id).
    pub key: String,
    pub payload: Vec<u8>,
    /// 1 on first delivery.
    pub attempt: u32,
    pub published_at: DateTime<Utc>,
}

/// Where a rejected delivery went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Requeued { next_attempt: u32 },
    DeadLettered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn after_failure(&self, attempt: u32) -> Disposition {
        if attempt >= self.max_attempts {
            Disposition::DeadLettered
        } else {
            Disposition::Requeued {
                next_attempt: attempt + 1,
            }
        }
    }
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, routing_key: &str, key: &str, payload: Vec<u8>) -> Result<(), BusError>;
}

/// Consumer side of a bound queue.
#[async_trait]
pub trait Subscription: Send {
    /// Waits for the next delivery.
    async fn next_delivery(&mut self) -> Result<Delivery, BusError>;

    async fn ack(&mut self, delivery: &Delivery) -> Result<(), BusError>;

    /// Returns the delivery for another attempt, or dead-letters it once
    /// the retry budget is spent.
    async fn reject(&mut self, delivery: Delivery, reason: &str) -> Result<Disposition, BusError>;

    /// Parks the delivery without further attempts.
    async fn dead_letter(&mut self, delivery: Delivery, reason: &str) -> Result<(), BusError>;
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_caps_attempts() {
        let policy = RetryPolicy::new(3);
        assert_eq!(policy.after_failure(1), Disposition::Requeued { next_attempt: 2 });
        assert_eq!(policy.after_failure(2), Disposition::Requeued { next_attempt: 3 });
        assert_eq!(policy.after_failure(3), Disposition::DeadLettered);

        let single = RetryPolicy::new(0);
        assert_eq!(single.max_attempts, 1);
        assert_eq!(single.after_failure(1), Disposition::DeadLettered);
    }
}
