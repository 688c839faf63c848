//! Kafka rendition of the change bus.
//!
//! Routing keys are topic names. A queue is a consumer group whose
//! subscription is the regex form of its binding pattern. Retries are
//! republished to the source topic with a bumped `x-attempt` header and
//! exhausted or poison messages go to `<queue>.dlq`. Offsets are committed
//! only after the message is acked, retried or dead-lettered. A settlement
//! that fails leaves the delivery in flight and uncommitted; `run_consumer`
//! retries it before receiving anything newer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use haven_bus::{BusError, Delivery, Disposition, Publisher, RetryPolicy, RoutingPattern, Subscription};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const ATTEMPT_HEADER: &str = "x-attempt";
const MESSAGE_ID_HEADER: &str = "x-message-id";
const REASON_HEADER: &str = "x-dead-letter-reason";

fn producer(brokers: &str) -> Result<FutureProducer, BusError> {
    ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("message.timeout.ms", "5000")
        .create()
        .map_err(|e| BusError::Transport(e.to_string()))
}

async fn send(
    producer: &FutureProducer,
    topic: &str,
    key: &str,
    payload: &[u8],
    headers: OwnedHeaders,
    timeout: Duration,
) -> Result<(), BusError> {
    let record = FutureRecord::to(topic).key(key).payload(payload).headers(headers);
    match producer.send(record, Timeout::After(timeout)).await {
        Ok(_) => {
            debug!(topic, key, "Message sent");
            Ok(())
        }
        Err((e, _msg)) => {
            error!(topic, error = %e, "Failed to send message");
            Err(BusError::PublishFailed {
                routing_key: topic.to_string(),
                reason: e.to_string(),
            })
        }
    }
}

fn headers(message_id: &str, attempt: u32) -> OwnedHeaders {
    let attempt = attempt.to_string();
    OwnedHeaders::new()
        .insert(Header {
            key: MESSAGE_ID_HEADER,
            value: Some(message_id),
        })
        .insert(Header {
            key: ATTEMPT_HEADER,
            value: Some(attempt.as_str()),
        })
}

#[derive(Clone)]
pub struct KafkaPublisher {
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaPublisher {
    pub fn new(brokers: &str) -> Result<Self, BusError> {
        Ok(Self {
            producer: producer(brokers)?,
            timeout: Duration::from_secs(5),
        })
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn publish(&self, routing_key: &str, key: &str, payload: Vec<u8>) -> Result<(), BusError> {
        haven_bus::routing::validate_routing_key(routing_key)?;
        let message_id = Uuid::new_v4().to_string();
        send(
            &self.producer,
            routing_key,
            key,
            &payload,
            headers(&message_id, 1),
            self.timeout,
        )
        .await
    }
}

/// Where an in-flight delivery came from, for committing and republishing.
/// Kept until the delivery is settled so a failed settlement can be retried.
#[derive(Clone)]
struct InFlight {
    topic: String,
    partition: i32,
    offset: i64,
}

pub struct KafkaSubscription {
    consumer: StreamConsumer,
    producer: FutureProducer,
    queue: String,
    policy: RetryPolicy,
    timeout: Duration,
    next_tag: u64,
    in_flight: HashMap<u64, InFlight>,
}

impl KafkaSubscription {
    /// Joins consumer group `queue`, subscribed to every topic `pattern` matches.
    pub fn new(brokers: &str, queue: &str, pattern: &str, policy: RetryPolicy) -> Result<Self, BusError> {
        let pattern = RoutingPattern::parse(pattern)?;
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", queue)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("topic.metadata.refresh.interval.ms", "10000")
            .create()
            .map_err(|e| BusError::Transport(e.to_string()))?;

        let regex = pattern.to_regex();
        consumer
            .subscribe(&[regex.as_str()])
            .map_err(|e| BusError::Transport(e.to_string()))?;
        info!(queue, pattern = pattern.as_str(), "Kafka subscription created");

        Ok(Self {
            consumer,
            producer: producer(brokers)?,
            queue: queue.to_string(),
            policy,
            timeout: Duration::from_secs(5),
            next_tag: 1,
            in_flight: HashMap::new(),
        })
    }

    fn dead_letter_topic(&self) -> String {
        format!("{}.dlq", self.queue)
    }

    fn origin(&self, delivery: &Delivery) -> Result<InFlight, BusError> {
        self.in_flight
            .get(&delivery.tag)
            .cloned()
            .ok_or(BusError::UnknownDelivery(delivery.tag))
    }

    /// Commits past the delivery and forgets it. On error the delivery stays
    /// in flight.
    fn settle(&mut self, delivery: &Delivery, origin: &InFlight) -> Result<(), BusError> {
        self.commit(origin)?;
        self.in_flight.remove(&delivery.tag);
        Ok(())
    }

    fn commit(&self, origin: &InFlight) -> Result<(), BusError> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&origin.topic, origin.partition, Offset::Offset(origin.offset + 1))
            .map_err(|e| BusError::Transport(e.to_string()))?;
        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| BusError::Transport(e.to_string()))
    }

    async fn park(&mut self, delivery: &Delivery, origin: &InFlight, reason: &str) -> Result<(), BusError> {
        let headers = headers(&delivery.message_id, delivery.attempt).insert(Header {
            key: REASON_HEADER,
            value: Some(reason),
        });
        send(
            &self.producer,
            &self.dead_letter_topic(),
            &delivery.key,
            &delivery.payload,
            headers,
            self.timeout,
        )
        .await?;
        warn!(
            queue = %self.queue,
            message_id = %delivery.message_id,
            attempts = delivery.attempt,
            reason,
            "Message dead-lettered"
        );
        self.settle(delivery, origin)
    }
}

fn header_value<'a>(message: &'a impl Message, name: &str) -> Option<&'a str> {
    let headers = message.headers()?;
    headers
        .iter()
        .find(|h| h.key == name)
        .and_then(|h| h.value)
        .and_then(|v| std::str::from_utf8(v).ok())
}

#[async_trait]
impl Subscription for KafkaSubscription {
    async fn next_delivery(&mut self) -> Result<Delivery, BusError> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;

        let tag = self.next_tag;
        self.next_tag += 1;

        let topic = message.topic().to_string();
        let partition = message.partition();
        let offset = message.offset();
        let delivery = Delivery {
            tag,
            message_id: header_value(&message, MESSAGE_ID_HEADER)
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}/{}/{}", topic, partition, offset)),
            routing_key: topic.clone(),
            key: message
                .key()
                .and_then(|k| std::str::from_utf8(k).ok())
                .unwrap_or_default()
                .to_string(),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            attempt: header_value(&message, ATTEMPT_HEADER)
                .and_then(|a| a.parse().ok())
                .unwrap_or(1),
            published_at: message
                .timestamp()
                .to_millis()
                .and_then(DateTime::<Utc>::from_timestamp_millis)
                .unwrap_or_else(Utc::now),
        };
        drop(message);

        self.in_flight.insert(tag, InFlight { topic, partition, offset });
        Ok(delivery)
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<(), BusError> {
        let origin = self.origin(delivery)?;
        self.settle(delivery, &origin)
    }

    async fn reject(&mut self, delivery: Delivery, reason: &str) -> Result<Disposition, BusError> {
        let origin = self.origin(&delivery)?;
        let disposition = self.policy.after_failure(delivery.attempt);
        match disposition {
            Disposition::Requeued { next_attempt } => {
                send(
                    &self.producer,
                    &origin.topic,
                    &delivery.key,
                    &delivery.payload,
                    headers(&delivery.message_id, next_attempt),
                    self.timeout,
                )
                .await?;
                debug!(message_id = %delivery.message_id, next_attempt, reason, "Message republished for retry");
                self.settle(&delivery, &origin)?;
            }
            Disposition::DeadLettered => self.park(&delivery, &origin, reason).await?,
        }
        Ok(disposition)
    }

    async fn dead_letter(&mut self, delivery: Delivery, reason: &str) -> Result<(), BusError> {
        let origin = self.origin(&delivery)?;
        self.park(&delivery, &origin, reason).await
    }
}
