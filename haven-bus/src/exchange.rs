use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::routing::{validate_routing_key, RoutingPattern};
use crate::{BusError, Delivery, Disposition, Publisher, RetryPolicy, Subscription};

#[derive(Debug, Clone)]
struct Envelope {
    message_id: String,
    routing_key: String,
    key: String,
    payload: Vec<u8>,
    attempt: u32,
    published_at: DateTime<Utc>,
}

/// A message that exhausted its retries or could not be decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub message_id: String,
    pub routing_key: String,
    pub key: String,
    pub payload: Vec<u8>,
    pub attempts: u32,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}

/// Named queue with ready, in-flight and dead-letter partitions.
pub struct DurableQueue {
    name: String,
    policy: RetryPolicy,
    ready: Mutex<VecDeque<Envelope>>,
    unacked: Mutex<HashMap<u64, Envelope>>,
    dead: Mutex<Vec<DeadLetter>>,
    next_tag: AtomicU64,
    notify: Notify,
}

impl DurableQueue {
    fn new(name: &str, policy: RetryPolicy) -> Self {
        Self {
            name: name.to_string(),
            policy,
            ready: Mutex::new(VecDeque::new()),
            unacked: Mutex::new(HashMap::new()),
            dead: Mutex::new(Vec::new()),
            next_tag: AtomicU64::new(1),
            notify: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Messages waiting to be delivered.
    pub fn depth(&self) -> usize {
        self.ready.lock().len()
    }

    /// Messages delivered but neither acked nor rejected.
    pub fn in_flight(&self) -> usize {
        self.unacked.lock().len()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead.lock().clone()
    }

    fn enqueue(&self, envelope: Envelope) {
        self.ready.lock().push_back(envelope);
        self.notify.notify_one();
    }

    async fn receive(&self) -> Delivery {
        loop {
            let notified = self.notify.notified();

            let next = self.ready.lock().pop_front();
            if let Some(envelope) = next {
                let tag = self.next_tag.fetch_add(1, Ordering::Relaxed);
                let delivery = Delivery {
                    tag,
                    message_id: envelope.message_id.clone(),
                    routing_key: envelope.routing_key.clone(),
                    key: envelope.key.clone(),
                    payload: envelope.payload.clone(),
                    attempt: envelope.attempt,
                    published_at: envelope.published_at,
                };
                self.unacked.lock().insert(tag, envelope);
                return delivery;
            }

            notified.await;
        }
    }

    fn take_unacked(&self, tag: u64) -> Result<Envelope, BusError> {
        self.unacked
            .lock()
            .remove(&tag)
            .ok_or(BusError::UnknownDelivery(tag))
    }

    fn park(&self, envelope: Envelope, reason: &str) {
        warn!(
            queue = %self.name,
            message_id = %envelope.message_id,
            routing_key = %envelope.routing_key,
            attempts = envelope.attempt,
            reason,
            "Message dead-lettered"
        );
        self.dead.lock().push(DeadLetter {
            message_id: envelope.message_id,
            routing_key: envelope.routing_key,
            key: envelope.key,
            payload: envelope.payload,
            attempts: envelope.attempt,
            reason: reason.to_string(),
            dead_lettered_at: Utc::now(),
        });
    }

    /// Returns an in-flight delivery to the head of the queue unchanged,
    /// as a broker does when a consumer goes away.
    fn restore(&self, tag: u64) {
        let envelope = self.unacked.lock().remove(&tag);
        if let Some(envelope) = envelope {
            self.ready.lock().push_front(envelope);
            self.notify.notify_one();
        }
    }
}

/// In-process topic exchange.
///
/// Queues live for the lifetime of the exchange; durability across
/// restarts is the job of a broker-backed bus.
pub struct TopicExchange {
    name: String,
    policy: RetryPolicy,
    queues: RwLock<HashMap<String, Arc<DurableQueue>>>,
    bindings: RwLock<Vec<(RoutingPattern, String)>>,
}

impl TopicExchange {
    pub fn new(name: &str, policy: RetryPolicy) -> Self {
        Self {
            name: name.to_string(),
            policy,
            queues: RwLock::new(HashMap::new()),
            bindings: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Idempotent: declaring an existing queue returns it.
    pub fn declare_queue(&self, name: &str) -> Arc<DurableQueue> {
        self.queues
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(DurableQueue::new(name, self.policy)))
            .clone()
    }

    pub fn queue(&self, name: &str) -> Option<Arc<DurableQueue>> {
        self.queues.read().get(name).cloned()
    }

    pub fn bind(&self, queue: &str, pattern: &str) -> Result<(), BusError> {
        if !self.queues.read().contains_key(queue) {
            return Err(BusError::UnknownQueue(queue.to_string()));
        }
        let pattern = RoutingPattern::parse(pattern)?;

        let mut bindings = self.bindings.write();
        let exists = bindings
            .iter()
            .any(|(p, q)| p == &pattern && q == queue);
        if !exists {
            debug!(exchange = %self.name, queue, pattern = pattern.as_str(), "Queue bound");
            bindings.push((pattern, queue.to_string()));
        }
        Ok(())
    }

    pub fn subscribe(&self, queue: &str) -> Result<QueueSubscription, BusError> {
        let queue = self
            .queue(queue)
            .ok_or_else(|| BusError::UnknownQueue(queue.to_string()))?;
        Ok(QueueSubscription {
            queue,
            outstanding: HashSet::new(),
        })
    }

    fn route(&self, routing_key: &str) -> Vec<Arc<DurableQueue>> {
        let bindings = self.bindings.read();
        let queues = self.queues.read();

        let mut seen = HashSet::new();
        bindings
            .iter()
            .filter(|(pattern, _)| pattern.matches(routing_key))
            .filter(|(_, queue)| seen.insert(queue.clone()))
            .filter_map(|(_, queue)| queues.get(queue).cloned())
            .collect()
    }
}

#[async_trait]
impl Publisher for TopicExchange {
    async fn publish(&self, routing_key: &str, key: &str, payload: Vec<u8>) -> Result<(), BusError> {
        validate_routing_key(routing_key)?;

        let targets = self.route(routing_key);
        if targets.is_empty() {
            debug!(exchange = %self.name, routing_key, "No queue bound for routing key; message dropped");
            return Ok(());
        }

        let envelope = Envelope {
            message_id: Uuid::new_v4().to_string(),
            routing_key: routing_key.to_string(),
            key: key.to_string(),
            payload,
            attempt: 1,
            published_at: Utc::now(),
        };
        for queue in targets {
            queue.enqueue(envelope.clone());
        }
        Ok(())
    }
}

/// A consumer attached to one [`DurableQueue`].
///
/// Dropping the subscription hands its unacknowledged deliveries back to
/// the queue.
pub struct QueueSubscription {
    queue: Arc<DurableQueue>,
    outstanding: HashSet<u64>,
}

impl QueueSubscription {
    pub fn queue(&self) -> &Arc<DurableQueue> {
        &self.queue
    }
}

#[async_trait]
impl Subscription for QueueSubscription {
    async fn next_delivery(&mut self) -> Result<Delivery, BusError> {
        let delivery = self.queue.receive().await;
        self.outstanding.insert(delivery.tag);
        Ok(delivery)
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<(), BusError> {
        self.queue.take_unacked(delivery.tag)?;
        self.outstanding.remove(&delivery.tag);
        Ok(())
    }

    async fn reject(&mut self, delivery: Delivery, reason: &str) -> Result<Disposition, BusError> {
        let mut envelope = self.queue.take_unacked(delivery.tag)?;
        self.outstanding.remove(&delivery.tag);

        let disposition = self.queue.policy.after_failure(envelope.attempt);
        match disposition {
            Disposition::Requeued { next_attempt } => {
                envelope.attempt = next_attempt;
                self.queue.enqueue(envelope);
            }
            Disposition::DeadLettered => self.queue.park(envelope, reason),
        }
        Ok(disposition)
    }

    async fn dead_letter(&mut self, delivery: Delivery, reason: &str) -> Result<(), BusError> {
        let envelope = self.queue.take_unacked(delivery.tag)?;
        self.outstanding.remove(&delivery.tag);
        self.queue.park(envelope, reason);
        Ok(())
    }
}

impl Drop for QueueSubscription {
    fn drop(&mut self) {
        for tag in self.outstanding.drain() {
            self.queue.restore(tag);
        }
    }
}
