use haven_bus::ConsumerStats;
use parking_lot::Mutex;
use prometheus::{IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Process metrics, exported on `/metrics`.
///
/// Owns its registry so several app instances (tests) can coexist.
pub struct ApiMetrics {
    registry: Registry,
    pub searches: IntCounter,
    pub degraded_flags: IntCounter,
    pub bookings: IntCounterVec,
    pub sync_events: IntCounterVec,
    pub dead_letters: IntCounter,
    pub requeues: IntCounter,
    consumers: Mutex<Vec<Arc<ConsumerStats>>>,
}

impl ApiMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("haven".to_string()), None)?;

        let searches = IntCounter::new("searches_total", "Search requests served")?;
        let degraded_flags = IntCounter::new(
            "availability_degraded_total",
            "Search hits whose availability defaulted to unavailable",
        )?;
        let bookings = IntCounterVec::new(
            Opts::new("bookings_total", "Booking attempts by result"),
            &["result"],
        )?;
        let sync_events = IntCounterVec::new(
            Opts::new("sync_events_total", "Change events handled by the index synchronizer"),
            &["outcome"],
        )?;

        let dead_letters = IntCounter::new(
            "dead_letters_total",
            "Change events parked after a permanent failure or exhausted retries",
        )?;
        let requeues = IntCounter::new("sync_requeues_total", "Change events requeued for another attempt")?;

        registry.register(Box::new(searches.clone()))?;
        registry.register(Box::new(degraded_flags.clone()))?;
        registry.register(Box::new(bookings.clone()))?;
        registry.register(Box::new(sync_events.clone()))?;
        registry.register(Box::new(dead_letters.clone()))?;
        registry.register(Box::new(requeues.clone()))?;

        Ok(Self {
            registry,
            searches,
            degraded_flags,
            bookings,
            sync_events,
            dead_letters,
            requeues,
            consumers: Mutex::new(Vec::new()),
        })
    }

    /// Reports the consumer's settlement counters on every render.
    pub fn track_consumer(&self, stats: Arc<ConsumerStats>) {
        self.consumers.lock().push(stats);
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        self.catch_up_consumers();
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }

    fn catch_up_consumers(&self) {
        let consumers = self.consumers.lock();
        let dead: u64 = consumers.iter().map(|s| s.dead_lettered()).sum();
        let requeued: u64 = consumers.iter().map(|s| s.requeued()).sum();
        catch_up(&self.dead_letters, dead);
        catch_up(&self.requeues, requeued);
    }
}

fn catch_up(counter: &IntCounter, observed: u64) {
    let current = counter.get();
    if observed > current {
        counter.inc_by(observed - current);
    }
}
