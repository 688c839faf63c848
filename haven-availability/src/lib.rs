//! Booking intervals and the "is this hotel free" decision built on them.

pub mod cache;
pub mod interval_store;
pub mod ledger;
pub mod provider;
pub mod resolver;

pub use cache::MemoryAvailabilityCache;
pub use interval_store::MemoryIntervalStore;
pub use ledger::BookingLedger;
pub use provider::SimulatedProvider;
pub use resolver::{AvailabilityResolver, ResolverConfig};
