//! Search side of the platform: the index, the query engine with its
//! availability fan-out, and the synchronizer that keeps the index in
//! step with the hotel catalog.

pub mod engine;
pub mod fanout;
pub mod index;
pub mod sync;

pub use engine::{SearchConfig, SearchEngine};
pub use fanout::{enrich_availability, FanoutConfig};
pub use index::MemorySearchIndex;
pub use sync::{IndexSynchronizer, SyncOutcome};
