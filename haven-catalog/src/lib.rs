pub mod repository;
pub mod service;

pub use repository::MemoryHotelRepository;
pub use service::{HotelCatalog, LocalRecordSource};
