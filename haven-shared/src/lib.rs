pub mod models;

pub use models::booking::{BookingInterval, BookingRequest, BookingStatus};
pub use models::events::{
    ChangeAction, ChangeEvent, DecodeError, HOTEL_EXCHANGE, SCHEMA_VERSION, SEARCH_BINDING, SEARCH_QUEUE,
};
pub use models::hotel::{HotelDraft, HotelRecord, IndexDocument};
