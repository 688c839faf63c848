use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Booking lifecycle state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Rejected,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 4] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::Cancelled,
        BookingStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "cancelled" => Some(BookingStatus::Cancelled),
            "rejected" => Some(BookingStatus::Rejected),
            _ => None,
        }
    }

    /// Only live bookings hold the room.
    pub fn occupies(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    /// Cancelled and rejected are terminal; re-activating them could
    /// resurrect an interval that now overlaps a newer booking.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        match (self, next) {
            (a, b) if *a == b => true,
            (Pending, Confirmed) | (Pending, Cancelled) | (Pending, Rejected) => true,
            (Confirmed, Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stay held against a hotel. Never physically deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingInterval {
    pub id: Uuid,
    pub hotel_id: String,
    pub user_id: Option<String>,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: u32,
    pub total_price: f64,
    pub status: BookingStatus,
    /// Reference issued by the booking provider that accepted the stay.
    #[serde(default)]
    pub provider_booking_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookingInterval {
    pub fn new(request: &BookingRequest, status: BookingStatus) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            hotel_id: request.hotel_id.clone(),
            user_id: request.user_id.clone(),
            check_in: request.check_in,
            check_out: request.check_out,
            guests: request.guests,
            total_price: request.total_price,
            status,
            provider_booking_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Half-open overlap: [a,b) and [c,d) overlap iff a < d and c < b.
    pub fn overlaps(&self, check_in: NaiveDate, check_out: NaiveDate) -> bool {
        self.check_in < check_out && check_in < self.check_out
    }

    pub fn update_status(&mut self, status: BookingStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub hotel_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: u32,
    #[serde(default)]
    pub total_price: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn interval(check_in: &str, check_out: &str) -> BookingInterval {
        BookingInterval::new(
            &BookingRequest {
                hotel_id: "h1".to_string(),
                user_id: None,
                check_in: date(check_in),
                check_out: date(check_out),
                guests: 2,
                total_price: 300.0,
            },
            BookingStatus::Confirmed,
        )
    }

    #[test]
    fn test_half_open_overlap() {
        let booked = interval("2024-01-10", "2024-01-15");

        assert!(booked.overlaps(date("2024-01-14"), date("2024-01-20")));
        assert!(!booked.overlaps(date("2024-01-15"), date("2024-01-20")));
        assert!(!booked.overlaps(date("2024-01-05"), date("2024-01-10")));
        assert!(booked.overlaps(date("2024-01-11"), date("2024-01-12")));
    }

    #[test]
    fn test_status_transitions() {
        use BookingStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Confirmed));
        assert!(!Cancelled.can_transition_to(Confirmed));
        assert!(!Rejected.can_transition_to(Pending));
        assert!(!Confirmed.can_transition_to(Pending));
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&BookingStatus::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
        assert_eq!(BookingStatus::parse("pending"), Some(BookingStatus::Pending));
        assert_eq!(BookingStatus::parse("PENDING"), None);
        assert!(!BookingStatus::Rejected.occupies());
    }
}
