use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{CoreError, CoreResult};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A validated half-open stay `[check_in, check_out)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StayDates {
    check_in: NaiveDate,
    check_out: NaiveDate,
}

impl StayDates {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> CoreResult<Self> {
        if check_out <= check_in {
            return Err(CoreError::ValidationError(format!(
                "check-out {} must be after check-in {}",
                check_out, check_in
            )));
        }
        Ok(Self { check_in, check_out })
    }

    /// Parse `YYYY-MM-DD` strings as sent by clients.
    pub fn parse(check_in: &str, check_out: &str) -> CoreResult<Self> {
        let parse = |raw: &str, field: &str| {
            NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|_| {
                CoreError::ValidationError(format!("{} must be a YYYY-MM-DD date, got '{}'", field, raw))
            })
        };
        Self::new(parse(check_in, "checkIn")?, parse(check_out, "checkOut")?)
    }

    pub fn check_in(&self) -> NaiveDate {
        self.check_in
    }

    pub fn check_out(&self) -> NaiveDate {
        self.check_out
    }

    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    pub fn overlaps(&self, other: &StayDates) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_and_inverted_ranges() {
        assert!(matches!(
            StayDates::parse("2024-06-05", "2024-06-05"),
            Err(CoreError::ValidationError(_))
        ));
        assert!(matches!(
            StayDates::parse("2024-06-05", "2024-06-01"),
            Err(CoreError::ValidationError(_))
        ));
        assert!(matches!(
            StayDates::parse("06/01/2024", "2024-06-05"),
            Err(CoreError::ValidationError(_))
        ));
    }

    #[test]
    fn test_overlap_is_half_open() {
        let first = StayDates::parse("2024-01-10", "2024-01-15").unwrap();
        let touching = StayDates::parse("2024-01-15", "2024-01-20").unwrap();
        let crossing = StayDates::parse("2024-01-14", "2024-01-20").unwrap();

        assert!(!first.overlaps(&touching));
        assert!(first.overlaps(&crossing));
        assert!(crossing.overlaps(&first));
        assert_eq!(first.nights(), 5);
    }
}
