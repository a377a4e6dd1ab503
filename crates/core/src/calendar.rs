//! Business calendar: maps an instant to the business date it falls on.
//!
//! Loan validation ("the expected-return date cannot be in the past") and the
//! overdue sweep both compare calendar dates, not instants. The date must be
//! taken in the organisation's local offset, otherwise a loan registered in
//! the evening would be judged against tomorrow's date.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};

use crate::error::{DomainError, DomainResult};

/// Offset used when none is configured (America/Sao_Paulo, no DST).
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = -180;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BusinessCalendar {
    offset: FixedOffset,
}

impl BusinessCalendar {
    /// Build a calendar for a fixed offset from UTC, in minutes (east positive).
    pub fn from_offset_minutes(minutes: i32) -> DomainResult<Self> {
        let offset = minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| DomainError::validation(format!("invalid UTC offset: {minutes} minutes")))?;
        Ok(Self { offset })
    }

    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// The business date on which `now` falls.
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }
}

impl Default for BusinessCalendar {
    fn default() -> Self {
        Self::from_offset_minutes(DEFAULT_UTC_OFFSET_MINUTES)
            .expect("default offset is within range")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn evening_in_sao_paulo_is_still_the_same_day() {
        let calendar = BusinessCalendar::default();
        // 01:30 UTC on the 19th is 22:30 on the 18th in UTC-3.
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 1, 30, 0).unwrap();
        assert_eq!(calendar.today(now), NaiveDate::from_ymd_opt(2026, 10, 18).unwrap());
        assert_eq!(
            BusinessCalendar::utc().today(now),
            NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
        );
    }

    #[test]
    fn rejects_offsets_beyond_a_day() {
        let err = BusinessCalendar::from_offset_minutes(24 * 60).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    proptest! {
        /// Property: the business date never drifts more than one day from the UTC date.
        #[test]
        fn business_date_is_within_a_day_of_utc(
            secs in 0i64..4_102_444_800i64,
            minutes in -720i32..=840i32,
        ) {
            let calendar = BusinessCalendar::from_offset_minutes(minutes).unwrap();
            let now = Utc.timestamp_opt(secs, 0).unwrap();
            let drift = (calendar.today(now) - now.date_naive()).num_days();
            prop_assert!((-1..=1).contains(&drift));
        }
    }
}
