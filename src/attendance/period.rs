use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::error::AttendanceError;

/// Inclusive calendar-date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DateRange {
    #[schema(example = "2026-01-05", value_type = String, format = "date")]
    pub start: NaiveDate,
    #[schema(example = "2026-01-11", value_type = String, format = "date")]
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, AttendanceError> {
        if start > end {
            return Err(AttendanceError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of calendar days covered, both ends included.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn ensure_within(self, max_days: i64) -> Result<Self, AttendanceError> {
        let days = self.days();
        if days > max_days {
            return Err(AttendanceError::RangeTooLong { days, max_days });
        }
        Ok(self)
    }
}

/// Reporting presets used by dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Day,
    Week,
    Month,
    Year,
}

impl Period {
    /// The period of this kind that contains `date`. Weeks start on Monday.
    pub fn range_containing(self, date: NaiveDate) -> DateRange {
        match self {
            Period::Day => DateRange::day(date),
            Period::Week => {
                let start = date - Duration::days(date.weekday().num_days_from_monday() as i64);
                DateRange {
                    start,
                    end: start + Duration::days(6),
                }
            }
            Period::Month => {
                let start = date.with_day(1).unwrap_or(date);
                let next = if date.month() == 12 {
                    NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
                };
                let end = next.and_then(|d| d.pred_opt()).unwrap_or(date);
                DateRange { start, end }
            }
            Period::Year => {
                let start = NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date);
                let end = NaiveDate::from_ymd_opt(date.year(), 12, 31).unwrap_or(date);
                DateRange { start, end }
            }
        }
    }
}
