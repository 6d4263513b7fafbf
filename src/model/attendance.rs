use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{EnumIter, EnumString};
use utoipa::ToSchema;

use crate::attendance::error::AttendanceError;

#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    EnumString,
    EnumIter,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
    Leave,
    Holiday,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Late => "late",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Leave => "leave",
            AttendanceStatus::Holiday => "holiday",
        }
    }

    /// Statuses that count as a worked day.
    pub fn is_attended(self) -> bool {
        matches!(self, AttendanceStatus::Present | AttendanceStatus::Late)
    }

    /// Statuses set out-of-band; check-in never overwrites them.
    pub fn is_administrative(self) -> bool {
        matches!(self, AttendanceStatus::Leave | AttendanceStatus::Holiday)
    }
}

/// One attendance record per employee per calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "employee_id": 1000,
    "date": "2026-01-05",
    "check_in": "2026-01-05T08:55:00Z",
    "check_out": "2026-01-05T17:30:00Z",
    "status": "present",
    "work_hours": 8.58,
    "notes": null,
    "location": "HQ"
}))]
pub struct AttendanceRecord {
    #[schema(example = 1000)]
    pub employee_id: u64,

    #[schema(example = "2026-01-05", value_type = String, format = "date")]
    pub date: NaiveDate,

    #[schema(example = "2026-01-05T08:55:00Z", value_type = Option<String>, format = "date-time")]
    pub check_in: Option<DateTime<Utc>>,

    #[schema(example = "2026-01-05T17:30:00Z", value_type = Option<String>, format = "date-time")]
    pub check_out: Option<DateTime<Utc>>,

    pub status: AttendanceStatus,

    #[schema(example = 8.58)]
    pub work_hours: f64,

    pub notes: Option<String>,

    pub location: Option<String>,
}

impl AttendanceRecord {
    pub fn new(employee_id: u64, date: NaiveDate, status: AttendanceStatus) -> Self {
        Self {
            employee_id,
            date,
            check_in: None,
            check_out: None,
            status,
            work_hours: 0.0,
            notes: None,
            location: None,
        }
    }

    /// Checked in and still open.
    pub fn is_open(&self) -> bool {
        self.check_in.is_some() && self.check_out.is_none()
    }

    pub fn is_completed(&self) -> bool {
        self.check_in.is_some() && self.check_out.is_some()
    }

    /// Rejects records that break the per-day invariants. Stores call this
    /// before every write so a bad mutation never reaches storage.
    pub fn validate(&self) -> Result<(), AttendanceError> {
        let invalid = |reason: &str| {
            Err(AttendanceError::InvalidRecord {
                employee_id: self.employee_id,
                date: self.date,
                reason: reason.to_string(),
            })
        };

        if self.check_out.is_some() && self.check_in.is_none() {
            return invalid("check_out set without check_in");
        }
        if let (Some(check_in), Some(check_out)) = (self.check_in, self.check_out) {
            if check_out < check_in {
                return invalid("check_out precedes check_in");
            }
            if self.work_hours != work_hours_between(check_in, check_out) {
                return invalid("work_hours does not match check_in/check_out");
            }
        } else if self.work_hours != 0.0 {
            return invalid("work_hours set on an incomplete record");
        }
        if self.status.is_attended() && self.check_in.is_none() {
            return invalid("present/late record without check_in");
        }
        if self.status == AttendanceStatus::Absent && self.check_in.is_some() {
            return invalid("absent record with check_in");
        }
        Ok(())
    }
}

/// Elapsed hours between two instants, rounded to two decimal places.
pub fn work_hours_between(check_in: DateTime<Utc>, check_out: DateTime<Utc>) -> f64 {
    let millis = (check_out - check_in).num_milliseconds().max(0) as f64;
    round2(millis / 3_600_000.0)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Read-side aggregate over a window of records. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "present": 5,
    "absent": 1,
    "late": 0,
    "leave": 1,
    "holiday": 0,
    "total_records": 7,
    "employees": 1,
    "total_work_hours": 42.5,
    "average_work_hours": 8.5
}))]
pub struct AttendanceStats {
    pub present: u64,
    pub absent: u64,
    pub late: u64,
    pub leave: u64,
    pub holiday: u64,
    pub total_records: u64,
    /// Distinct employees seen in the window.
    pub employees: u64,
    pub total_work_hours: f64,
    pub average_work_hours: f64,
}

impl AttendanceStats {
    pub fn count(&self, status: AttendanceStatus) -> u64 {
        match status {
            AttendanceStatus::Present => self.present,
            AttendanceStatus::Late => self.late,
            AttendanceStatus::Absent => self.absent,
            AttendanceStatus::Leave => self.leave,
            AttendanceStatus::Holiday => self.holiday,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, h, m, 0).unwrap()
    }

    #[test]
    fn status_uses_lowercase_everywhere() {
        for status in AttendanceStatus::iter() {
            assert_eq!(status.to_string(), status.as_str());
            assert_eq!(AttendanceStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert_eq!(AttendanceStatus::Late.to_string(), "late");
        assert_eq!(
            AttendanceStatus::from_str("leave").unwrap(),
            AttendanceStatus::Leave
        );
        assert_eq!(
            serde_json::to_value(AttendanceStatus::Present).unwrap(),
            serde_json::json!("present")
        );
        assert!(AttendanceStatus::from_str("half_day").is_err());
    }

    #[test]
    fn work_hours_are_rounded_to_two_decimals() {
        assert_eq!(work_hours_between(at(9, 0), at(17, 30)), 8.5);
        assert_eq!(work_hours_between(at(8, 55), at(17, 30)), 8.58);
        assert_eq!(work_hours_between(at(9, 0), at(9, 0)), 0.0);
    }

    #[test]
    fn validate_accepts_completed_record() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let mut record = AttendanceRecord::new(7, date, AttendanceStatus::Present);
        record.check_in = Some(at(9, 0));
        record.check_out = Some(at(17, 30));
        record.work_hours = 8.5;

        assert!(record.validate().is_ok());
        assert!(record.is_completed());
        assert!(!record.is_open());
    }

    #[test]
    fn validate_rejects_broken_invariants() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();

        let mut reversed = AttendanceRecord::new(7, date, AttendanceStatus::Present);
        reversed.check_in = Some(at(17, 0));
        reversed.check_out = Some(at(9, 0));
        assert!(reversed.validate().is_err());

        let mut orphan_checkout = AttendanceRecord::new(7, date, AttendanceStatus::Absent);
        orphan_checkout.check_out = Some(at(17, 0));
        assert!(orphan_checkout.validate().is_err());

        let present_without_checkin = AttendanceRecord::new(7, date, AttendanceStatus::Present);
        assert!(present_without_checkin.validate().is_err());

        let mut stale_hours = AttendanceRecord::new(7, date, AttendanceStatus::Late);
        stale_hours.check_in = Some(at(10, 0));
        stale_hours.work_hours = 1.0;
        assert!(stale_hours.validate().is_err());

        assert!(AttendanceRecord::new(7, date, AttendanceStatus::Leave)
            .validate()
            .is_ok());
    }
}
