use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::BoxStream;

use super::error::AttendanceError;
use super::period::DateRange;
use crate::model::attendance::{AttendanceRecord, AttendanceStatus};

pub mod memory;
pub mod mysql;

pub use memory::MemoryAttendanceStore;
pub use mysql::MySqlAttendanceStore;

/// Computes the next state of a record from its current state (`None` when
/// no record exists yet). Returning a record equal to the current one is a
/// no-op. May run more than once when a backend retries a lost insert race.
pub type Mutator =
    Box<dyn Fn(Option<&AttendanceRecord>) -> Result<AttendanceRecord, AttendanceError> + Send + Sync>;

pub type RecordStream<'a> = BoxStream<'a, Result<AttendanceRecord, AttendanceError>>;

/// Record filter. Department and free-text filters arrive here already
/// resolved into `employee_ids` by the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub date_range: Option<DateRange>,
    pub employee_id: Option<u64>,
    pub employee_ids: Option<BTreeSet<u64>>,
    pub status: Option<AttendanceStatus>,
}

impl RecordFilter {
    pub fn in_range(range: DateRange) -> Self {
        Self {
            date_range: Some(range),
            ..Self::default()
        }
    }

    pub fn matches(&self, record: &AttendanceRecord) -> bool {
        self.date_range.is_none_or(|r| r.contains(record.date))
            && self.employee_id.is_none_or(|id| id == record.employee_id)
            && self
                .employee_ids
                .as_ref()
                .is_none_or(|ids| ids.contains(&record.employee_id))
            && self.status.is_none_or(|s| s == record.status)
    }

    /// True when the id constraints cannot match anything.
    pub fn is_empty_selection(&self) -> bool {
        match (&self.employee_ids, self.employee_id) {
            (Some(ids), Some(id)) => !ids.contains(&id),
            (Some(ids), None) => ids.is_empty(),
            _ => false,
        }
    }
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Fetches or creates the record for `(employee_id, date)` and applies
    /// `mutator` to it atomically. Calls for the same key serialize; calls
    /// for different keys do not wait on each other.
    async fn upsert_for_day(
        &self,
        employee_id: u64,
        date: NaiveDate,
        mutator: Mutator,
    ) -> Result<AttendanceRecord, AttendanceError>;

    async fn get(
        &self,
        employee_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, AttendanceError>;

    /// Matching records ordered by date, then employee id.
    fn query(&self, filter: RecordFilter) -> RecordStream<'_>;
}

/// Runs `mutator` against `current` and returns the record to write, or
/// `None` when nothing changed.
pub(crate) fn next_state(
    employee_id: u64,
    date: NaiveDate,
    current: Option<&AttendanceRecord>,
    mutator: &Mutator,
) -> Result<Option<AttendanceRecord>, AttendanceError> {
    let next = mutator(current)?;
    if next.employee_id != employee_id || next.date != date {
        return Err(AttendanceError::InvalidRecord {
            employee_id,
            date,
            reason: format!(
                "mutator produced a record keyed ({}, {})",
                next.employee_id, next.date
            ),
        });
    }
    if current == Some(&next) {
        return Ok(None);
    }
    next.validate()?;
    Ok(Some(next))
}
