use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use tracing::debug;

use super::{AttendanceStore, Mutator, RecordFilter, RecordStream, next_state};
use crate::attendance::error::AttendanceError;
use crate::model::attendance::AttendanceRecord;

/// Ordered by date first so range scans walk the map in output order.
type RecordKey = (NaiveDate, u64);
type Slot = Arc<Mutex<Option<AttendanceRecord>>>;

/// Process-local store. The map lock only guards slot lookup; each
/// `(employee, date)` slot has its own lock for read-modify-write.
#[derive(Default)]
pub struct MemoryAttendanceStore {
    slots: RwLock<BTreeMap<RecordKey, Slot>>,
}

fn poisoned<T>(_: T) -> AttendanceError {
    AttendanceError::storage("in-memory attendance lock poisoned")
}

impl MemoryAttendanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: RecordKey) -> Result<Slot, AttendanceError> {
        if let Some(slot) = self.slots.read().map_err(poisoned)?.get(&key) {
            return Ok(slot.clone());
        }
        let mut slots = self.slots.write().map_err(poisoned)?;
        Ok(slots.entry(key).or_default().clone())
    }

    fn snapshot(&self, filter: &RecordFilter) -> Result<Vec<AttendanceRecord>, AttendanceError> {
        let slots = self.slots.read().map_err(poisoned)?;
        let range = match filter.date_range {
            Some(r) => slots.range((r.start, u64::MIN)..=(r.end, u64::MAX)),
            None => slots.range(..),
        };

        let mut records = Vec::new();
        for slot in range.map(|(_, slot)| slot) {
            if let Some(record) = slot.lock().map_err(poisoned)?.as_ref() {
                if filter.matches(record) {
                    records.push(record.clone());
                }
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl AttendanceStore for MemoryAttendanceStore {
    async fn upsert_for_day(
        &self,
        employee_id: u64,
        date: NaiveDate,
        mutator: Mutator,
    ) -> Result<AttendanceRecord, AttendanceError> {
        let slot = self.slot((date, employee_id))?;
        let mut current = slot.lock().map_err(poisoned)?;

        match next_state(employee_id, date, current.as_ref(), &mutator)? {
            Some(next) => {
                *current = Some(next.clone());
                Ok(next)
            }
            None => {
                debug!(employee_id, %date, "Attendance upsert left record unchanged");
                current.clone().ok_or_else(|| AttendanceError::InvalidRecord {
                    employee_id,
                    date,
                    reason: "mutator produced nothing for a vacant slot".to_string(),
                })
            }
        }
    }

    async fn get(
        &self,
        employee_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, AttendanceError> {
        let slot = match self.slots.read().map_err(poisoned)?.get(&(date, employee_id)) {
            Some(slot) => slot.clone(),
            None => return Ok(None),
        };
        let record = slot.lock().map_err(poisoned)?.clone();
        Ok(record)
    }

    fn query(&self, filter: RecordFilter) -> RecordStream<'_> {
        match self.snapshot(&filter) {
            Ok(records) => stream::iter(records.into_iter().map(Ok)).boxed(),
            Err(e) => stream::once(async move { Err(e) }).boxed(),
        }
    }
}
