use std::str::FromStr;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use futures::stream::StreamExt;
use sqlx::{MySql, MySqlPool, Transaction};
use tracing::{debug, error, warn};

use super::{AttendanceStore, Mutator, RecordFilter, RecordStream, next_state};
use crate::attendance::error::AttendanceError;
use crate::model::attendance::{AttendanceRecord, AttendanceStatus};

const SELECT_FOR_UPDATE: &str = r#"
    SELECT employee_id, date, check_in, check_out, status, work_hours, notes, location
    FROM attendance
    WHERE employee_id = ? AND date = ?
    FOR UPDATE
"#;

const SELECT_ONE: &str = r#"
    SELECT employee_id, date, check_in, check_out, status, work_hours, notes, location
    FROM attendance
    WHERE employee_id = ? AND date = ?
"#;

const INSERT: &str = r#"
    INSERT INTO attendance
    (employee_id, date, check_in, check_out, status, work_hours, notes, location)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE: &str = r#"
    UPDATE attendance
    SET check_in = ?, check_out = ?, status = ?, work_hours = ?, notes = ?, location = ?
    WHERE employee_id = ? AND date = ?
"#;

// Every filter is optional: a NULL parameter disables its condition. The id
// set is passed as a comma-separated list.
const QUERY: &str = r#"
    SELECT employee_id, date, check_in, check_out, status, work_hours, notes, location
    FROM attendance
    WHERE (? IS NULL OR date >= ?)
      AND (? IS NULL OR date <= ?)
      AND (? IS NULL OR employee_id = ?)
      AND (? IS NULL OR FIND_IN_SET(employee_id, ?) > 0)
      AND (? IS NULL OR status = ?)
    ORDER BY date, employee_id
"#;

/// Instants are stored as UTC `DATETIME(3)` columns.
#[derive(sqlx::FromRow)]
struct AttendanceRow {
    employee_id: u64,
    date: NaiveDate,
    check_in: Option<NaiveDateTime>,
    check_out: Option<NaiveDateTime>,
    status: String,
    work_hours: f64,
    notes: Option<String>,
    location: Option<String>,
}

impl TryFrom<AttendanceRow> for AttendanceRecord {
    type Error = AttendanceError;

    fn try_from(row: AttendanceRow) -> Result<Self, Self::Error> {
        let status = AttendanceStatus::from_str(&row.status).map_err(|_| {
            AttendanceError::InvalidRecord {
                employee_id: row.employee_id,
                date: row.date,
                reason: format!("unknown status '{}'", row.status),
            }
        })?;

        Ok(AttendanceRecord {
            employee_id: row.employee_id,
            date: row.date,
            check_in: row.check_in.map(|t| t.and_utc()),
            check_out: row.check_out.map(|t| t.and_utc()),
            status,
            work_hours: row.work_hours,
            notes: row.notes,
            location: row.location,
        })
    }
}

/// MySQL-backed store. The `UNIQUE (employee_id, date)` key is the source
/// of truth for the one-record-per-day rule.
#[derive(Clone)]
pub struct MySqlAttendanceStore {
    pool: MySqlPool,
}

fn is_duplicate_key(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23000"))
}

impl MySqlAttendanceStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn fetch_locked(
        tx: &mut Transaction<'_, MySql>,
        employee_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, AttendanceError> {
        sqlx::query_as::<_, AttendanceRow>(SELECT_FOR_UPDATE)
            .bind(employee_id)
            .bind(date)
            .fetch_optional(&mut **tx)
            .await?
            .map(AttendanceRecord::try_from)
            .transpose()
    }

    async fn write(
        tx: &mut Transaction<'_, MySql>,
        record: &AttendanceRecord,
        exists: bool,
    ) -> Result<(), sqlx::Error> {
        let check_in = record.check_in.map(|t| t.naive_utc());
        let check_out = record.check_out.map(|t| t.naive_utc());

        if exists {
            sqlx::query(UPDATE)
                .bind(check_in)
                .bind(check_out)
                .bind(record.status.as_str())
                .bind(record.work_hours)
                .bind(&record.notes)
                .bind(&record.location)
                .bind(record.employee_id)
                .bind(record.date)
                .execute(&mut **tx)
                .await?;
        } else {
            sqlx::query(INSERT)
                .bind(record.employee_id)
                .bind(record.date)
                .bind(check_in)
                .bind(check_out)
                .bind(record.status.as_str())
                .bind(record.work_hours)
                .bind(&record.notes)
                .bind(&record.location)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }

    /// One read-modify-write attempt. `Ok(None)` means a concurrent first
    /// writer inserted the row between our read and our insert.
    async fn try_upsert(
        &self,
        employee_id: u64,
        date: NaiveDate,
        mutator: &Mutator,
    ) -> Result<Option<AttendanceRecord>, AttendanceError> {
        let mut tx = self.pool.begin().await?;
        let current = Self::fetch_locked(&mut tx, employee_id, date).await?;

        let next = match next_state(employee_id, date, current.as_ref(), mutator)? {
            Some(next) => next,
            None => {
                tx.rollback().await?;
                debug!(employee_id, %date, "Attendance upsert left record unchanged");
                return current.map(Some).ok_or_else(|| AttendanceError::InvalidRecord {
                    employee_id,
                    date,
                    reason: "mutator produced nothing for a vacant row".to_string(),
                });
            }
        };

        match Self::write(&mut tx, &next, current.is_some()).await {
            Ok(()) => {}
            Err(e) if current.is_none() && is_duplicate_key(&e) => {
                tx.rollback().await?;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        tx.commit().await?;
        Ok(Some(next))
    }
}

#[async_trait]
impl AttendanceStore for MySqlAttendanceStore {
    async fn upsert_for_day(
        &self,
        employee_id: u64,
        date: NaiveDate,
        mutator: Mutator,
    ) -> Result<AttendanceRecord, AttendanceError> {
        if let Some(record) = self.try_upsert(employee_id, date, &mutator).await? {
            return Ok(record);
        }

        // Lost the insert race; the row exists now, so the locked read finds it.
        warn!(employee_id, %date, "Concurrent first write detected, retrying upsert");
        match self.try_upsert(employee_id, date, &mutator).await? {
            Some(record) => Ok(record),
            None => {
                error!(employee_id, %date, "Upsert lost the insert race twice");
                Err(AttendanceError::storage(
                    "attendance row could not be created or locked",
                ))
            }
        }
    }

    async fn get(
        &self,
        employee_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, AttendanceError> {
        sqlx::query_as::<_, AttendanceRow>(SELECT_ONE)
            .bind(employee_id)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?
            .map(AttendanceRecord::try_from)
            .transpose()
    }

    fn query(&self, filter: RecordFilter) -> RecordStream<'_> {
        let start = filter.date_range.map(|r| r.start);
        let end = filter.date_range.map(|r| r.end);
        let ids = filter.employee_ids.as_ref().map(|ids| {
            ids.iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join(",")
        });
        let status = filter.status.map(|s| s.as_str().to_string());

        debug!(?filter, "Streaming attendance records");

        sqlx::query_as::<_, AttendanceRow>(QUERY)
            .bind(start)
            .bind(start)
            .bind(end)
            .bind(end)
            .bind(filter.employee_id)
            .bind(filter.employee_id)
            .bind(ids.clone())
            .bind(ids)
            .bind(status.clone())
            .bind(status)
            .fetch(&self.pool)
            .map(|row| {
                row.map_err(AttendanceError::from)
                    .and_then(AttendanceRecord::try_from)
            })
            .boxed()
    }
}
