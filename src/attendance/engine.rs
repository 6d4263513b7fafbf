use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use actix_web::rt::time::timeout;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tracing::{debug, info, instrument, warn};

use super::clock::Clock;
use super::error::AttendanceError;
use super::store::{AttendanceStore, Mutator};
use crate::model::attendance::{AttendanceRecord, AttendanceStatus, work_hours_between};

/// Per-deployment timing rules.
#[derive(Debug, Clone, Copy)]
pub struct AttendancePolicy {
    /// Check-ins at or after this local time-of-day are late.
    pub late_threshold: NaiveTime,
    /// How far ahead of the server clock a submitted timestamp may be.
    pub max_clock_skew: chrono::Duration,
}

impl AttendancePolicy {
    pub fn status_for(&self, local_time: NaiveTime) -> AttendanceStatus {
        if local_time >= self.late_threshold {
            AttendanceStatus::Late
        } else {
            AttendanceStatus::Present
        }
    }
}

/// Optional free-text captured with a check-in or check-out.
#[derive(Debug, Clone, Default)]
pub struct CheckDetails {
    pub location: Option<String>,
    pub notes: Option<String>,
}

impl CheckDetails {
    fn apply(&self, record: &mut AttendanceRecord) {
        if let Some(location) = &self.location {
            record.location = Some(location.clone());
        }
        if let Some(notes) = &self.notes {
            record.notes = Some(notes.clone());
        }
    }
}

/// Outcome of marking one employee absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsenceMark {
    Marked,
    /// A record already existed for the day and was left alone.
    Skipped,
}

/// Business rules of the daily check-in / check-out cycle.
#[derive(Clone)]
pub struct AttendanceEngine {
    store: Arc<dyn AttendanceStore>,
    clock: Arc<dyn Clock>,
    policy: AttendancePolicy,
    store_timeout: Duration,
}

impl AttendanceEngine {
    pub fn new(
        store: Arc<dyn AttendanceStore>,
        clock: Arc<dyn Clock>,
        policy: AttendancePolicy,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            policy,
            store_timeout,
        }
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, AttendanceError>>,
    ) -> Result<T, AttendanceError> {
        match timeout(self.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op, timeout_ms = self.store_timeout.as_millis() as u64, "Store call timed out");
                Err(AttendanceError::Timeout(op))
            }
        }
    }

    /// Timestamps must be no later than `now + skew` and fall on the local
    /// day of `now`, or on the neighbouring day when within skew of midnight.
    fn ensure_current(&self, at: DateTime<Utc>) -> Result<(), AttendanceError> {
        let now = self.clock.now();
        let skew = self.policy.max_clock_skew;
        if at > now + skew {
            return Err(AttendanceError::FutureTimestamp { at, now });
        }

        let date = self.clock.local_date(at);
        let current = [now - skew, now, now + skew]
            .iter()
            .any(|t| self.clock.local_date(*t) == date);
        if !current {
            return Err(AttendanceError::StaleTimestamp {
                at,
                today: self.clock.local_date(now),
            });
        }
        Ok(())
    }

    /// Opens the day for `employee_id`. A repeated check-in returns the
    /// existing record untouched.
    #[instrument(name = "attendance_check_in", skip(self, details), fields(%at))]
    pub async fn check_in(
        &self,
        employee_id: u64,
        at: DateTime<Utc>,
        details: CheckDetails,
    ) -> Result<AttendanceRecord, AttendanceError> {
        self.ensure_current(at)?;

        let date = self.clock.local_date(at);
        let status = self.policy.status_for(self.clock.local_time(at));

        let mutator: Mutator = Box::new(move |current| match current {
            Some(record) if record.status.is_administrative() => {
                Err(AttendanceError::AlreadyClassified {
                    date,
                    status: record.status,
                })
            }
            Some(record) if record.check_out.is_some() => {
                Err(AttendanceError::AlreadyCheckedOut { employee_id, date })
            }
            Some(record) if record.check_in.is_some() => Ok(record.clone()),
            // vacant, or an absent mark from the end-of-day sweep
            current => {
                let mut next = current
                    .cloned()
                    .unwrap_or_else(|| AttendanceRecord::new(employee_id, date, status));
                next.check_in = Some(at);
                next.status = status;
                details.apply(&mut next);
                Ok(next)
            }
        });

        let record = self
            .bounded("attendance check-in", self.store.upsert_for_day(employee_id, date, mutator))
            .await?;

        if record.check_in == Some(at) {
            info!(%date, status = %record.status, "Checked in");
        } else {
            debug!(%date, "Already checked in, returning existing record");
        }
        Ok(record)
    }

    /// Closes the open check-in of the calendar day containing `at`.
    #[instrument(name = "attendance_check_out", skip(self, details), fields(%at))]
    pub async fn check_out(
        &self,
        employee_id: u64,
        at: DateTime<Utc>,
        details: CheckDetails,
    ) -> Result<AttendanceRecord, AttendanceError> {
        self.ensure_current(at)?;

        let date = self.clock.local_date(at);
        let no_open = move || AttendanceError::NoOpenCheckIn { employee_id, date };

        // Fail fast rather than queue behind a check-in that has not committed.
        let current = self
            .bounded("attendance lookup", self.store.get(employee_id, date))
            .await?;
        if !current.as_ref().is_some_and(|r| r.check_in.is_some()) {
            return Err(no_open());
        }

        let mutator: Mutator = Box::new(move |current| {
            let record = current.ok_or_else(no_open)?;
            let check_in = record.check_in.ok_or_else(no_open)?;
            // a retried request whose first attempt committed
            if record.check_out == Some(at) {
                return Ok(record.clone());
            }
            if record.check_out.is_some() {
                return Err(AttendanceError::AlreadyCheckedOut { employee_id, date });
            }
            if at < check_in {
                return Err(AttendanceError::CheckOutBeforeCheckIn { check_in, at });
            }

            let mut next = record.clone();
            next.check_out = Some(at);
            next.work_hours = work_hours_between(check_in, at);
            details.apply(&mut next);
            Ok(next)
        });

        let record = self
            .bounded("attendance check-out", self.store.upsert_for_day(employee_id, date, mutator))
            .await?;

        info!(%date, work_hours = record.work_hours, "Checked out");
        Ok(record)
    }

    /// End-of-day sweep entry: records `absent` when nothing exists yet.
    #[instrument(name = "attendance_mark_absent", skip(self))]
    pub async fn mark_absent(
        &self,
        employee_id: u64,
        date: NaiveDate,
    ) -> Result<AbsenceMark, AttendanceError> {
        let created = Arc::new(AtomicBool::new(false));
        let flag = created.clone();

        let mutator: Mutator = Box::new(move |current| {
            flag.store(current.is_none(), Ordering::SeqCst);
            Ok(current.cloned().unwrap_or_else(|| {
                AttendanceRecord::new(employee_id, date, AttendanceStatus::Absent)
            }))
        });

        self.bounded("attendance absent mark", self.store.upsert_for_day(employee_id, date, mutator))
            .await?;

        if created.load(Ordering::SeqCst) {
            debug!("Marked absent");
            Ok(AbsenceMark::Marked)
        } else {
            Ok(AbsenceMark::Skipped)
        }
    }

    pub async fn record_for(
        &self,
        employee_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, AttendanceError> {
        self.bounded("attendance lookup", self.store.get(employee_id, date))
            .await
    }

    pub async fn today(&self, employee_id: u64) -> Result<Option<AttendanceRecord>, AttendanceError> {
        self.record_for(employee_id, self.clock.today()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::clock::testing::FixedClock;
    use crate::attendance::store::{MemoryAttendanceStore, RecordFilter};
    use actix_web::rt::System;
    use chrono::{FixedOffset, TimeZone};
    use futures::TryStreamExt;
    use std::sync::Barrier;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, h, m, 0).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 5).unwrap()
    }

    fn policy() -> AttendancePolicy {
        AttendancePolicy {
            late_threshold: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            max_clock_skew: chrono::Duration::minutes(5),
        }
    }

    fn engine_at(now: DateTime<Utc>) -> (AttendanceEngine, Arc<MemoryAttendanceStore>) {
        let store = Arc::new(MemoryAttendanceStore::new());
        let engine = AttendanceEngine::new(
            store.clone(),
            Arc::new(FixedClock::utc(now)),
            policy(),
            Duration::from_secs(5),
        );
        (engine, store)
    }

    async fn seed(store: &MemoryAttendanceStore, employee_id: u64, status: AttendanceStatus) {
        let mutator: Mutator =
            Box::new(move |_| Ok(AttendanceRecord::new(employee_id, day(), status)));
        store.upsert_for_day(employee_id, day(), mutator).await.unwrap();
    }

    #[actix_web::test]
    async fn status_depends_on_late_threshold() {
        let (engine, _) = engine_at(at(18, 0));

        let e1 = engine.check_in(1, at(8, 55), CheckDetails::default()).await.unwrap();
        let e2 = engine.check_in(2, at(9, 5), CheckDetails::default()).await.unwrap();
        let e3 = engine.check_in(3, at(9, 0), CheckDetails::default()).await.unwrap();

        assert_eq!(e1.status, AttendanceStatus::Present);
        assert_eq!(e2.status, AttendanceStatus::Late);
        assert_eq!(e3.status, AttendanceStatus::Late);
    }

    #[actix_web::test]
    async fn threshold_is_compared_in_local_time() {
        // 03:30 UTC is 09:30 at UTC+06:00
        let offset = FixedOffset::east_opt(6 * 3600).unwrap();
        let engine = AttendanceEngine::new(
            Arc::new(MemoryAttendanceStore::new()),
            Arc::new(FixedClock::with_offset(at(12, 0), offset)),
            policy(),
            Duration::from_secs(5),
        );

        let record = engine.check_in(1, at(3, 30), CheckDetails::default()).await.unwrap();
        assert_eq!(record.status, AttendanceStatus::Late);
        assert_eq!(record.date, day());
    }

    #[actix_web::test]
    async fn full_cycle_computes_work_hours() {
        let (engine, _) = engine_at(at(18, 0));
        let details = CheckDetails {
            location: Some("HQ".into()),
            notes: None,
        };

        let opened = engine.check_in(1, at(9, 0), details).await.unwrap();
        assert!(opened.is_open());
        assert_eq!(opened.work_hours, 0.0);
        assert_eq!(opened.location.as_deref(), Some("HQ"));

        let closed = engine.check_out(1, at(17, 30), CheckDetails::default()).await.unwrap();
        assert_eq!(closed.work_hours, 8.5);
        // 09:00 is the threshold itself
        assert_eq!(closed.status, AttendanceStatus::Late);
        assert_eq!(closed.location.as_deref(), Some("HQ"));
        assert_eq!(engine.today(1).await.unwrap(), Some(closed));
    }

    #[actix_web::test]
    async fn repeated_check_in_is_idempotent() {
        let (engine, _) = engine_at(at(18, 0));

        let first = engine.check_in(1, at(8, 30), CheckDetails::default()).await.unwrap();
        let retry = engine
            .check_in(
                1,
                at(9, 30),
                CheckDetails {
                    location: Some("elsewhere".into()),
                    notes: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(first, retry);
        assert_eq!(retry.check_in, Some(at(8, 30)));
        assert_eq!(retry.status, AttendanceStatus::Present);
    }

    #[test]
    fn concurrent_check_ins_leave_one_record() {
        let (engine, store) = engine_at(at(18, 0));
        let barrier = Barrier::new(8);

        // one runtime per OS thread so the store mutex sees real contention
        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let engine = engine.clone();
                    let barrier = &barrier;
                    scope.spawn(move || {
                        barrier.wait();
                        System::new().block_on(engine.check_in(
                            1,
                            at(8, 50 + i),
                            CheckDetails::default(),
                        ))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let first = results[0].clone().unwrap();
        assert!(results.iter().all(|r| r.as_ref() == Ok(&first)));

        let records: Vec<_> = System::new()
            .block_on(
                store
                    .query(RecordFilter {
                        employee_id: Some(1),
                        ..RecordFilter::default()
                    })
                    .try_collect::<Vec<_>>(),
            )
            .unwrap();
        assert_eq!(records, vec![first]);
    }

    #[actix_web::test]
    async fn check_out_without_check_in_is_rejected() {
        let (engine, store) = engine_at(at(18, 0));

        let err = engine.check_out(1, at(16, 0), CheckDetails::default()).await.unwrap_err();
        assert_eq!(
            err,
            AttendanceError::NoOpenCheckIn {
                employee_id: 1,
                date: day()
            }
        );
        assert_eq!(store.get(1, day()).await.unwrap(), None);
    }

    #[actix_web::test]
    async fn check_out_before_check_in_is_rejected() {
        let (engine, _) = engine_at(at(18, 0));
        engine.check_in(1, at(10, 0), CheckDetails::default()).await.unwrap();

        let err = engine.check_out(1, at(9, 59), CheckDetails::default()).await.unwrap_err();
        assert!(matches!(err, AttendanceError::CheckOutBeforeCheckIn { .. }));
        assert!(engine.today(1).await.unwrap().unwrap().is_open());
    }

    #[actix_web::test]
    async fn completed_day_rejects_further_cycle() {
        let (engine, _) = engine_at(at(18, 0));
        engine.check_in(1, at(9, 0), CheckDetails::default()).await.unwrap();
        engine.check_out(1, at(17, 0), CheckDetails::default()).await.unwrap();

        let again = engine.check_out(1, at(17, 30), CheckDetails::default()).await;
        assert!(matches!(again, Err(AttendanceError::AlreadyCheckedOut { .. })));

        let reopen = engine.check_in(1, at(17, 45), CheckDetails::default()).await;
        assert!(matches!(reopen, Err(AttendanceError::AlreadyCheckedOut { .. })));
    }

    #[actix_web::test]
    async fn retried_check_out_returns_committed_record() {
        let (engine, _) = engine_at(at(18, 0));
        engine.check_in(1, at(9, 0), CheckDetails::default()).await.unwrap();

        let first = engine.check_out(1, at(17, 0), CheckDetails::default()).await.unwrap();
        let retry = engine.check_out(1, at(17, 0), CheckDetails::default()).await.unwrap();
        assert_eq!(first, retry);
        assert_eq!(retry.work_hours, 8.0);
    }

    #[actix_web::test]
    async fn leave_and_holiday_block_check_in() {
        let (engine, store) = engine_at(at(18, 0));
        seed(&store, 1, AttendanceStatus::Leave).await;
        seed(&store, 2, AttendanceStatus::Holiday).await;

        for id in [1, 2] {
            let err = engine.check_in(id, at(9, 0), CheckDetails::default()).await.unwrap_err();
            assert!(matches!(err, AttendanceError::AlreadyClassified { .. }));
        }
        let leave = store.get(1, day()).await.unwrap().unwrap();
        assert_eq!(leave.status, AttendanceStatus::Leave);
        assert_eq!(leave.check_in, None);
    }

    #[actix_web::test]
    async fn check_in_over_absent_mark_is_allowed() {
        let (engine, _) = engine_at(at(23, 50));

        assert_eq!(engine.mark_absent(1, day()).await.unwrap(), AbsenceMark::Marked);
        assert_eq!(engine.mark_absent(1, day()).await.unwrap(), AbsenceMark::Skipped);

        let record = engine.check_in(1, at(23, 0), CheckDetails::default()).await.unwrap();
        assert_eq!(record.status, AttendanceStatus::Late);
        assert_eq!(record.check_in, Some(at(23, 0)));
    }

    #[actix_web::test]
    async fn future_timestamps_are_rejected() {
        let (engine, _) = engine_at(at(9, 0));

        assert!(engine.check_in(1, at(9, 4), CheckDetails::default()).await.is_ok());
        let err = engine.check_in(2, at(9, 10), CheckDetails::default()).await.unwrap_err();
        assert!(matches!(err, AttendanceError::FutureTimestamp { .. }));
    }

    #[actix_web::test]
    async fn timestamps_outside_the_current_day_are_rejected() {
        let clock = Arc::new(FixedClock::utc(at(18, 0)));
        let store = Arc::new(MemoryAttendanceStore::new());
        let engine =
            AttendanceEngine::new(store.clone(), clock.clone(), policy(), Duration::from_secs(5));
        engine.mark_absent(1, day()).await.unwrap();

        clock.set(Utc.with_ymd_and_hms(2026, 1, 20, 10, 0, 0).unwrap());
        let err = engine.check_in(1, at(8, 0), CheckDetails::default()).await.unwrap_err();
        assert_eq!(
            err,
            AttendanceError::StaleTimestamp {
                at: at(8, 0),
                today: NaiveDate::from_ymd_opt(2026, 1, 20).unwrap(),
            }
        );
        assert!(matches!(
            engine.check_out(1, at(17, 0), CheckDetails::default()).await,
            Err(AttendanceError::StaleTimestamp { .. })
        ));

        let untouched = store.get(1, day()).await.unwrap().unwrap();
        assert_eq!(untouched.status, AttendanceStatus::Absent);
        assert_eq!(untouched.check_in, None);
    }

    #[actix_web::test]
    async fn late_evening_timestamp_is_accepted_just_after_midnight() {
        let clock = Arc::new(FixedClock::utc(Utc.with_ymd_and_hms(2026, 1, 6, 0, 2, 0).unwrap()));
        let engine = AttendanceEngine::new(
            Arc::new(MemoryAttendanceStore::new()),
            clock,
            policy(),
            Duration::from_secs(5),
        );

        let record = engine.check_in(1, at(23, 59), CheckDetails::default()).await.unwrap();
        assert_eq!(record.date, day());
    }
}
