use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use actix_web::rt::time::timeout;
use futures::TryStreamExt;
use tracing::{debug, instrument, warn};

use super::error::AttendanceError;
use super::store::{AttendanceStore, RecordFilter};
use crate::model::attendance::{AttendanceRecord, AttendanceStats, AttendanceStatus, round2};

/// Running tally over a stream of records.
#[derive(Debug, Default)]
pub struct StatsAccumulator {
    stats: AttendanceStats,
    employees: BTreeSet<u64>,
    total_work_hours: f64,
}

impl StatsAccumulator {
    pub fn push(&mut self, record: &AttendanceRecord) {
        let stats = &mut self.stats;
        match record.status {
            AttendanceStatus::Present => stats.present += 1,
            AttendanceStatus::Late => stats.late += 1,
            AttendanceStatus::Absent => stats.absent += 1,
            AttendanceStatus::Leave => stats.leave += 1,
            AttendanceStatus::Holiday => stats.holiday += 1,
        }
        stats.total_records += 1;
        self.employees.insert(record.employee_id);
        self.total_work_hours += record.work_hours;
    }

    pub fn finish(self) -> AttendanceStats {
        let mut stats = self.stats;
        let attended = stats.present + stats.late;

        stats.employees = self.employees.len() as u64;
        stats.total_work_hours = round2(self.total_work_hours);
        stats.average_work_hours = if attended == 0 {
            0.0
        } else {
            round2(self.total_work_hours / attended as f64)
        };
        stats
    }
}

impl<'a> FromIterator<&'a AttendanceRecord> for AttendanceStats {
    fn from_iter<I: IntoIterator<Item = &'a AttendanceRecord>>(iter: I) -> Self {
        let mut acc = StatsAccumulator::default();
        iter.into_iter().for_each(|r| acc.push(r));
        acc.finish()
    }
}

/// Turns a filtered range of records into summary counts.
#[derive(Clone)]
pub struct StatsAggregator {
    store: Arc<dyn AttendanceStore>,
    query_timeout: Duration,
}

impl StatsAggregator {
    pub fn new(store: Arc<dyn AttendanceStore>, query_timeout: Duration) -> Self {
        Self {
            store,
            query_timeout,
        }
    }

    #[instrument(name = "attendance_stats", skip(self))]
    pub async fn aggregate(&self, filter: RecordFilter) -> Result<AttendanceStats, AttendanceError> {
        if filter.is_empty_selection() {
            debug!("Filter selects no employees, returning empty stats");
            return Ok(AttendanceStats::default());
        }

        let fold = self
            .store
            .query(filter)
            .try_fold(StatsAccumulator::default(), |mut acc, record| async move {
                acc.push(&record);
                Ok(acc)
            });

        match timeout(self.query_timeout, fold).await {
            Ok(acc) => {
                let stats = acc?.finish();
                debug!(records = stats.total_records, "Attendance stats computed");
                Ok(stats)
            }
            Err(_) => {
                warn!(timeout_ms = self.query_timeout.as_millis() as u64, "Stats query timed out");
                Err(AttendanceError::Timeout("attendance stats query"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::period::DateRange;
    use crate::attendance::store::{MemoryAttendanceStore, Mutator, RecordStream};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, NaiveDate, TimeZone, Utc};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, day).unwrap()
    }

    fn worked(employee_id: u64, date: NaiveDate, status: AttendanceStatus, hours: i64) -> AttendanceRecord {
        let check_in = Utc.from_utc_datetime(&date.and_hms_opt(9, 0, 0).unwrap());
        let check_out = check_in + ChronoDuration::minutes(hours * 60 + 30);
        let mut record = AttendanceRecord::new(employee_id, date, status);
        record.check_in = Some(check_in);
        record.check_out = Some(check_out);
        record.work_hours = crate::model::attendance::work_hours_between(check_in, check_out);
        record
    }

    async fn put(store: &MemoryAttendanceStore, record: AttendanceRecord) {
        let (id, date) = (record.employee_id, record.date);
        let mutator: Mutator = Box::new(move |_| Ok(record.clone()));
        store.upsert_for_day(id, date, mutator).await.unwrap();
    }

    #[test]
    fn average_is_zero_without_attended_records() {
        let records = vec![
            AttendanceRecord::new(1, d(5), AttendanceStatus::Absent),
            AttendanceRecord::new(1, d(6), AttendanceStatus::Leave),
        ];
        let stats: AttendanceStats = records.iter().collect();

        assert_eq!(stats.average_work_hours, 0.0);
        assert_eq!(stats.total_work_hours, 0.0);
        assert_eq!(stats.total_records, 2);
        assert_eq!(AttendanceStats::default().average_work_hours, 0.0);
    }

    #[actix_web::test]
    async fn week_with_mixed_statuses() {
        let store = Arc::new(MemoryAttendanceStore::new());
        for day in 5..=9 {
            put(&store, worked(1, d(day), AttendanceStatus::Present, 8)).await;
        }
        put(&store, AttendanceRecord::new(1, d(10), AttendanceStatus::Absent)).await;
        put(&store, AttendanceRecord::new(1, d(11), AttendanceStatus::Leave)).await;
        // outside the window
        put(&store, worked(1, d(12), AttendanceStatus::Late, 2)).await;

        let aggregator = StatsAggregator::new(store, Duration::from_secs(5));
        let week = DateRange::new(d(5), d(11)).unwrap();
        let stats = aggregator.aggregate(RecordFilter::in_range(week)).await.unwrap();

        assert_eq!(stats.present, 5);
        assert_eq!(stats.absent, 1);
        assert_eq!(stats.leave, 1);
        assert_eq!(stats.late, 0);
        assert_eq!(stats.holiday, 0);
        assert_eq!(stats.total_records, 7);
        assert_eq!(stats.employees, 1);
        assert_eq!(stats.total_work_hours, 42.5);
        assert_eq!(stats.average_work_hours, 8.5);
    }

    #[actix_web::test]
    async fn counts_partition_the_records() {
        let store = Arc::new(MemoryAttendanceStore::new());
        put(&store, worked(1, d(5), AttendanceStatus::Late, 7)).await;
        put(&store, worked(2, d(5), AttendanceStatus::Present, 8)).await;
        put(&store, AttendanceRecord::new(3, d(5), AttendanceStatus::Holiday)).await;
        put(&store, AttendanceRecord::new(4, d(6), AttendanceStatus::Absent)).await;

        let aggregator = StatsAggregator::new(store, Duration::from_secs(5));
        let stats = aggregator.aggregate(RecordFilter::default()).await.unwrap();

        let partition: u64 = [
            AttendanceStatus::Present,
            AttendanceStatus::Late,
            AttendanceStatus::Absent,
            AttendanceStatus::Leave,
            AttendanceStatus::Holiday,
        ]
        .into_iter()
        .map(|s| stats.count(s))
        .sum();
        assert_eq!(partition, stats.total_records);
        assert_eq!(stats.total_records, 4);
        assert_eq!(stats.employees, 4);
        assert_eq!(stats.total_work_hours, 16.0);
        assert_eq!(stats.average_work_hours, 8.0);
    }

    struct StalledStore;

    #[async_trait]
    impl AttendanceStore for StalledStore {
        async fn upsert_for_day(
            &self,
            _: u64,
            _: NaiveDate,
            _: Mutator,
        ) -> Result<AttendanceRecord, AttendanceError> {
            Err(AttendanceError::storage("read only"))
        }

        async fn get(&self, _: u64, _: NaiveDate) -> Result<Option<AttendanceRecord>, AttendanceError> {
            Ok(None)
        }

        fn query(&self, _: RecordFilter) -> RecordStream<'_> {
            Box::pin(futures::stream::pending::<Result<AttendanceRecord, AttendanceError>>())
        }
    }

    #[actix_web::test]
    async fn stalled_scan_times_out() {
        let aggregator = StatsAggregator::new(Arc::new(StalledStore), Duration::from_millis(20));
        let result = aggregator.aggregate(RecordFilter::default()).await;
        assert_eq!(result, Err(AttendanceError::Timeout("attendance stats query")));
    }
}
