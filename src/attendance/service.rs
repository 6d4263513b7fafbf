use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use actix_web::rt::time::timeout;
use chrono::{DateTime, NaiveDate, Utc};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};
use utoipa::{IntoParams, ToSchema};

use super::clock::Clock;
use super::engine::{AbsenceMark, AttendanceEngine, AttendancePolicy, CheckDetails};
use super::error::AttendanceError;
use super::period::{DateRange, Period};
use super::retry::RetryPolicy;
use super::stats::StatsAggregator;
use super::store::{AttendanceStore, RecordFilter};
use crate::directory::EmployeeDirectory;
use crate::model::attendance::{AttendanceRecord, AttendanceStats, AttendanceStatus};
use crate::model::employee::EmployeeProfile;

const DEFAULT_PER_PAGE: u32 = 20;
const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CheckRequest {
    /// Defaults to the server clock.
    #[schema(example = "2026-01-05T08:55:00Z", value_type = Option<String>, format = "date-time")]
    pub at: Option<DateTime<Utc>>,
    #[schema(example = "HQ - Gate 2")]
    pub location: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RecordQuery {
    /// Single day; shorthand for start_date = end_date.
    #[param(value_type = Option<String>, format = Date)]
    pub date: Option<NaiveDate>,
    #[param(value_type = Option<String>, format = Date)]
    pub start_date: Option<NaiveDate>,
    #[param(value_type = Option<String>, format = Date)]
    pub end_date: Option<NaiveDate>,
    pub employee_id: Option<u64>,
    pub department_id: Option<u64>,
    #[param(inline)]
    pub status: Option<AttendanceStatus>,
    /// Matches employee name, email or code.
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatsQuery {
    #[param(value_type = Option<String>, format = Date)]
    pub start_date: Option<NaiveDate>,
    #[param(value_type = Option<String>, format = Date)]
    pub end_date: Option<NaiveDate>,
    /// Used when no explicit range is given.
    #[param(inline)]
    pub period: Option<Period>,
    /// Reference day for `period`; defaults to today.
    #[param(value_type = Option<String>, format = Date)]
    pub date: Option<NaiveDate>,
    pub employee_id: Option<u64>,
    pub department_id: Option<u64>,
}

/// A record joined with the employee fields the UI displays.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AttendanceView {
    #[serde(flatten)]
    pub record: AttendanceRecord,
    #[schema(example = "John Doe")]
    pub employee_name: Option<String>,
    #[schema(example = "EMP-001")]
    pub employee_code: Option<String>,
    #[schema(example = 10)]
    pub department_id: Option<u64>,
    #[schema(example = "Engineering")]
    pub department_name: Option<String>,
}

impl AttendanceView {
    fn join(record: AttendanceRecord, profile: Option<&EmployeeProfile>) -> Self {
        Self {
            record,
            employee_name: profile.map(|p| p.name.clone()),
            employee_code: profile.map(|p| p.employee_code.clone()),
            department_id: profile.map(|p| p.department_id),
            department_name: profile.and_then(|p| p.department_name.clone()),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AttendanceListResponse {
    pub data: Vec<AttendanceView>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 42)]
    pub total: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    pub range: DateRange,
    #[serde(flatten)]
    pub stats: AttendanceStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SweepReport {
    #[schema(example = "2026-01-05", value_type = String, format = "date")]
    pub date: NaiveDate,
    pub marked: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Tunables of the attendance service, taken from `Config`.
#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub policy: AttendancePolicy,
    pub store_timeout: Duration,
    pub query_timeout: Duration,
    pub max_range_days: i64,
    pub retry: RetryPolicy,
}

/// Entry point for the transport layer: mutations go through the engine,
/// reads through the store and the aggregator.
pub struct AttendanceService {
    engine: AttendanceEngine,
    aggregator: StatsAggregator,
    store: Arc<dyn AttendanceStore>,
    directory: Arc<dyn EmployeeDirectory>,
    clock: Arc<dyn Clock>,
    settings: ServiceSettings,
}

impl AttendanceService {
    pub fn new(
        store: Arc<dyn AttendanceStore>,
        directory: Arc<dyn EmployeeDirectory>,
        clock: Arc<dyn Clock>,
        settings: ServiceSettings,
    ) -> Self {
        let engine = AttendanceEngine::new(
            store.clone(),
            clock.clone(),
            settings.policy,
            settings.store_timeout,
        );
        let aggregator = StatsAggregator::new(store.clone(), settings.query_timeout);
        Self {
            engine,
            aggregator,
            store,
            directory,
            clock,
            settings,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    #[instrument(name = "service_check_in", skip(self, request))]
    pub async fn check_in(
        &self,
        employee_id: u64,
        request: CheckRequest,
    ) -> Result<AttendanceRecord, AttendanceError> {
        let retry = self.settings.retry;
        retry
            .run("employee lookup", || self.directory.resolve(employee_id))
            .await?
            .ok_or(AttendanceError::UnknownEmployee(employee_id))?;

        // Fixed once so every retry submits the same instant.
        let at = request.at.unwrap_or_else(|| self.clock.now());
        let details = CheckDetails {
            location: request.location,
            notes: request.notes,
        };

        retry
            .run("check-in", || self.engine.check_in(employee_id, at, details.clone()))
            .await
    }

    #[instrument(name = "service_check_out", skip(self, request))]
    pub async fn check_out(
        &self,
        employee_id: u64,
        request: CheckRequest,
    ) -> Result<AttendanceRecord, AttendanceError> {
        let at = request.at.unwrap_or_else(|| self.clock.now());
        let details = CheckDetails {
            location: request.location,
            notes: request.notes,
        };

        self.settings
            .retry
            .run("check-out", || self.engine.check_out(employee_id, at, details.clone()))
            .await
    }

    pub async fn today_record(
        &self,
        employee_id: u64,
    ) -> Result<Option<AttendanceRecord>, AttendanceError> {
        self.engine.today(employee_id).await
    }

    fn record_range(&self, query: &RecordQuery) -> Result<Option<DateRange>, AttendanceError> {
        let range = match (query.date, query.start_date, query.end_date) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
                return Err(AttendanceError::InvalidQuery(
                    "use either date or start_date/end_date".to_string(),
                ));
            }
            (Some(date), None, None) => Some(DateRange::day(date)),
            (None, Some(start), Some(end)) => Some(DateRange::new(start, end)?),
            (None, Some(start), None) => Some(DateRange::new(start, self.today())?),
            (None, None, Some(_)) => {
                return Err(AttendanceError::InvalidQuery(
                    "end_date requires start_date".to_string(),
                ));
            }
            (None, None, None) => None,
        };
        range
            .map(|r| r.ensure_within(self.settings.max_range_days))
            .transpose()
    }

    fn stats_range(&self, query: &StatsQuery) -> Result<DateRange, AttendanceError> {
        let range = match (query.start_date, query.end_date, query.period) {
            (Some(start), Some(end), None) => DateRange::new(start, end)?,
            (None, None, Some(period)) => {
                period.range_containing(query.date.unwrap_or_else(|| self.today()))
            }
            (None, None, None) => {
                return Err(AttendanceError::InvalidQuery(
                    "start_date and end_date, or period, are required".to_string(),
                ));
            }
            _ => {
                return Err(AttendanceError::InvalidQuery(
                    "use either start_date/end_date or period".to_string(),
                ));
            }
        };
        range.ensure_within(self.settings.max_range_days)
    }

    /// Resolves department and free-text filters into an id set.
    async fn employee_selection(
        &self,
        search: Option<&str>,
        department_id: Option<u64>,
    ) -> Result<Option<BTreeSet<u64>>, AttendanceError> {
        let search = search.map(str::trim).filter(|s| !s.is_empty());
        if search.is_none() && department_id.is_none() {
            return Ok(None);
        }
        let ids = self
            .settings
            .retry
            .run("employee search", || self.directory.search(search, department_id))
            .await?;
        debug!(matches = ids.len(), "Resolved employee selection");
        Ok(Some(ids))
    }

    #[instrument(name = "service_query_records", skip(self))]
    pub async fn query_records(
        &self,
        query: RecordQuery,
    ) -> Result<AttendanceListResponse, AttendanceError> {
        let page = query.page.unwrap_or(1).max(1);
        let per_page = query
            .per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE);
        let offset = u64::from(page - 1) * u64::from(per_page);

        let filter = RecordFilter {
            date_range: self.record_range(&query)?,
            employee_id: query.employee_id,
            employee_ids: self
                .employee_selection(query.search.as_deref(), query.department_id)
                .await?,
            status: query.status,
        };

        let mut response = AttendanceListResponse {
            data: Vec::new(),
            page,
            per_page,
            total: 0,
        };
        if filter.is_empty_selection() {
            return Ok(response);
        }

        let scan = self.store.query(filter).try_fold(
            (0u64, Vec::new()),
            |(total, mut rows), record| async move {
                if total >= offset && rows.len() < per_page as usize {
                    rows.push(record);
                }
                Ok((total + 1, rows))
            },
        );
        let (total, rows) = timeout(self.settings.query_timeout, scan)
            .await
            .map_err(|_| AttendanceError::Timeout("attendance record query"))??;

        let ids: BTreeSet<u64> = rows.iter().map(|r| r.employee_id).collect();
        let mut profiles = BTreeMap::new();
        for id in ids {
            if let Some(profile) = self.directory.resolve(id).await? {
                profiles.insert(id, profile);
            }
        }

        response.total = total;
        response.data = rows
            .into_iter()
            .map(|r| {
                let profile = profiles.get(&r.employee_id);
                AttendanceView::join(r, profile)
            })
            .collect();
        Ok(response)
    }

    #[instrument(name = "service_stats", skip(self))]
    pub async fn get_stats(&self, query: StatsQuery) -> Result<StatsResponse, AttendanceError> {
        let range = self.stats_range(&query)?;
        let filter = RecordFilter {
            date_range: Some(range),
            employee_id: query.employee_id,
            employee_ids: self.employee_selection(None, query.department_id).await?,
            status: None,
        };

        let stats = self
            .settings
            .retry
            .run("stats", || self.aggregator.aggregate(filter.clone()))
            .await?;
        Ok(StatsResponse { range, stats })
    }

    /// Marks every active employee without a record on `date` as absent.
    #[instrument(name = "service_absent_sweep", skip(self))]
    pub async fn sweep_absent(&self, date: NaiveDate) -> Result<SweepReport, AttendanceError> {
        let employees = self.directory.active_employee_ids().await?;
        let mut report = SweepReport {
            date,
            marked: 0,
            skipped: 0,
            failed: 0,
        };

        for employee_id in employees {
            let result = self
                .settings
                .retry
                .run("absent mark", || self.engine.mark_absent(employee_id, date))
                .await;
            match result {
                Ok(AbsenceMark::Marked) => report.marked += 1,
                Ok(AbsenceMark::Skipped) => report.skipped += 1,
                Err(e) => {
                    error!(employee_id, error = %e, "Failed to mark absence");
                    report.failed += 1;
                }
            }
        }

        info!(
            marked = report.marked,
            skipped = report.skipped,
            failed = report.failed,
            "Absent sweep finished"
        );
        Ok(report)
    }
}
