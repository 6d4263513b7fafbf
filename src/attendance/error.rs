use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use chrono::{DateTime, NaiveDate, Utc};
use derive_more::Display;
use serde_json::json;

use crate::model::attendance::AttendanceStatus;

/// Coarse classification the transport and the retry layer act on.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Forbidden,
    Unavailable,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        self == ErrorKind::Unavailable
    }
}

#[derive(Debug, Display, Clone, PartialEq)]
pub enum AttendanceError {
    #[display(
        fmt = "check-out at {} precedes check-in at {}",
        at,
        check_in
    )]
    CheckOutBeforeCheckIn {
        check_in: DateTime<Utc>,
        at: DateTime<Utc>,
    },

    #[display(fmt = "timestamp {} is ahead of the server clock ({})", at, now)]
    FutureTimestamp { at: DateTime<Utc>, now: DateTime<Utc> },

    #[display(fmt = "timestamp {} does not fall on the current day ({})", at, today)]
    StaleTimestamp { at: DateTime<Utc>, today: NaiveDate },

    #[display(fmt = "malformed request body: {}", _0)]
    MalformedBody(String),

    #[display(fmt = "start date {} is after end date {}", start, end)]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[display(fmt = "date range spans {} days, limit is {}", days, max_days)]
    RangeTooLong { days: i64, max_days: i64 },

    #[display(
        fmt = "invalid record for employee {} on {}: {}",
        employee_id,
        date,
        reason
    )]
    InvalidRecord {
        employee_id: u64,
        date: NaiveDate,
        reason: String,
    },

    #[display(fmt = "invalid query: {}", _0)]
    InvalidQuery(String),

    #[display(fmt = "attendance on {} is already classified as {}", date, status)]
    AlreadyClassified {
        date: NaiveDate,
        status: AttendanceStatus,
    },

    #[display(fmt = "employee {} already checked out on {}", employee_id, date)]
    AlreadyCheckedOut { employee_id: u64, date: NaiveDate },

    #[display(fmt = "no open check-in for employee {} on {}", employee_id, date)]
    NoOpenCheckIn { employee_id: u64, date: NaiveDate },

    #[display(fmt = "unknown employee {}", _0)]
    UnknownEmployee(u64),

    #[display(fmt = "no employee profile linked to this account")]
    NoEmployeeProfile,

    #[display(fmt = "forbidden: {}", _0)]
    Forbidden(String),

    #[display(fmt = "attendance storage unavailable: {}", _0)]
    StorageUnavailable(String),

    #[display(fmt = "{} timed out", _0)]
    Timeout(&'static str),
}

impl std::error::Error for AttendanceError {}

impl AttendanceError {
    pub fn kind(&self) -> ErrorKind {
        use AttendanceError::*;
        match self {
            CheckOutBeforeCheckIn { .. }
            | FutureTimestamp { .. }
            | StaleTimestamp { .. }
            | MalformedBody(_)
            | InvalidRange { .. }
            | RangeTooLong { .. }
            | InvalidRecord { .. }
            | InvalidQuery(_) => ErrorKind::Validation,
            AlreadyClassified { .. } | AlreadyCheckedOut { .. } => ErrorKind::Conflict,
            NoOpenCheckIn { .. } | UnknownEmployee(_) => ErrorKind::NotFound,
            NoEmployeeProfile | Forbidden(_) => ErrorKind::Forbidden,
            StorageUnavailable(_) | Timeout(_) => ErrorKind::Unavailable,
        }
    }

    /// Stable machine-readable code for API clients.
    pub fn code(&self) -> &'static str {
        use AttendanceError::*;
        match self {
            CheckOutBeforeCheckIn { .. } => "check_out_before_check_in",
            FutureTimestamp { .. } => "future_timestamp",
            StaleTimestamp { .. } => "stale_timestamp",
            MalformedBody(_) => "malformed_body",
            InvalidRange { .. } => "invalid_range",
            RangeTooLong { .. } => "range_too_long",
            InvalidRecord { .. } => "invalid_record",
            InvalidQuery(_) => "invalid_query",
            AlreadyClassified { .. } => "already_classified",
            AlreadyCheckedOut { .. } => "already_checked_out",
            NoOpenCheckIn { .. } => "no_open_check_in",
            UnknownEmployee(_) => "unknown_employee",
            NoEmployeeProfile => "no_employee_profile",
            Forbidden(_) => "forbidden",
            StorageUnavailable(_) => "storage_unavailable",
            Timeout(_) => "timeout",
        }
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        AttendanceError::StorageUnavailable(err.to_string())
    }
}

impl From<sqlx::Error> for AttendanceError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!(error = %err, "Attendance storage error");
        AttendanceError::storage(err)
    }
}

impl ResponseError for AttendanceError {
    fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.code(),
            "message": self.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_http_status() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();

        let conflict = AttendanceError::AlreadyClassified {
            date,
            status: AttendanceStatus::Leave,
        };
        assert_eq!(conflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            conflict.to_string(),
            "attendance on 2026-01-05 is already classified as leave"
        );

        let missing = AttendanceError::NoOpenCheckIn {
            employee_id: 1,
            date,
        };
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(missing.code(), "no_open_check_in");

        assert_eq!(
            AttendanceError::Timeout("stats query").status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AttendanceError::NoEmployeeProfile.status_code(),
            StatusCode::FORBIDDEN
        );

        let stale = AttendanceError::StaleTimestamp {
            at: date.and_hms_opt(8, 0, 0).unwrap().and_utc(),
            today: date.succ_opt().unwrap(),
        };
        assert_eq!(stale.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(stale.code(), "stale_timestamp");
        assert_eq!(
            AttendanceError::MalformedBody("expected value".into()).code(),
            "malformed_body"
        );
    }

    #[test]
    fn only_unavailable_errors_are_retryable() {
        assert!(AttendanceError::storage("pool closed").kind().is_retryable());
        assert!(AttendanceError::Timeout("upsert").kind().is_retryable());
        assert!(!AttendanceError::UnknownEmployee(3).kind().is_retryable());
        assert!(!AttendanceError::InvalidQuery("x".into()).kind().is_retryable());
    }
}
