use crate::attendance::service::{CheckRequest, RecordQuery, StatsQuery};
use crate::attendance::{AttendanceError, AttendanceService};
use crate::auth::session::Session;
use crate::model::attendance::AttendanceRecord;
use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct TodayResponse {
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub date: NaiveDate,
    /// `null` until the employee checks in or is classified for the day
    pub record: Option<AttendanceRecord>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SweepRequest {
    /// Day to sweep; defaults to today
    #[schema(example = "2026-01-05", format = "date", value_type = Option<String>)]
    pub date: Option<NaiveDate>,
}

/// Optional JSON body: an empty body means defaults, anything else must parse.
fn optional_json<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, AttendanceError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| AttendanceError::MalformedBody(e.to_string()))
}

/* =========================
Check-in
========================= */
#[utoipa::path(
    post,
    path = "/api/attendance/check-in",
    request_body(
        content = CheckRequest,
        description = "Optional timestamp, location and notes",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Checked in (repeated check-ins return the same record)", body = AttendanceRecord),
        (status = 400, description = "Malformed body, or timestamp in the future or outside today", body = Object, example = json!({
            "error": "future_timestamp",
            "message": "timestamp 2026-01-05 10:00:00 UTC is ahead of the server clock (2026-01-05 08:00:00 UTC)"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No employee profile"),
        (status = 409, description = "Day already closed or classified as leave/holiday"),
        (status = 503, description = "Storage unavailable")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn check_in(
    session: Session,
    service: web::Data<AttendanceService>,
    body: web::Bytes,
) -> actix_web::Result<impl Responder> {
    let employee_id = session.employee_id()?;
    let request: CheckRequest = optional_json(&body)?;

    let record = service.check_in(employee_id, request).await?;
    Ok(HttpResponse::Ok().json(record))
}

/* =========================
Check-out
========================= */
#[utoipa::path(
    post,
    path = "/api/attendance/check-out",
    request_body(
        content = CheckRequest,
        description = "Optional timestamp, location and notes",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Checked out", body = AttendanceRecord),
        (status = 400, description = "Malformed body, check-out earlier than check-in, or timestamp in the future or outside today"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No employee profile"),
        (status = 404, description = "No check-in found for the day", body = Object, example = json!({
            "error": "no_open_check_in",
            "message": "no open check-in for employee 42 on 2026-01-05"
        })),
        (status = 409, description = "Already checked out"),
        (status = 503, description = "Storage unavailable")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn check_out(
    session: Session,
    service: web::Data<AttendanceService>,
    body: web::Bytes,
) -> actix_web::Result<impl Responder> {
    let employee_id = session.employee_id()?;
    let request: CheckRequest = optional_json(&body)?;

    let record = service.check_out(employee_id, request).await?;
    Ok(HttpResponse::Ok().json(record))
}

/* =========================
Today's record of the caller
========================= */
#[utoipa::path(
    get,
    path = "/api/attendance/today",
    responses(
        (status = 200, description = "Today's record, if any", body = TodayResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No employee profile")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn today(
    session: Session,
    service: web::Data<AttendanceService>,
) -> actix_web::Result<impl Responder> {
    let employee_id = session.employee_id()?;
    let record = service.today_record(employee_id).await?;

    Ok(HttpResponse::Ok().json(TodayResponse {
        date: service.today(),
        record,
    }))
}

/* =========================
List records
========================= */
#[utoipa::path(
    get,
    path = "/api/attendance",
    params(RecordQuery),
    responses(
        (status = 200, description = "Paginated attendance records ordered by date then employee", body = crate::attendance::service::AttendanceListResponse),
        (status = 400, description = "Invalid filter or range too long"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Employees may only list their own records"),
        (status = 503, description = "Query timed out")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn list_records(
    session: Session,
    service: web::Data<AttendanceService>,
    query: web::Query<RecordQuery>,
) -> actix_web::Result<impl Responder> {
    let mut query = query.into_inner();
    query.employee_id = session.scope_employee(query.employee_id)?;

    let page = service.query_records(query).await?;
    Ok(HttpResponse::Ok().json(page))
}

/* =========================
Statistics
========================= */
#[utoipa::path(
    get,
    path = "/api/attendance/stats",
    params(StatsQuery),
    responses(
        (status = 200, description = "Status counts and work hours over the window", body = crate::attendance::service::StatsResponse),
        (status = 400, description = "Missing, inverted or too long window"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Employees may only read their own statistics"),
        (status = 503, description = "Query timed out")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn stats(
    session: Session,
    service: web::Data<AttendanceService>,
    query: web::Query<StatsQuery>,
) -> actix_web::Result<impl Responder> {
    let mut query = query.into_inner();
    query.employee_id = session.scope_employee(query.employee_id)?;

    let stats = service.get_stats(query).await?;
    Ok(HttpResponse::Ok().json(stats))
}

/* =========================
Absent sweep (HR / Admin)
========================= */
#[utoipa::path(
    post,
    path = "/api/attendance/absent-sweep",
    request_body(
        content = SweepRequest,
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Active employees without a record were marked absent", body = crate::attendance::service::SweepReport),
        (status = 400, description = "Malformed body"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "HR/Admin only")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn absent_sweep(
    session: Session,
    service: web::Data<AttendanceService>,
    body: web::Bytes,
) -> actix_web::Result<impl Responder> {
    session.require_manager()?;
    let request: SweepRequest = optional_json(&body)?;
    let date = request.date.unwrap_or_else(|| service.today());

    info!(user_id = session.user_id(), %date, "Manual absent sweep requested");
    let report = service.sweep_absent(date).await?;
    Ok(HttpResponse::Ok().json(report))
}
