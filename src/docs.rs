use crate::api::attendance::{SweepRequest, TodayResponse};
use crate::attendance::period::{DateRange, Period};
use crate::attendance::service::{
    AttendanceListResponse, AttendanceView, CheckRequest, StatsResponse, SweepReport,
};
use crate::model::attendance::{AttendanceRecord, AttendanceStats, AttendanceStatus};
use crate::model::employee::EmployeeProfile;
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HRM Attendance API",
        version = "1.0.0",
        description = r#"
## Attendance Service

Daily attendance for the **Human Resource Management (HRM)** system.

### 🔹 Key Features
- **Check-in / Check-out**
  - One record per employee per day; repeated check-ins are harmless
  - Late arrivals are classified against the configured threshold
- **Records**
  - Filter by date range, employee, department, status or free text
- **Statistics**
  - Status counts and work hours per day, week, month, year or custom range
- **Absent sweep**
  - Marks active employees without a record as absent (HR/Admin)

### 🔐 Security
All endpoints require a **JWT Bearer** access token.
Employees only see their own attendance; **HR**, **Admin** and **System** see everyone.

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::today,
        crate::api::attendance::list_records,
        crate::api::attendance::stats,
        crate::api::attendance::absent_sweep
    ),
    components(
        schemas(
            AttendanceStatus,
            AttendanceRecord,
            AttendanceStats,
            AttendanceView,
            AttendanceListResponse,
            CheckRequest,
            DateRange,
            EmployeeProfile,
            Period,
            StatsResponse,
            SweepReport,
            SweepRequest,
            TodayResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Attendance", description = "Attendance management APIs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_attendance_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/attendance",
            "/api/attendance/check-in",
            "/api/attendance/check-out",
            "/api/attendance/today",
            "/api/attendance/stats",
            "/api/attendance/absent-sweep",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{path} missing");
        }
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
