use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::attendance::error::AttendanceError;
use crate::model::employee::EmployeeProfile;

pub mod cache;
pub mod mysql;

pub use cache::CachedDirectory;
pub use mysql::MySqlEmployeeDirectory;

/// Read-only view of the employee records owned by the HR service.
#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    async fn resolve(&self, employee_id: u64) -> Result<Option<EmployeeProfile>, AttendanceError>;

    /// Ids of employees whose name, email or code contains `text`,
    /// optionally restricted to one department. Both filters are optional.
    async fn search(
        &self,
        text: Option<&str>,
        department_id: Option<u64>,
    ) -> Result<BTreeSet<u64>, AttendanceError>;

    /// Employees expected to record attendance.
    async fn active_employee_ids(&self) -> Result<Vec<u64>, AttendanceError>;
}
