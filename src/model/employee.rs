use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Display fields of an employee, read from the employee directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "employee_id": 1000,
        "employee_code": "EMP-001",
        "name": "John Doe",
        "department_id": 10,
        "department_name": "Engineering"
    })
)]
pub struct EmployeeProfile {
    #[schema(example = 1000)]
    pub employee_id: u64,

    #[schema(example = "EMP-001")]
    pub employee_code: String,

    #[schema(example = "John Doe")]
    pub name: String,

    #[schema(example = 10)]
    pub department_id: u64,

    #[schema(example = "Engineering", nullable = true)]
    pub department_name: Option<String>,
}
