use std::collections::BTreeSet;

use async_trait::async_trait;
use sqlx::MySqlPool;
use tracing::debug;

use super::EmployeeDirectory;
use crate::attendance::error::AttendanceError;
use crate::model::employee::EmployeeProfile;

const RESOLVE: &str = r#"
    SELECT
        e.id AS employee_id,
        COALESCE(e.employee_code, '') AS employee_code,
        CONCAT_WS(' ', e.first_name, e.last_name) AS name,
        e.department_id,
        d.name AS department_name
    FROM employees e
    LEFT JOIN departments d ON d.id = e.department_id
    WHERE e.id = ?
"#;

const SEARCH: &str = r#"
    SELECT e.id
    FROM employees e
    WHERE (? IS NULL OR e.department_id = ?)
      AND (? IS NULL
           OR e.first_name LIKE ?
           OR e.last_name LIKE ?
           OR e.email LIKE ?
           OR e.employee_code LIKE ?)
"#;

const ACTIVE: &str = r#"
    SELECT id FROM employees WHERE status IS NULL OR status = 'active' ORDER BY id
"#;

/// Reads the `employees` and `departments` tables of the HR database.
#[derive(Clone)]
pub struct MySqlEmployeeDirectory {
    pool: MySqlPool,
}

impl MySqlEmployeeDirectory {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EmployeeDirectory for MySqlEmployeeDirectory {
    async fn resolve(&self, employee_id: u64) -> Result<Option<EmployeeProfile>, AttendanceError> {
        let profile = sqlx::query_as::<_, EmployeeProfile>(RESOLVE)
            .bind(employee_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(profile)
    }

    async fn search(
        &self,
        text: Option<&str>,
        department_id: Option<u64>,
    ) -> Result<BTreeSet<u64>, AttendanceError> {
        let like = text.map(|t| format!("%{}%", t.trim()));
        debug!(?like, ?department_id, "Searching employee directory");

        let ids = sqlx::query_scalar::<_, u64>(SEARCH)
            .bind(department_id)
            .bind(department_id)
            .bind(like.clone())
            .bind(like.clone())
            .bind(like.clone())
            .bind(like.clone())
            .bind(like)
            .fetch_all(&self.pool)
            .await?;

        Ok(ids.into_iter().collect())
    }

    async fn active_employee_ids(&self) -> Result<Vec<u64>, AttendanceError> {
        let ids = sqlx::query_scalar::<_, u64>(ACTIVE)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }
}
