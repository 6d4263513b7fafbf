use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;

use super::EmployeeDirectory;
use crate::attendance::error::AttendanceError;
use crate::model::employee::EmployeeProfile;

/// Keeps resolved profiles in memory; search and listing go straight through.
pub struct CachedDirectory<D> {
    inner: D,
    profiles: Cache<u64, EmployeeProfile>,
}

impl<D: EmployeeDirectory> CachedDirectory<D> {
    pub fn new(inner: D, ttl: Duration) -> Self {
        let profiles = Cache::builder()
            .max_capacity(50_000)
            .time_to_live(ttl)
            .build();
        Self { inner, profiles }
    }
}

#[async_trait]
impl<D: EmployeeDirectory> EmployeeDirectory for CachedDirectory<D> {
    async fn resolve(&self, employee_id: u64) -> Result<Option<EmployeeProfile>, AttendanceError> {
        if let Some(profile) = self.profiles.get(&employee_id).await {
            return Ok(Some(profile));
        }

        let profile = self.inner.resolve(employee_id).await?;
        if let Some(p) = &profile {
            self.profiles.insert(employee_id, p.clone()).await;
        }
        Ok(profile)
    }

    async fn search(
        &self,
        text: Option<&str>,
        department_id: Option<u64>,
    ) -> Result<BTreeSet<u64>, AttendanceError> {
        self.inner.search(text, department_id).await
    }

    async fn active_employee_ids(&self) -> Result<Vec<u64>, AttendanceError> {
        self.inner.active_employee_ids().await
    }
}
