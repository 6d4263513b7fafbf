use std::future::Future;
use std::time::Duration;

use actix_web::rt::time::sleep;
use tracing::warn;

use super::error::AttendanceError;

/// Exponential backoff for errors whose kind is retryable.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub async fn run<T, F, Fut>(&self, op: &'static str, mut f: F) -> Result<T, AttendanceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttendanceError>>,
    {
        let attempts = self.attempts.max(1);
        let mut delay = self.backoff;
        let mut attempt = 1;

        loop {
            match f().await {
                Err(e) if e.kind().is_retryable() && attempt < attempts => {
                    warn!(op, attempt, error = %e, "Retrying after transient failure");
                    sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
