use std::time::Duration;

use actix_web::rt::time::sleep;
use actix_web::web::Data;
use chrono::{DateTime, FixedOffset, NaiveTime, TimeZone, Utc};
use tracing::{error, info};

use super::service::AttendanceService;

/// Next instant, strictly after `now`, at which the local wall clock reads `at`.
pub fn next_run(now: DateTime<Utc>, offset: FixedOffset, at: NaiveTime) -> DateTime<Utc> {
    let local = now.with_timezone(&offset).naive_local();
    let mut candidate = local.date().and_time(at);
    if candidate <= local {
        candidate += chrono::Duration::days(1);
    }
    let shift = chrono::Duration::seconds(i64::from(offset.local_minus_utc()));
    Utc.from_utc_datetime(&(candidate - shift))
}

/// Marks absences once a day at local time `at` for the day then in progress.
pub fn spawn_daily_sweep(service: Data<AttendanceService>, at: NaiveTime) {
    actix_web::rt::spawn(async move {
        info!(%at, "Absent sweep scheduled");
        loop {
            let clock = service.clock();
            let now = clock.now();
            let wake = next_run(now, clock.offset(), at);
            let wait = (wake - now).to_std().unwrap_or(Duration::ZERO);
            sleep(wait).await;

            let date = service.clock().today();
            if let Err(e) = service.sweep_absent(date).await {
                error!(%date, error = %e, "Scheduled absent sweep failed");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn next_run_is_later_today_or_tomorrow() {
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap();
        let utc = FixedOffset::east_opt(0).unwrap();

        assert_eq!(
            next_run(now, utc, t(23, 30)),
            Utc.with_ymd_and_hms(2026, 1, 5, 23, 30, 0).unwrap()
        );
        assert_eq!(
            next_run(now, utc, t(12, 0)),
            Utc.with_ymd_and_hms(2026, 1, 6, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn next_run_respects_offset() {
        // 12:00 UTC is 17:30 in UTC+05:30
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap();
        let ist = FixedOffset::east_opt(5 * 3600 + 1800).unwrap();

        assert_eq!(
            next_run(now, ist, t(23, 0)),
            Utc.with_ymd_and_hms(2026, 1, 5, 17, 30, 0).unwrap()
        );
        assert_eq!(
            next_run(now, ist, t(9, 0)),
            Utc.with_ymd_and_hms(2026, 1, 6, 3, 30, 0).unwrap()
        );
    }
}
