use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};

/// Source of the current instant and of calendar-day boundaries.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Offset that defines where calendar days start and end.
    fn offset(&self) -> FixedOffset;

    fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset()).date_naive()
    }

    fn local_time(&self, at: DateTime<Utc>) -> NaiveTime {
        at.with_timezone(&self.offset()).time()
    }

    fn today(&self) -> NaiveDate {
        self.local_date(self.now())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}
