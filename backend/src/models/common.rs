use serde::Deserialize;
use time::{Date, Duration};

/// Query params for queue-style listings such as pending approvals.
#[derive(Debug, Default, Deserialize)]
pub struct PaginationParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PaginationParams {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(10).clamp(1, 100)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

/// Day-bounded listing filter. Missing bounds are filled by [`Self::resolve`].
#[derive(Debug, Default, Deserialize)]
pub struct DateRangeParams {
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl DateRangeParams {
    /// One row per day, so a page never needs more than a year.
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(31).clamp(1, 366)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    /// Start defaults to the first of `today`'s month. `None` when the range
    /// runs backwards.
    pub fn resolve(&self, today: Date, default_end: impl FnOnce(Date) -> Date) -> Option<(Date, Date)> {
        let from = self.start_date.unwrap_or_else(|| first_of_month(today));
        let to = self.end_date.unwrap_or_else(|| default_end(from));
        (to >= from).then_some((from, to))
    }
}

pub fn first_of_month(date: Date) -> Date {
    date.replace_day(1).unwrap_or(date)
}

pub fn end_of_month(date: Date) -> Date {
    let days = time::util::days_in_year_month(date.year(), date.month());
    date.replace_day(days).unwrap_or(date + Duration::days(30))
}
