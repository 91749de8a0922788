//! Day arithmetic shared by the attendance and leave engines.
//!
//! Every "local day" in the system is a calendar date in one fixed UTC offset
//! (configured per deployment). Weekly-off sets use weekday indices where
//! `0` is Sunday and `6` is Saturday.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use time::{Date, Duration, OffsetDateTime, Time, UtcOffset};

/// Source of the current instant. Injected so tests can pin "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<OffsetDateTime>,
}

impl FixedClock {
    pub fn new(now: OffsetDateTime) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: OffsetDateTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Maps instants onto local calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    offset: UtcOffset,
}

impl Default for Calendar {
    fn default() -> Self {
        Self::new(UtcOffset::UTC)
    }
}

impl Calendar {
    pub const fn new(offset: UtcOffset) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> UtcOffset {
        self.offset
    }

    /// The local calendar day an instant falls on.
    pub fn local_date(&self, instant: OffsetDateTime) -> Date {
        instant.to_offset(self.offset).date()
    }

    /// Local midnight at the start of `date`.
    pub fn start_of_day(&self, date: Date) -> OffsetDateTime {
        date.midnight().assume_offset(self.offset)
    }

    /// Last representable instant of `date` (23:59:59.999999999 local).
    pub fn end_of_day(&self, date: Date) -> OffsetDateTime {
        self.start_of_day(date) + Duration::DAY - Duration::NANOSECOND
    }

    /// The instant a local wall-clock time occurs on `date`.
    pub fn at(&self, date: Date, time: Time) -> OffsetDateTime {
        date.with_time(time).assume_offset(self.offset)
    }
}

/// Set of weekday indices (0 = Sunday .. 6 = Saturday) an employee does not work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WeeklyOffs(u8);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("weekday index {0} is out of range 0-6")]
pub struct InvalidWeekday(pub u8);

impl WeeklyOffs {
    pub const NONE: WeeklyOffs = WeeklyOffs(0);

    /// Saturday and Sunday.
    pub const WEEKEND: WeeklyOffs = WeeklyOffs((1 << 0) | (1 << 6));

    pub fn from_indices<I>(indices: I) -> Result<Self, InvalidWeekday>
    where
        I: IntoIterator<Item = u8>,
    {
        let mut mask = 0u8;
        for idx in indices {
            if idx > 6 {
                return Err(InvalidWeekday(idx));
            }
            mask |= 1 << idx;
        }
        Ok(Self(mask))
    }

    pub fn indices(&self) -> Vec<u8> {
        (0..7).filter(|i| self.0 & (1 << i) != 0).collect()
    }

    pub fn contains_index(&self, idx: u8) -> bool {
        idx < 7 && self.0 & (1 << idx) != 0
    }

    pub fn is_off(&self, date: Date) -> bool {
        self.contains_index(weekday_index(date))
    }
}

impl Serialize for WeeklyOffs {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.indices().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for WeeklyOffs {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<u8>::deserialize(deserializer)?;
        WeeklyOffs::from_indices(raw).map_err(serde::de::Error::custom)
    }
}

pub fn weekday_index(date: Date) -> u8 {
    date.weekday().number_days_from_sunday()
}

/// Every date in the inclusive range `[from, to]`. Empty when `to < from`.
pub fn days_in_range(from: Date, to: Date) -> impl Iterator<Item = Date> {
    std::iter::successors(Some(from), |d| d.next_day()).take_while(move |d| *d <= to)
}

/// Number of dates in `[from, to]` that are not weekly-off days.
pub fn business_days(from: Date, to: Date, weekly_offs: WeeklyOffs) -> i64 {
    days_in_range(from, to)
        .filter(|d| !weekly_offs.is_off(*d))
        .count() as i64
}
