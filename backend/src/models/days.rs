//! Fixed-granularity quantities.
//!
//! Leave is counted in half days and worked time in hundredths of an hour.
//! Both are stored as integers so balance arithmetic never drifts; on the
//! wire they are plain JSON numbers (`1.5`, `7.25`).

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// A number of leave days with 0.5 granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Days(i64);

impl Days {
    pub const ZERO: Days = Days(0);
    pub const HALF: Days = Days(1);

    pub const fn from_halves(halves: i64) -> Self {
        Self(halves)
    }

    pub const fn whole(days: i64) -> Self {
        Self(days * 2)
    }

    pub const fn halves(self) -> i64 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 2.0
    }

    /// Rounds down to a whole number of days.
    pub const fn floor_whole(self) -> Self {
        Self(self.0.div_euclid(2) * 2)
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl Add for Days {
    type Output = Days;
    fn add(self, rhs: Days) -> Days {
        Days(self.0 + rhs.0)
    }
}

impl Sub for Days {
    type Output = Days;
    fn sub(self, rhs: Days) -> Days {
        Days(self.0 - rhs.0)
    }
}

impl Neg for Days {
    type Output = Days;
    fn neg(self) -> Days {
        Days(-self.0)
    }
}

impl AddAssign for Days {
    fn add_assign(&mut self, rhs: Days) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Days {
    fn sub_assign(&mut self, rhs: Days) {
        self.0 -= rhs.0;
    }
}

impl Sum for Days {
    fn sum<I: Iterator<Item = Days>>(iter: I) -> Days {
        iter.fold(Days::ZERO, Add::add)
    }
}

impl fmt::Display for Days {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_f64())
    }
}

impl Serialize for Days {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Days {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = f64::deserialize(deserializer)?;
        let halves = raw * 2.0;
        if !halves.is_finite() || halves.fract() != 0.0 {
            return Err(serde::de::Error::custom(format!(
                "{raw} is not a multiple of half a day"
            )));
        }
        Ok(Days(halves as i64))
    }
}

/// Worked time in hours, rounded to two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hours(i64);

const MILLIS_PER_HUNDREDTH: i128 = 36_000;

impl Hours {
    pub const ZERO: Hours = Hours(0);

    pub const fn from_hundredths(hundredths: i64) -> Self {
        Self(hundredths)
    }

    pub const fn whole(hours: i64) -> Self {
        Self(hours * 100)
    }

    pub const fn hundredths(self) -> i64 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Converts a span to hours, rounding half away from zero at the second decimal.
    pub fn from_duration(span: time::Duration) -> Self {
        let millis = span.whole_milliseconds();
        let half = MILLIS_PER_HUNDREDTH / 2;
        let rounded = if millis >= 0 {
            (millis + half) / MILLIS_PER_HUNDREDTH
        } else {
            (millis - half) / MILLIS_PER_HUNDREDTH
        };
        Self(rounded as i64)
    }
}

impl Add for Hours {
    type Output = Hours;
    fn add(self, rhs: Hours) -> Hours {
        Hours(self.0 + rhs.0)
    }
}

impl Sum for Hours {
    fn sum<I: Iterator<Item = Hours>>(iter: I) -> Hours {
        iter.fold(Hours::ZERO, Add::add)
    }
}

impl fmt::Display for Hours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.as_f64())
    }
}

impl Serialize for Hours {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Hours {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = f64::deserialize(deserializer)?;
        if !raw.is_finite() {
            return Err(serde::de::Error::custom("hours must be finite"));
        }
        Ok(Hours((raw * 100.0).round() as i64))
    }
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;

    #[test]
    fn days_arithmetic_keeps_half_granularity() {
        let twelve = Days::whole(12);
        assert_eq!(twelve - Days::whole(3), Days::whole(9));
        assert_eq!(Days::whole(1) + Days::HALF, Days::from_halves(3));
        assert_eq!(Days::from_halves(7).floor_whole(), Days::whole(3));
        assert_eq!([Days::HALF, Days::HALF, Days::whole(2)].into_iter().sum::<Days>(), Days::whole(3));
        assert!((Days::ZERO - Days::HALF).is_negative());
    }

    #[test]
    fn days_serialize_as_plain_numbers() {
        assert_eq!(serde_json::to_string(&Days::from_halves(3)).unwrap(), "1.5");
        assert_eq!(serde_json::to_string(&Days::whole(12)).unwrap(), "12.0");
        assert_eq!(serde_json::from_str::<Days>("2.5").unwrap(), Days::from_halves(5));
        assert!(serde_json::from_str::<Days>("0.25").is_err());
    }

    #[test]
    fn quarter_day_accrual_rates_are_refused() {
        let err = serde_json::from_str::<Days>("1.25").unwrap_err();
        assert!(err.to_string().contains("not a multiple of half a day"));
        assert_eq!(serde_json::from_str::<Days>("1.5").unwrap(), Days::from_halves(3));
    }

    #[test]
    fn hours_round_to_two_decimals() {
        assert_eq!(Hours::from_duration(Duration::hours(8)), Hours::whole(8));
        // 7h 20m = 7.333.. -> 7.33
        assert_eq!(Hours::from_duration(Duration::minutes(440)), Hours::from_hundredths(733));
        // 40m = 0.666.. -> 0.67
        assert_eq!(Hours::from_duration(Duration::minutes(40)), Hours::from_hundredths(67));
        // 18s is exactly half a hundredth: rounds up
        assert_eq!(Hours::from_duration(Duration::seconds(18)), Hours::from_hundredths(1));
        assert_eq!(Hours::from_duration(Duration::seconds(17)), Hours::ZERO);
    }

    #[test]
    fn hours_serde() {
        assert_eq!(serde_json::to_string(&Hours::from_hundredths(733)).unwrap(), "7.33");
        assert_eq!(serde_json::from_str::<Hours>("4.5").unwrap(), Hours::from_hundredths(450));
    }
}
