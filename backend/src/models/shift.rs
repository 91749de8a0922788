use serde::{Deserialize, Serialize};
use time::Time;
use uuid::Uuid;

use crate::calendar::WeeklyOffs;
use crate::models::days::Hours;

/// Working-hours policy attached to an employee through their shift.
/// Read-only from the engines' point of view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftPolicy {
    pub shift_id: Uuid,
    pub name: String,
    #[serde(with = "hhmm")]
    pub start_time: Time,
    #[serde(with = "hhmm")]
    pub end_time: Time,
    pub grace_minutes: i64,
    pub half_day_hours: Hours,
    pub weekly_offs: WeeklyOffs,
}

impl ShiftPolicy {
    /// Night shifts end on the calendar day after they start.
    pub fn crosses_midnight(&self) -> bool {
        self.end_time <= self.start_time
    }
}

/// `"HH:MM"` wall-clock times, the format shift definitions are entered in.
pub mod hhmm {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::{format_description::FormatItem, macros::format_description, Time};

    const FORMAT: &[FormatItem<'static>] = format_description!("[hour]:[minute]");

    pub fn parse(raw: &str) -> Result<Time, time::error::Parse> {
        Time::parse(raw, FORMAT)
    }

    pub fn serialize<S: Serializer>(value: &Time, serializer: S) -> Result<S::Ok, S::Error> {
        let formatted = value.format(FORMAT).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&formatted)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Time, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    /// Same format for optional fields.
    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use time::Time;

        pub fn serialize<S: Serializer>(value: &Option<Time>, serializer: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(t) => super::serialize(t, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Time>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|raw| super::parse(&raw).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::time;

    use super::*;

    #[test]
    fn policy_serializes_times_as_hhmm() {
        let policy = ShiftPolicy {
            shift_id: Uuid::nil(),
            name: "General".into(),
            start_time: time!(09:00),
            end_time: time!(18:00),
            grace_minutes: 15,
            half_day_hours: Hours::whole(4),
            weekly_offs: WeeklyOffs::WEEKEND,
        };
        let json = serde_json::to_value(&policy).unwrap();
        assert_eq!(json["start_time"], "09:00");
        assert_eq!(json["end_time"], "18:00");
        assert_eq!(json["weekly_offs"], serde_json::json!([0, 6]));

        let back: ShiftPolicy = serde_json::from_value(json).unwrap();
        assert_eq!(back, policy);
        assert!(!policy.crosses_midnight());
    }

    #[test]
    fn night_shift_crosses_midnight() {
        assert!(hhmm::parse("22:00").unwrap() > hhmm::parse("06:00").unwrap());
        assert!(hhmm::parse("25:00").is_err());
    }
}
