use serde::{Deserialize, Serialize};
use time::{Date, Duration, OffsetDateTime, Time};
use uuid::Uuid;
use validator::Validate;

use crate::calendar::Calendar;
use crate::models::days::Hours;
use crate::models::employee::EmployeeSummary;
use crate::models::shift::{hhmm, ShiftPolicy};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "attendance_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Absent,
    HalfDay,
    OnLeave,
    Wfh,
    Holiday,
    Weekend,
}

impl AttendanceStatus {
    /// Statuses that come from punches rather than being set by hand.
    pub fn is_punch_driven(self) -> bool {
        matches!(
            self,
            AttendanceStatus::Present | AttendanceStatus::Wfh | AttendanceStatus::HalfDay
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PunchType {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PunchSource {
    Face,
    Manual,
    Web,
    Biometric,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PunchEvent {
    #[serde(rename = "type")]
    pub kind: PunchType,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    pub source: PunchSource,
    pub location: Option<GeoPoint>,
    /// 0-100, present for face-verified punches.
    pub face_confidence: Option<u8>,
    pub device_info: Option<String>,
}

/// Where a record sits in its punch lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PunchPhase {
    New,
    PunchedIn,
    PunchedOut,
}

/// One employee's attendance for one local calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub company_id: Uuid,
    pub date: Date,
    pub shift_id: Option<Uuid>,
    pub status: AttendanceStatus,
    pub punches: Vec<PunchEvent>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub punch_in: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub punch_out: Option<OffsetDateTime>,
    pub total_hours: Hours,
    pub is_late: bool,
    pub late_by_minutes: i64,
    pub is_early_exit: bool,
    pub early_exit_by_minutes: i64,
    pub is_half_day: bool,
    pub is_wfh: bool,
    pub is_manual_entry: bool,
    pub manual_entry_by: Option<Uuid>,
    pub manual_entry_reason: Option<String>,
    pub remarks: Option<String>,
    /// Set when the record was created by an approved leave.
    pub leave_request_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub version: i64,
}

impl AttendanceRecord {
    /// Empty record for a day, before any punch.
    pub fn new(employee_id: Uuid, company_id: Uuid, date: Date, shift_id: Option<Uuid>, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            employee_id,
            company_id,
            date,
            shift_id,
            status: AttendanceStatus::Present,
            punches: Vec::new(),
            punch_in: None,
            punch_out: None,
            total_hours: Hours::ZERO,
            is_late: false,
            late_by_minutes: 0,
            is_early_exit: false,
            early_exit_by_minutes: 0,
            is_half_day: false,
            is_wfh: false,
            is_manual_entry: false,
            manual_entry_by: None,
            manual_entry_reason: None,
            remarks: None,
            leave_request_id: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// ON_LEAVE record produced by leave materialization.
    pub fn on_leave(employee_id: Uuid, company_id: Uuid, date: Date, leave_request_id: Uuid, now: OffsetDateTime) -> Self {
        Self {
            status: AttendanceStatus::OnLeave,
            leave_request_id: Some(leave_request_id),
            ..Self::new(employee_id, company_id, date, None, now)
        }
    }

    pub fn phase(&self) -> PunchPhase {
        match (self.punch_in, self.punch_out) {
            (None, _) => PunchPhase::New,
            (Some(_), None) => PunchPhase::PunchedIn,
            (Some(_), Some(_)) => PunchPhase::PunchedOut,
        }
    }

    /// Re-derives hours, lateness, early exit and half-day from the punch
    /// times and the shift. Safe to call any number of times.
    pub fn recompute(&mut self, policy: Option<&ShiftPolicy>, calendar: &Calendar) {
        let derived = derive(self.date, self.punch_in, self.punch_out, policy, calendar);
        self.total_hours = derived.total_hours;
        self.is_late = derived.is_late;
        self.late_by_minutes = derived.late_by_minutes;
        self.is_early_exit = derived.is_early_exit;
        self.early_exit_by_minutes = derived.early_exit_by_minutes;
        self.is_half_day = derived.is_half_day;

        if self.status.is_punch_driven() {
            self.status = if derived.is_half_day {
                AttendanceStatus::HalfDay
            } else if self.is_wfh {
                AttendanceStatus::Wfh
            } else {
                AttendanceStatus::Present
            };
        }
    }
}

/// Fields computed from punches and shift policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Derived {
    pub total_hours: Hours,
    pub is_late: bool,
    pub late_by_minutes: i64,
    pub is_early_exit: bool,
    pub early_exit_by_minutes: i64,
    pub is_half_day: bool,
}

/// Pure derivation of the timing flags for a day.
///
/// * `late_by_minutes` is measured from the nominal shift start, never from
///   the end of the grace window, and is reported even when the punch falls
///   inside grace (in which case it is at most `grace_minutes`). Only
///   `is_late` is gated by grace.
/// * Without a shift policy the lateness, early-exit and half-day checks are
///   skipped; total hours are still computed.
pub fn derive(
    date: Date,
    punch_in: Option<OffsetDateTime>,
    punch_out: Option<OffsetDateTime>,
    policy: Option<&ShiftPolicy>,
    calendar: &Calendar,
) -> Derived {
    let mut out = Derived::default();

    if let (Some(pin), Some(pout)) = (punch_in, punch_out) {
        out.total_hours = Hours::from_duration(pout - pin);
    }

    let Some(policy) = policy else {
        return out;
    };

    let shift_start = calendar.at(date, policy.start_time);
    let shift_end = if policy.crosses_midnight() {
        calendar.at(date, policy.end_time) + Duration::DAY
    } else {
        calendar.at(date, policy.end_time)
    };

    if let Some(pin) = punch_in {
        let grace_end = shift_start + Duration::minutes(policy.grace_minutes);
        out.is_late = pin > grace_end;
        out.late_by_minutes = whole_minutes(pin - shift_start).max(0);
    }

    if let Some(pout) = punch_out {
        if pout < shift_end {
            out.is_early_exit = true;
            out.early_exit_by_minutes = whole_minutes(shift_end - pout);
        }
    }

    out.is_half_day = out.total_hours > Hours::ZERO && out.total_hours < policy.half_day_hours;
    out
}

fn whole_minutes(span: Duration) -> i64 {
    span.whole_seconds().div_euclid(60)
}

/// Aggregate counts over a range of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttendanceSummary {
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
    pub total_days: usize,
    pub present: usize,
    pub wfh: usize,
    pub half_day: usize,
    pub on_leave: usize,
    pub late: usize,
    pub early_exit: usize,
    pub total_hours: Hours,
    pub average_hours: Hours,
}

impl AttendanceSummary {
    pub fn from_records(start_date: Date, end_date: Date, records: &[AttendanceRecord]) -> Self {
        let count = |pred: &dyn Fn(&AttendanceRecord) -> bool| records.iter().filter(|r| pred(r)).count();
        let total_hours: Hours = records.iter().map(|r| r.total_hours).sum();
        let average_hours = if records.is_empty() {
            Hours::ZERO
        } else {
            let n = records.len() as i64;
            Hours::from_hundredths((total_hours.hundredths() + n / 2) / n)
        };

        Self {
            start_date: Some(start_date),
            end_date: Some(end_date),
            total_days: records.len(),
            present: count(&|r| r.status == AttendanceStatus::Present),
            wfh: count(&|r| r.status == AttendanceStatus::Wfh),
            half_day: count(&|r| r.is_half_day),
            on_leave: count(&|r| r.status == AttendanceStatus::OnLeave),
            late: count(&|r| r.is_late),
            early_exit: count(&|r| r.is_early_exit),
            total_hours,
            average_hours,
        }
    }
}

/// One manager's view of a day.
#[derive(Debug, Clone, Serialize)]
pub struct TeamAttendance {
    pub date: Date,
    pub records: Vec<AttendanceRecord>,
    pub absent: Vec<EmployeeSummary>,
    pub total: usize,
    pub present: usize,
    pub on_leave: usize,
    pub late: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TodayAttendance {
    pub record: Option<AttendanceRecord>,
    pub has_punched_in: bool,
    pub has_punched_out: bool,
}

// -- Request bodies / query params --

#[derive(Debug, Deserialize, Validate)]
pub struct PunchRequest {
    pub source: Option<PunchSource>,
    /// Base64 image or provider URL, required for face punches.
    pub face_image: Option<String>,
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub is_wfh: bool,
    #[validate(length(max = 200))]
    pub device_info: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ManualEntryRequest {
    pub employee_id: Uuid,
    pub date: Date,
    #[serde(with = "hhmm")]
    pub punch_in_time: Time,
    #[serde(default, with = "hhmm::option")]
    pub punch_out_time: Option<Time>,
    #[validate(length(min = 1, max = 500, message = "reason must be 1-500 characters"))]
    pub reason: String,
    #[serde(default)]
    pub is_wfh: bool,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CorrectAttendanceRequest {
    pub status: Option<AttendanceStatus>,
    #[validate(length(max = 500))]
    pub remarks: Option<String>,
    #[serde(default, with = "hhmm::option")]
    pub punch_in_time: Option<Time>,
    #[serde(default, with = "hhmm::option")]
    pub punch_out_time: Option<Time>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterFaceRequest {
    #[validate(length(min = 1))]
    pub face_image: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TeamAttendanceParams {
    pub date: Option<Date>,
    pub status: Option<AttendanceStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryParams {
    pub employee_id: Option<Uuid>,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
}

#[cfg(test)]
mod tests {
    use time::macros::{date, datetime, time};

    use super::*;
    use crate::calendar::WeeklyOffs;

    fn general_shift() -> ShiftPolicy {
        ShiftPolicy {
            shift_id: Uuid::new_v4(),
            name: "General".into(),
            start_time: time!(09:00),
            end_time: time!(18:00),
            grace_minutes: 15,
            half_day_hours: Hours::whole(4),
            weekly_offs: WeeklyOffs::WEEKEND,
        }
    }

    const DAY: Date = date!(2026-03-02);

    #[test]
    fn punch_at_grace_boundary_is_not_late() {
        let cal = Calendar::default();
        let shift = general_shift();

        let at_grace = derive(DAY, Some(datetime!(2026-03-02 09:15 UTC)), None, Some(&shift), &cal);
        assert!(!at_grace.is_late);
        assert_eq!(at_grace.late_by_minutes, 15);

        let one_second_after = derive(DAY, Some(datetime!(2026-03-02 09:15:01 UTC)), None, Some(&shift), &cal);
        assert!(one_second_after.is_late);
        assert_eq!(one_second_after.late_by_minutes, 15);

        let at_916 = derive(DAY, Some(datetime!(2026-03-02 09:16 UTC)), None, Some(&shift), &cal);
        assert!(at_916.is_late);
        assert_eq!(at_916.late_by_minutes, 16);
    }

    #[test]
    fn early_arrival_reports_zero_minutes() {
        let cal = Calendar::default();
        let d = derive(DAY, Some(datetime!(2026-03-02 08:40 UTC)), None, Some(&general_shift()), &cal);
        assert!(!d.is_late);
        assert_eq!(d.late_by_minutes, 0);
    }

    #[test]
    fn early_exit_and_half_day() {
        let cal = Calendar::default();
        let shift = general_shift();
        let d = derive(
            DAY,
            Some(datetime!(2026-03-02 09:00 UTC)),
            Some(datetime!(2026-03-02 12:30:30 UTC)),
            Some(&shift),
            &cal,
        );
        assert_eq!(d.total_hours, Hours::from_hundredths(351));
        assert!(d.is_early_exit);
        assert_eq!(d.early_exit_by_minutes, 329);
        assert!(d.is_half_day);

        let full = derive(
            DAY,
            Some(datetime!(2026-03-02 09:00 UTC)),
            Some(datetime!(2026-03-02 18:05 UTC)),
            Some(&shift),
            &cal,
        );
        assert!(!full.is_early_exit);
        assert_eq!(full.early_exit_by_minutes, 0);
        assert!(!full.is_half_day);
    }

    #[test]
    fn no_shift_skips_timing_checks() {
        let cal = Calendar::default();
        let d = derive(
            DAY,
            Some(datetime!(2026-03-02 11:00 UTC)),
            Some(datetime!(2026-03-02 12:00 UTC)),
            None,
            &cal,
        );
        assert_eq!(d.total_hours, Hours::whole(1));
        assert!(!d.is_late && !d.is_early_exit && !d.is_half_day);
    }

    #[test]
    fn night_shift_end_is_next_day() {
        let cal = Calendar::default();
        let shift = ShiftPolicy {
            start_time: time!(22:00),
            end_time: time!(06:00),
            ..general_shift()
        };
        let d = derive(
            DAY,
            Some(datetime!(2026-03-02 22:05 UTC)),
            Some(datetime!(2026-03-03 05:30 UTC)),
            Some(&shift),
            &cal,
        );
        assert!(!d.is_late);
        assert!(d.is_early_exit);
        assert_eq!(d.early_exit_by_minutes, 30);
        assert_eq!(d.total_hours, Hours::from_hundredths(742));
    }

    #[test]
    fn recompute_is_idempotent_and_reverts_half_day() {
        let cal = Calendar::default();
        let shift = general_shift();
        let mut rec = AttendanceRecord::new(Uuid::new_v4(), Uuid::new_v4(), DAY, Some(shift.shift_id), datetime!(2026-03-02 09:00 UTC));
        rec.punch_in = Some(datetime!(2026-03-02 09:20 UTC));
        rec.punch_out = Some(datetime!(2026-03-02 11:00 UTC));

        rec.recompute(Some(&shift), &cal);
        let first = rec.clone();
        rec.recompute(Some(&shift), &cal);
        assert_eq!(rec, first);
        assert_eq!(rec.status, AttendanceStatus::HalfDay);

        // A corrected punch-out lifts the day above the threshold.
        rec.punch_out = Some(datetime!(2026-03-02 18:00 UTC));
        rec.recompute(Some(&shift), &cal);
        assert_eq!(rec.status, AttendanceStatus::Present);
        assert!(!rec.is_half_day);
        assert_eq!(rec.total_hours, Hours::from_hundredths(867));
    }

    #[test]
    fn recompute_keeps_manual_statuses() {
        let cal = Calendar::default();
        let mut rec = AttendanceRecord::on_leave(Uuid::new_v4(), Uuid::new_v4(), DAY, Uuid::new_v4(), datetime!(2026-03-01 09:00 UTC));
        rec.recompute(Some(&general_shift()), &cal);
        assert_eq!(rec.status, AttendanceStatus::OnLeave);
        assert_eq!(rec.phase(), PunchPhase::New);
    }

    #[test]
    fn summary_counts() {
        let now = datetime!(2026-03-02 09:00 UTC);
        let mut a = AttendanceRecord::new(Uuid::new_v4(), Uuid::new_v4(), DAY, None, now);
        a.total_hours = Hours::whole(8);
        a.is_late = true;
        let mut b = AttendanceRecord::new(a.employee_id, a.company_id, date!(2026-03-03), None, now);
        b.status = AttendanceStatus::Wfh;
        b.total_hours = Hours::from_hundredths(725);
        let c = AttendanceRecord::on_leave(a.employee_id, a.company_id, date!(2026-03-04), Uuid::new_v4(), now);

        let summary = AttendanceSummary::from_records(DAY, date!(2026-03-04), &[a, b, c]);
        assert_eq!(summary.total_days, 3);
        assert_eq!(summary.present, 1);
        assert_eq!(summary.wfh, 1);
        assert_eq!(summary.on_leave, 1);
        assert_eq!(summary.late, 1);
        assert_eq!(summary.total_hours, Hours::from_hundredths(1525));
        assert_eq!(summary.average_hours, Hours::from_hundredths(508));
    }
}
