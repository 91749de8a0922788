use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;
use validator::Validate;

use crate::models::days::Days;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "leave_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl LeaveStatus {
    /// Pending and approved requests hold their dates; the others release them.
    pub fn holds_dates(self) -> bool {
        matches!(self, LeaveStatus::Pending | LeaveStatus::Approved)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApproverRole {
    Manager,
    Hr,
    Admin,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HalfDayPeriod {
    FirstHalf,
    SecondHalf,
}

impl HalfDayPeriod {
    pub fn as_str(self) -> &'static str {
        match self {
            HalfDayPeriod::FirstHalf => "first_half",
            HalfDayPeriod::SecondHalf => "second_half",
        }
    }
}

impl FromStr for HalfDayPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first_half" => Ok(HalfDayPeriod::FirstHalf),
            "second_half" => Ok(HalfDayPeriod::SecondHalf),
            other => Err(format!("unknown half-day period '{other}'")),
        }
    }
}

/// Company-configured leave category. Managed outside this service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaveType {
    pub id: Uuid,
    pub company_id: Uuid,
    pub code: String,
    pub name: String,
    pub yearly_quota: Days,
    pub is_paid: bool,
    pub is_carry_forward: bool,
    pub max_carry_forward: Days,
    pub requires_approval: bool,
    pub approval_levels: u8,
    pub can_apply_half_day: bool,
    pub min_days_notice: i64,
    /// `None` means no limit.
    pub max_consecutive_days: Option<i64>,
    pub is_accrual: bool,
    /// Days credited per month for accrual types. Like every leave quantity
    /// this is a multiple of half a day, so a rate such as 1.25 is refused.
    pub accrual_rate: Days,
    pub is_active: bool,
}

/// One step of a request's approval chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalStage {
    pub level: u32,
    pub approver_id: Uuid,
    pub approver_role: ApproverRole,
    pub status: StageStatus,
    pub comments: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub action_at: Option<OffsetDateTime>,
}

impl ApprovalStage {
    pub fn pending(level: u32, approver_id: Uuid, approver_role: ApproverRole) -> Self {
        Self {
            level,
            approver_id,
            approver_role,
            status: StageStatus::Pending,
            comments: None,
            action_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub company_id: Uuid,
    pub leave_type_id: Uuid,
    /// Captured at submission so later edits to the type do not rewrite history.
    pub leave_type_code: String,
    pub leave_type_name: String,
    pub from_date: Date,
    pub to_date: Date,
    pub is_half_day: bool,
    pub half_day_period: Option<HalfDayPeriod>,
    pub total_days: Days,
    pub reason: String,
    pub status: LeaveStatus,
    pub approval_chain: Vec<ApprovalStage>,
    pub current_approval_level: u32,
    pub final_approver_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub final_approved_at: Option<OffsetDateTime>,
    pub rejected_by: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub rejected_at: Option<OffsetDateTime>,
    pub rejection_reason: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub cancelled_at: Option<OffsetDateTime>,
    pub cancellation_reason: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// Optimistic-concurrency token, bumped by every successful store update.
    pub version: i64,
}

impl LeaveRequest {
    pub fn stage(&self, level: u32) -> Option<&ApprovalStage> {
        self.approval_chain.iter().find(|s| s.level == level)
    }

    pub fn stage_mut(&mut self, level: u32) -> Option<&mut ApprovalStage> {
        self.approval_chain.iter_mut().find(|s| s.level == level)
    }

    pub fn current_stage(&self) -> Option<&ApprovalStage> {
        self.stage(self.current_approval_level)
    }

    /// Closed-interval intersection with `[from, to]`.
    pub fn overlaps(&self, from: Date, to: Date) -> bool {
        self.from_date <= to && self.to_date >= from
    }

    /// Whether `user_id` appears anywhere in the approval chain.
    pub fn involves_approver(&self, user_id: Uuid) -> bool {
        self.approval_chain.iter().any(|s| s.approver_id == user_id)
    }
}

/// Per-employee balances: leave-type id to remaining days.
/// Missing entries read as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeaveBalance(std::collections::HashMap<Uuid, Days>);

impl LeaveBalance {
    pub fn get(&self, leave_type_id: Uuid) -> Days {
        self.0.get(&leave_type_id).copied().unwrap_or(Days::ZERO)
    }

    pub fn set(&mut self, leave_type_id: Uuid, value: Days) {
        self.0.insert(leave_type_id, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Uuid, &Days)> {
        self.0.iter()
    }
}

/// Balance projection for one leave type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceLine {
    pub leave_type_id: Uuid,
    pub code: String,
    pub name: String,
    pub total: Days,
    pub used: Days,
    pub pending: Days,
    pub available: Days,
}

// -- Request bodies / query params --

#[derive(Debug, Deserialize, Validate)]
pub struct ApplyLeaveRequest {
    pub leave_type_id: Uuid,
    pub from_date: Date,
    pub to_date: Date,
    #[serde(default)]
    pub is_half_day: bool,
    pub half_day_period: Option<HalfDayPeriod>,
    #[validate(length(min = 1, max = 500, message = "reason must be 1-500 characters"))]
    pub reason: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ReviewLeaveRequest {
    #[validate(length(max = 1000))]
    pub comments: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CancelLeaveRequest {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LeaveListParams {
    pub status: Option<LeaveStatus>,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl LeaveListParams {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(10).clamp(1, 100)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

    #[test]
    fn overlap_is_closed_interval() {
        let mut req = sample();
        req.from_date = date!(2026-03-02);
        req.to_date = date!(2026-03-04);

        assert!(req.overlaps(date!(2026-03-04), date!(2026-03-06)));
        assert!(req.overlaps(date!(2026-02-27), date!(2026-03-02)));
        assert!(req.overlaps(date!(2026-03-03), date!(2026-03-03)));
        assert!(!req.overlaps(date!(2026-03-05), date!(2026-03-06)));
        assert!(!req.overlaps(date!(2026-02-20), date!(2026-03-01)));
    }

    #[test]
    fn balance_defaults_to_zero() {
        let mut balance = LeaveBalance::default();
        let lt = Uuid::new_v4();
        assert_eq!(balance.get(lt), Days::ZERO);
        balance.set(lt, Days::whole(12));
        assert_eq!(balance.get(lt), Days::whole(12));
    }

    #[test]
    fn half_day_period_parses() {
        assert_eq!("first_half".parse::<HalfDayPeriod>().unwrap(), HalfDayPeriod::FirstHalf);
        assert_eq!(HalfDayPeriod::SecondHalf.as_str(), "second_half");
        assert!("morning".parse::<HalfDayPeriod>().is_err());
    }

    fn sample() -> LeaveRequest {
        let now = OffsetDateTime::UNIX_EPOCH;
        LeaveRequest {
            id: Uuid::new_v4(),
            employee_id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            leave_type_id: Uuid::new_v4(),
            leave_type_code: "CL".into(),
            leave_type_name: "Casual Leave".into(),
            from_date: date!(2026-03-02),
            to_date: date!(2026-03-02),
            is_half_day: false,
            half_day_period: None,
            total_days: Days::whole(1),
            reason: "family".into(),
            status: LeaveStatus::Pending,
            approval_chain: vec![],
            current_approval_level: 1,
            final_approver_id: None,
            final_approved_at: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
            cancelled_at: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }
}
