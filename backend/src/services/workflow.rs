//! Leave request lifecycle: apply, staged approval, rejection, cancellation
//! and attendance materialization.

use std::sync::Arc;

use time::Date;
use uuid::Uuid;
use validator::Validate;

use crate::calendar::{business_days, days_in_range, Calendar, Clock, WeeklyOffs};
use crate::models::{
    attendance::AttendanceRecord,
    days::Days,
    employee::Employee,
    leave::{
        ApplyLeaveRequest, ApprovalStage, ApproverRole, LeaveRequest, LeaveStatus, LeaveType,
        StageStatus,
    },
};
use crate::services::ledger::LeaveLedger;
use crate::services::sinks::{AuditEvent, Notification, NotificationEvent, Sinks, MODULE_LEAVE};
use crate::services::{Actor, DomainError, DomainResult};
use crate::store::{LeaveQuery, StoreError, Stores};

/// Requests longer than this always get an HR stage.
const HR_STAGE_THRESHOLD: Days = Days::whole(3);

#[derive(Clone)]
pub struct LeaveWorkflow {
    stores: Stores,
    ledger: LeaveLedger,
    clock: Arc<dyn Clock>,
    calendar: Calendar,
    default_weekly_offs: WeeklyOffs,
    sinks: Sinks,
}

impl LeaveWorkflow {
    pub fn new(
        stores: Stores,
        ledger: LeaveLedger,
        clock: Arc<dyn Clock>,
        calendar: Calendar,
        default_weekly_offs: WeeklyOffs,
        sinks: Sinks,
    ) -> Self {
        Self { stores, ledger, clock, calendar, default_weekly_offs, sinks }
    }

    fn today(&self) -> Date {
        self.calendar.local_date(self.clock.now())
    }

    async fn employee(&self, id: Uuid) -> DomainResult<Employee> {
        self.stores
            .directory
            .employee(id)
            .await?
            .ok_or_else(|| DomainError::NotFound("Employee".into()))
    }

    async fn request(&self, id: Uuid) -> DomainResult<LeaveRequest> {
        self.stores
            .requests
            .get(id)
            .await?
            .ok_or_else(|| DomainError::NotFound("Leave request".into()))
    }

    async fn weekly_offs(&self, employee_id: Uuid) -> DomainResult<WeeklyOffs> {
        Ok(self
            .stores
            .shifts
            .shift_policy(employee_id)
            .await?
            .map(|p| p.weekly_offs)
            .unwrap_or(self.default_weekly_offs))
    }

    // -- Apply --

    pub async fn apply(&self, employee_id: Uuid, input: ApplyLeaveRequest) -> DomainResult<LeaveRequest> {
        input
            .validate()
            .map_err(|e| DomainError::Validation(e.to_string()))?;
        let reason = input.reason.trim().to_string();
        if reason.is_empty() {
            return Err(DomainError::Validation("reason must not be blank".into()));
        }

        let employee = self.employee(employee_id).await?;
        let leave_type = self
            .stores
            .leave_types
            .leave_type(input.leave_type_id)
            .await?
            .filter(|t| t.company_id == employee.company_id)
            .ok_or_else(|| DomainError::NotFound("Leave type".into()))?;
        if !leave_type.is_active {
            return Err(DomainError::Validation("this leave type is not active".into()));
        }

        let today = self.today();
        if input.to_date < input.from_date {
            return Err(DomainError::Validation("to_date must not be before from_date".into()));
        }
        if input.from_date < today {
            return Err(DomainError::PastDate);
        }
        if input.is_half_day {
            if !leave_type.can_apply_half_day {
                return Err(DomainError::Validation(format!(
                    "{} cannot be taken as a half day",
                    leave_type.name
                )));
            }
            if input.half_day_period.is_none() {
                return Err(DomainError::Validation("half_day_period is required for half-day leave".into()));
            }
        }
        let notice = (input.from_date - today).whole_days();
        if notice < leave_type.min_days_notice {
            return Err(DomainError::Validation(format!(
                "{} requires at least {} day(s) notice",
                leave_type.name, leave_type.min_days_notice
            )));
        }

        let offs = self.weekly_offs(employee_id).await?;
        let working = business_days(input.from_date, input.to_date, offs);
        if working == 0 {
            return Err(DomainError::Validation("the selected range contains no working days".into()));
        }
        // A half-day request counts 0.5 whatever the range width.
        let total_days = if input.is_half_day { Days::HALF } else { Days::whole(working) };
        if let Some(max) = leave_type.max_consecutive_days {
            if total_days > Days::whole(max) {
                return Err(DomainError::Validation(format!(
                    "{} allows at most {max} consecutive day(s)",
                    leave_type.name
                )));
            }
        }

        let available = self.ledger.available_balance(employee_id, leave_type.id).await?;
        if available < total_days {
            return Err(DomainError::InsufficientBalance { available, requested: total_days });
        }

        if self
            .stores
            .requests
            .find_overlapping(employee_id, input.from_date, input.to_date)
            .await?
            .is_some()
        {
            return Err(DomainError::OverlappingRequest);
        }

        let approval_chain = self.build_chain(&employee, &leave_type, total_days).await?;
        let now = self.clock.now();
        let mut request = LeaveRequest {
            id: Uuid::new_v4(),
            employee_id,
            company_id: employee.company_id,
            leave_type_id: leave_type.id,
            leave_type_code: leave_type.code.clone(),
            leave_type_name: leave_type.name.clone(),
            from_date: input.from_date,
            to_date: input.to_date,
            is_half_day: input.is_half_day,
            half_day_period: if input.is_half_day { input.half_day_period } else { None },
            total_days,
            reason,
            status: LeaveStatus::Pending,
            approval_chain,
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
        };

        if request.approval_chain.is_empty() {
            // Nobody to ask: approve on submission.
            self.ledger.deduct(employee_id, leave_type.id, total_days).await?;
            request.status = LeaveStatus::Approved;
            request.final_approved_at = Some(now);
            if let Err(e) = self.stores.requests.insert(&request).await {
                self.compensate_deduction(&request).await;
                return Err(e.into());
            }
            tracing::info!(request_id = %request.id, %employee_id, days = %total_days, "leave auto-approved");
            self.materialize_logged(&request).await;
            self.notify_employee(&request, NotificationEvent::LeaveApproved, "Leave Approved", "has been approved")
                .await;
        } else {
            self.stores.requests.insert(&request).await?;
            tracing::info!(request_id = %request.id, %employee_id, days = %total_days, stages = request.approval_chain.len(), "leave applied");
            if let Some(stage) = request.current_stage() {
                self.sinks
                    .notify(Notification {
                        recipient_id: stage.approver_id,
                        company_id: request.company_id,
                        event: NotificationEvent::LeaveApplied,
                        title: "New Leave Application".into(),
                        message: format!(
                            "{} has applied for {} from {} to {}.",
                            employee.full_name(),
                            request.leave_type_name,
                            request.from_date,
                            request.to_date
                        ),
                        related_id: Some(request.id),
                    })
                    .await;
            }
        }

        self.sinks
            .audit(
                AuditEvent::new(MODULE_LEAVE, "APPLY", employee_id, request.company_id, now)
                    .target(request.id)
                    .after(&request),
            )
            .await;
        Ok(request)
    }

    /// Level 1 is the manager when there is one; an HR stage follows for
    /// long requests or types that always need sign-off.
    async fn build_chain(&self, employee: &Employee, leave_type: &LeaveType, total_days: Days) -> DomainResult<Vec<ApprovalStage>> {
        let mut chain = Vec::new();
        if let Some(manager_id) = employee.manager_id {
            chain.push(ApprovalStage::pending(1, manager_id, ApproverRole::Manager));
        }
        if total_days > HR_STAGE_THRESHOLD || leave_type.requires_approval {
            let hr = self
                .stores
                .directory
                .hr_approver(employee.company_id)
                .await?
                .ok_or_else(|| DomainError::Validation("no HR approver is configured for this company".into()))?;
            let level = chain.len() as u32 + 1;
            chain.push(ApprovalStage::pending(level, hr, ApproverRole::Hr));
        }
        Ok(chain)
    }

    // -- Review --

    fn check_actionable(request: &LeaveRequest, approver_id: Uuid) -> DomainResult<()> {
        if request.status != LeaveStatus::Pending {
            return Err(DomainError::NotPending);
        }
        let stage = request
            .current_stage()
            .filter(|s| s.approver_id == approver_id)
            .ok_or(DomainError::NotAuthorized)?;
        if stage.status != StageStatus::Pending {
            return Err(DomainError::AlreadyActioned);
        }
        Ok(())
    }

    /// Compare-and-set write for a stage transition. Losing the race means
    /// somebody else already acted on this stage.
    async fn save_transition(&self, request: &LeaveRequest) -> DomainResult<LeaveRequest> {
        match self.stores.requests.update(request).await {
            Ok(saved) => Ok(saved),
            Err(StoreError::VersionConflict) => Err(DomainError::AlreadyActioned),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn approve(&self, approver_id: Uuid, request_id: Uuid, comments: Option<String>) -> DomainResult<LeaveRequest> {
        let mut request = self.request(request_id).await?;
        Self::check_actionable(&request, approver_id)?;

        let before = request.clone();
        let now = self.clock.now();
        let level = request.current_approval_level;
        if let Some(stage) = request.stage_mut(level) {
            stage.status = StageStatus::Approved;
            stage.comments = comments.clone();
            stage.action_at = Some(now);
        }
        request.updated_at = now;

        if request.stage(level + 1).is_some() {
            request.current_approval_level = level + 1;
            let saved = self.save_transition(&request).await?;
            tracing::info!(request_id = %saved.id, %approver_id, level, "leave stage approved");

            if let Some(next) = saved.current_stage() {
                self.sinks
                    .notify(Notification {
                        recipient_id: next.approver_id,
                        company_id: saved.company_id,
                        event: NotificationEvent::LeaveApprovalRequested,
                        title: "Leave Awaiting Your Approval".into(),
                        message: format!(
                            "A {} request from {} to {} is awaiting your approval.",
                            saved.leave_type_name, saved.from_date, saved.to_date
                        ),
                        related_id: Some(saved.id),
                    })
                    .await;
            }
            self.sinks
                .audit(
                    AuditEvent::new(MODULE_LEAVE, "APPROVE_STAGE", approver_id, saved.company_id, now)
                        .target(saved.id)
                        .before(&before)
                        .after(&saved)
                        .metadata(serde_json::json!({ "level": level, "comments": comments })),
                )
                .await;
            return Ok(saved);
        }

        request.status = LeaveStatus::Approved;
        request.final_approver_id = Some(approver_id);
        request.final_approved_at = Some(now);

        // APPROVED is only ever stored with its deduction already taken.
        self.ledger
            .deduct(request.employee_id, request.leave_type_id, request.total_days)
            .await?;
        let saved = match self.save_transition(&request).await {
            Ok(saved) => saved,
            Err(e) => {
                self.compensate_deduction(&request).await;
                return Err(e);
            }
        };

        tracing::info!(request_id = %saved.id, %approver_id, days = %saved.total_days, "leave approved");
        self.materialize_logged(&saved).await;
        self.notify_employee(&saved, NotificationEvent::LeaveApproved, "Leave Approved", "has been approved")
            .await;
        self.sinks
            .audit(
                AuditEvent::new(MODULE_LEAVE, "APPROVE", approver_id, saved.company_id, now)
                    .target(saved.id)
                    .before(&before)
                    .after(&saved)
                    .metadata(serde_json::json!({ "level": level, "comments": comments })),
            )
            .await;
        Ok(saved)
    }

    pub async fn reject(&self, approver_id: Uuid, request_id: Uuid, comments: Option<String>) -> DomainResult<LeaveRequest> {
        let mut request = self.request(request_id).await?;
        Self::check_actionable(&request, approver_id)?;

        let before = request.clone();
        let now = self.clock.now();
        let level = request.current_approval_level;
        if let Some(stage) = request.stage_mut(level) {
            stage.status = StageStatus::Rejected;
            stage.comments = comments.clone();
            stage.action_at = Some(now);
        }
        request.status = LeaveStatus::Rejected;
        request.rejected_by = Some(approver_id);
        request.rejected_at = Some(now);
        request.rejection_reason = comments.clone();
        request.updated_at = now;

        let saved = self.save_transition(&request).await?;
        tracing::info!(request_id = %saved.id, %approver_id, level, "leave rejected");

        let suffix = match &comments {
            Some(c) if !c.trim().is_empty() => format!("has been rejected. Reason: {c}"),
            _ => "has been rejected".to_string(),
        };
        self.notify_employee(&saved, NotificationEvent::LeaveRejected, "Leave Rejected", &suffix)
            .await;
        self.sinks
            .audit(
                AuditEvent::new(MODULE_LEAVE, "REJECT", approver_id, saved.company_id, now)
                    .target(saved.id)
                    .before(&before)
                    .after(&saved),
            )
            .await;
        Ok(saved)
    }

    pub async fn cancel(&self, employee_id: Uuid, request_id: Uuid, reason: Option<String>) -> DomainResult<LeaveRequest> {
        let mut request = self.request(request_id).await?;
        if request.employee_id != employee_id {
            return Err(DomainError::NotOwner);
        }
        if !request.status.holds_dates() {
            return Err(DomainError::NotCancellable);
        }
        if request.from_date <= self.today() {
            return Err(DomainError::AlreadyStarted);
        }

        let before = request.clone();
        let previous = request.status;
        let now = self.clock.now();
        request.status = LeaveStatus::Cancelled;
        request.cancelled_at = Some(now);
        request.cancellation_reason = reason;
        request.updated_at = now;
        let saved = self.stores.requests.update(&request).await?;

        if previous == LeaveStatus::Approved {
            self.ledger
                .restore(saved.employee_id, saved.leave_type_id, saved.total_days)
                .await?;
            let removed = self.stores.attendance.delete_for_leave(saved.id).await?;
            tracing::debug!(request_id = %saved.id, removed, "removed materialized attendance");
        }
        tracing::info!(request_id = %saved.id, %employee_id, previous = ?previous, "leave cancelled");

        if let Some(manager_id) = self.employee(employee_id).await?.manager_id {
            self.sinks
                .notify(Notification {
                    recipient_id: manager_id,
                    company_id: saved.company_id,
                    event: NotificationEvent::LeaveCancelled,
                    title: "Leave Cancelled".into(),
                    message: format!(
                        "A {} request from {} to {} was cancelled.",
                        saved.leave_type_name, saved.from_date, saved.to_date
                    ),
                    related_id: Some(saved.id),
                })
                .await;
        }
        self.sinks
            .audit(
                AuditEvent::new(MODULE_LEAVE, "CANCEL", employee_id, saved.company_id, now)
                    .target(saved.id)
                    .before(&before)
                    .after(&saved),
            )
            .await;
        Ok(saved)
    }

    // -- Materialization --

    /// Creates an ON_LEAVE attendance record for each working day of an
    /// approved request that does not already have one. Returns how many were
    /// created; running it again creates none. A request that is no longer
    /// approved gets nothing, and anything created while it was being
    /// cancelled is removed again.
    pub async fn materialize(&self, request: &LeaveRequest) -> DomainResult<usize> {
        if self.request(request.id).await?.status != LeaveStatus::Approved {
            return Ok(0);
        }
        let offs = self.weekly_offs(request.employee_id).await?;
        let now = self.clock.now();
        let mut created = 0;
        for day in days_in_range(request.from_date, request.to_date) {
            if offs.is_off(day) {
                continue;
            }
            let record = AttendanceRecord::on_leave(request.employee_id, request.company_id, day, request.id, now);
            if self.stores.attendance.insert_if_absent(&record).await? {
                created += 1;
            }
        }
        // Cancel flips the status before deleting, so one of the two sweeps
        // sees the other's rows.
        if created > 0 && self.request(request.id).await?.status != LeaveStatus::Approved {
            self.stores.attendance.delete_for_leave(request.id).await?;
            return Ok(0);
        }
        Ok(created)
    }

    async fn materialize_logged(&self, request: &LeaveRequest) {
        match self.materialize(request).await {
            Ok(created) => tracing::debug!(request_id = %request.id, created, "leave materialized"),
            // Approval stands; materialization is idempotent and can be re-run.
            Err(e) => tracing::error!(request_id = %request.id, "leave materialization failed: {e}"),
        }
    }

    /// Re-runs materialization for an approved request.
    pub async fn retry_materialization(&self, actor: Uuid, request_id: Uuid) -> DomainResult<usize> {
        let request = self.request(request_id).await?;
        if request.status != LeaveStatus::Approved {
            return Err(DomainError::Validation("only approved requests can be materialized".into()));
        }
        let created = self.materialize(&request).await?;
        self.sinks
            .audit(
                AuditEvent::new(MODULE_LEAVE, "MATERIALIZE", actor, request.company_id, self.clock.now())
                    .target(request.id)
                    .metadata(serde_json::json!({ "created": created })),
            )
            .await;
        Ok(created)
    }

    async fn compensate_deduction(&self, request: &LeaveRequest) {
        if let Err(e) = self
            .ledger
            .restore(request.employee_id, request.leave_type_id, request.total_days)
            .await
        {
            tracing::error!(request_id = %request.id, "failed to restore balance: {e}");
        }
    }

    async fn notify_employee(&self, request: &LeaveRequest, event: NotificationEvent, title: &str, outcome: &str) {
        self.sinks
            .notify(Notification {
                recipient_id: request.employee_id,
                company_id: request.company_id,
                event,
                title: title.to_string(),
                message: format!(
                    "Your {} from {} to {} {outcome}.",
                    request.leave_type_name, request.from_date, request.to_date
                ),
                related_id: Some(request.id),
            })
            .await;
    }

    // -- Queries --

    /// Visible to the owner, anyone in the approval chain, and HR/admin of the
    /// same company.
    pub async fn get(&self, viewer: &Actor, request_id: Uuid) -> DomainResult<LeaveRequest> {
        let request = self.request(request_id).await?;
        if request.company_id != viewer.company_id {
            return Err(DomainError::NotFound("Leave request".into()));
        }
        let allowed = request.employee_id == viewer.id
            || request.involves_approver(viewer.id)
            || viewer.role.is_hr_or_admin();
        if !allowed {
            return Err(DomainError::Forbidden);
        }
        Ok(request)
    }

    pub async fn list_mine(&self, employee_id: Uuid, query: &LeaveQuery) -> DomainResult<Vec<LeaveRequest>> {
        Ok(self.stores.requests.list_for_employee(employee_id, query).await?)
    }

    pub async fn pending_approvals(&self, approver_id: Uuid, limit: i64, offset: i64) -> DomainResult<Vec<LeaveRequest>> {
        Ok(self
            .stores
            .requests
            .pending_for_approver(approver_id, limit, offset)
            .await?)
    }

    /// Approved leave of the manager's direct reports intersecting the range.
    pub async fn team_calendar(&self, manager_id: Uuid, from: Date, to: Date) -> DomainResult<Vec<LeaveRequest>> {
        if to < from {
            return Err(DomainError::Validation("end_date must not be before start_date".into()));
        }
        let team: Vec<Uuid> = self
            .stores
            .directory
            .direct_reports(manager_id)
            .await?
            .into_iter()
            .map(|e| e.id)
            .collect();
        if team.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.stores.requests.approved_in_range(&team, from, to).await?)
    }

    pub async fn leave_types(&self, company_id: Uuid) -> DomainResult<Vec<LeaveType>> {
        Ok(self.stores.leave_types.active_leave_types(company_id).await?)
    }

    /// Today's date in the workday calendar.
    pub fn current_date(&self) -> Date {
        self.today()
    }
}
