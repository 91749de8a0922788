//! Postgres adapter. Atomicity comes from single-statement conditional
//! updates and the `(employee_id, date)` unique constraint.

use async_trait::async_trait;
use sqlx::{types::Json, PgPool};
use time::{Date, OffsetDateTime, Time};
use uuid::Uuid;

use super::{
    AttendanceStore, BalanceStore, Directory, LeaveQuery, LeaveRequestStore, LeaveTypeStore,
    ShiftPolicyStore, StoreError, StoreResult,
};
use crate::auth::Role;
use crate::calendar::WeeklyOffs;
use crate::models::{
    attendance::{AttendanceRecord, AttendanceStatus, PunchEvent},
    days::{Days, Hours},
    employee::Employee,
    leave::{ApprovalStage, HalfDayPeriod, LeaveBalance, LeaveRequest, LeaveStatus, LeaveType},
    shift::ShiftPolicy,
};
use crate::services::sinks::{AuditEvent, AuditSink, SinkError};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// -- Row types --

#[derive(sqlx::FromRow)]
struct EmployeeRow {
    id: Uuid,
    company_id: Uuid,
    employee_code: String,
    first_name: String,
    last_name: String,
    email: String,
    role: Role,
    manager_id: Option<Uuid>,
    shift_id: Option<Uuid>,
    date_of_joining: Date,
    face_id: Option<String>,
    is_active: bool,
}

impl From<EmployeeRow> for Employee {
    fn from(r: EmployeeRow) -> Self {
        Employee {
            id: r.id,
            company_id: r.company_id,
            employee_code: r.employee_code,
            first_name: r.first_name,
            last_name: r.last_name,
            email: r.email,
            role: r.role,
            manager_id: r.manager_id,
            shift_id: r.shift_id,
            date_of_joining: r.date_of_joining,
            face_id: r.face_id,
            is_active: r.is_active,
        }
    }
}

const EMPLOYEE_COLUMNS: &str = "id, company_id, employee_code, first_name, last_name, email, \
     role, manager_id, shift_id, date_of_joining, face_id, is_active";

#[derive(sqlx::FromRow)]
struct ShiftRow {
    id: Uuid,
    name: String,
    start_time: Time,
    end_time: Time,
    grace_minutes: i32,
    half_day_hundredths: i32,
    weekly_offs: Vec<i16>,
}

impl TryFrom<ShiftRow> for ShiftPolicy {
    type Error = StoreError;

    fn try_from(r: ShiftRow) -> Result<Self, Self::Error> {
        let indices = r
            .weekly_offs
            .into_iter()
            .map(|d| u8::try_from(d).map_err(|_| StoreError::Corrupt(format!("weekday {d}"))))
            .collect::<Result<Vec<u8>, _>>()?;
        let weekly_offs = WeeklyOffs::from_indices(indices)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Ok(ShiftPolicy {
            shift_id: r.id,
            name: r.name,
            start_time: r.start_time,
            end_time: r.end_time,
            grace_minutes: i64::from(r.grace_minutes),
            half_day_hours: Hours::from_hundredths(i64::from(r.half_day_hundredths)),
            weekly_offs,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LeaveTypeRow {
    id: Uuid,
    company_id: Uuid,
    code: String,
    name: String,
    yearly_quota_halves: i32,
    is_paid: bool,
    is_carry_forward: bool,
    max_carry_forward_halves: i32,
    requires_approval: bool,
    approval_levels: i16,
    can_apply_half_day: bool,
    min_days_notice: i32,
    max_consecutive_days: Option<i32>,
    is_accrual: bool,
    accrual_rate_halves: i32,
    is_active: bool,
}

impl From<LeaveTypeRow> for LeaveType {
    fn from(r: LeaveTypeRow) -> Self {
        LeaveType {
            id: r.id,
            company_id: r.company_id,
            code: r.code,
            name: r.name,
            yearly_quota: Days::from_halves(i64::from(r.yearly_quota_halves)),
            is_paid: r.is_paid,
            is_carry_forward: r.is_carry_forward,
            max_carry_forward: Days::from_halves(i64::from(r.max_carry_forward_halves)),
            requires_approval: r.requires_approval,
            approval_levels: r.approval_levels.clamp(0, i16::from(u8::MAX)) as u8,
            can_apply_half_day: r.can_apply_half_day,
            min_days_notice: i64::from(r.min_days_notice),
            max_consecutive_days: r.max_consecutive_days.map(i64::from),
            is_accrual: r.is_accrual,
            accrual_rate: Days::from_halves(i64::from(r.accrual_rate_halves)),
            is_active: r.is_active,
        }
    }
}

const LEAVE_TYPE_COLUMNS: &str = "id, company_id, code, name, yearly_quota_halves, is_paid, \
     is_carry_forward, max_carry_forward_halves, requires_approval, approval_levels, \
     can_apply_half_day, min_days_notice, max_consecutive_days, is_accrual, \
     accrual_rate_halves, is_active";

#[derive(sqlx::FromRow)]
struct LeaveRequestRow {
    id: Uuid,
    employee_id: Uuid,
    company_id: Uuid,
    leave_type_id: Uuid,
    leave_type_code: String,
    leave_type_name: String,
    from_date: Date,
    to_date: Date,
    is_half_day: bool,
    half_day_period: Option<String>,
    total_halves: i64,
    reason: String,
    status: LeaveStatus,
    approval_chain: Json<Vec<ApprovalStage>>,
    current_approval_level: i32,
    final_approver_id: Option<Uuid>,
    final_approved_at: Option<OffsetDateTime>,
    rejected_by: Option<Uuid>,
    rejected_at: Option<OffsetDateTime>,
    rejection_reason: Option<String>,
    cancelled_at: Option<OffsetDateTime>,
    cancellation_reason: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    version: i64,
}

impl TryFrom<LeaveRequestRow> for LeaveRequest {
    type Error = StoreError;

    fn try_from(r: LeaveRequestRow) -> Result<Self, Self::Error> {
        let half_day_period = r
            .half_day_period
            .map(|p| p.parse::<HalfDayPeriod>())
            .transpose()
            .map_err(StoreError::Corrupt)?;
        let current_approval_level = u32::try_from(r.current_approval_level)
            .map_err(|_| StoreError::Corrupt(format!("approval level {}", r.current_approval_level)))?;
        Ok(LeaveRequest {
            id: r.id,
            employee_id: r.employee_id,
            company_id: r.company_id,
            leave_type_id: r.leave_type_id,
            leave_type_code: r.leave_type_code,
            leave_type_name: r.leave_type_name,
            from_date: r.from_date,
            to_date: r.to_date,
            is_half_day: r.is_half_day,
            half_day_period,
            total_days: Days::from_halves(r.total_halves),
            reason: r.reason,
            status: r.status,
            approval_chain: r.approval_chain.0,
            current_approval_level,
            final_approver_id: r.final_approver_id,
            final_approved_at: r.final_approved_at,
            rejected_by: r.rejected_by,
            rejected_at: r.rejected_at,
            rejection_reason: r.rejection_reason,
            cancelled_at: r.cancelled_at,
            cancellation_reason: r.cancellation_reason,
            created_at: r.created_at,
            updated_at: r.updated_at,
            version: r.version,
        })
    }
}

const LEAVE_REQUEST_COLUMNS: &str = "id, employee_id, company_id, leave_type_id, leave_type_code, \
     leave_type_name, from_date, to_date, is_half_day, half_day_period, total_halves, reason, \
     status, approval_chain, current_approval_level, final_approver_id, final_approved_at, \
     rejected_by, rejected_at, rejection_reason, cancelled_at, cancellation_reason, \
     created_at, updated_at, version";

#[derive(sqlx::FromRow)]
struct AttendanceRow {
    id: Uuid,
    employee_id: Uuid,
    company_id: Uuid,
    date: Date,
    shift_id: Option<Uuid>,
    status: AttendanceStatus,
    punches: Json<Vec<PunchEvent>>,
    punch_in: Option<OffsetDateTime>,
    punch_out: Option<OffsetDateTime>,
    total_hundredths: i64,
    is_late: bool,
    late_by_minutes: i64,
    is_early_exit: bool,
    early_exit_by_minutes: i64,
    is_half_day: bool,
    is_wfh: bool,
    is_manual_entry: bool,
    manual_entry_by: Option<Uuid>,
    manual_entry_reason: Option<String>,
    remarks: Option<String>,
    leave_request_id: Option<Uuid>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    version: i64,
}

impl From<AttendanceRow> for AttendanceRecord {
    fn from(r: AttendanceRow) -> Self {
        AttendanceRecord {
            id: r.id,
            employee_id: r.employee_id,
            company_id: r.company_id,
            date: r.date,
            shift_id: r.shift_id,
            status: r.status,
            punches: r.punches.0,
            punch_in: r.punch_in,
            punch_out: r.punch_out,
            total_hours: Hours::from_hundredths(r.total_hundredths),
            is_late: r.is_late,
            late_by_minutes: r.late_by_minutes,
            is_early_exit: r.is_early_exit,
            early_exit_by_minutes: r.early_exit_by_minutes,
            is_half_day: r.is_half_day,
            is_wfh: r.is_wfh,
            is_manual_entry: r.is_manual_entry,
            manual_entry_by: r.manual_entry_by,
            manual_entry_reason: r.manual_entry_reason,
            remarks: r.remarks,
            leave_request_id: r.leave_request_id,
            created_at: r.created_at,
            updated_at: r.updated_at,
            version: r.version,
        }
    }
}

const ATTENDANCE_COLUMNS: &str = "id, employee_id, company_id, date, shift_id, status, punches, \
     punch_in, punch_out, total_hundredths, is_late, late_by_minutes, is_early_exit, \
     early_exit_by_minutes, is_half_day, is_wfh, is_manual_entry, manual_entry_by, \
     manual_entry_reason, remarks, leave_request_id, created_at, updated_at, version";

// -- Directory --

#[async_trait]
impl Directory for PgStore {
    async fn employee(&self, id: Uuid) -> StoreResult<Option<Employee>> {
        let row = sqlx::query_as::<_, EmployeeRow>(&format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Employee::from))
    }

    async fn active_employees(&self, company_id: Uuid) -> StoreResult<Vec<Employee>> {
        let rows = sqlx::query_as::<_, EmployeeRow>(&format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employees \
             WHERE company_id = $1 AND is_active ORDER BY first_name"
        ))
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Employee::from).collect())
    }

    async fn direct_reports(&self, manager_id: Uuid) -> StoreResult<Vec<Employee>> {
        let rows = sqlx::query_as::<_, EmployeeRow>(&format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employees \
             WHERE manager_id = $1 AND is_active ORDER BY first_name"
        ))
        .bind(manager_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Employee::from).collect())
    }

    async fn hr_approver(&self, company_id: Uuid) -> StoreResult<Option<Uuid>> {
        let id: Option<Option<Uuid>> =
            sqlx::query_scalar("SELECT hr_approver_id FROM companies WHERE id = $1")
                .bind(company_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(id.flatten())
    }

    async fn set_face_id(&self, employee_id: Uuid, face_id: Option<String>) -> StoreResult<()> {
        sqlx::query("UPDATE employees SET face_id = $2 WHERE id = $1")
            .bind(employee_id)
            .bind(face_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ShiftPolicyStore for PgStore {
    async fn shift_policy(&self, employee_id: Uuid) -> StoreResult<Option<ShiftPolicy>> {
        let row = sqlx::query_as::<_, ShiftRow>(
            r#"
            SELECT s.id, s.name, s.start_time, s.end_time, s.grace_minutes,
                   s.half_day_hundredths, s.weekly_offs
            FROM shifts s
            JOIN employees e ON e.shift_id = s.id
            WHERE e.id = $1
            "#,
        )
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ShiftPolicy::try_from).transpose()
    }
}

#[async_trait]
impl LeaveTypeStore for PgStore {
    async fn leave_type(&self, id: Uuid) -> StoreResult<Option<LeaveType>> {
        let row = sqlx::query_as::<_, LeaveTypeRow>(&format!(
            "SELECT {LEAVE_TYPE_COLUMNS} FROM leave_types WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(LeaveType::from))
    }

    async fn active_leave_types(&self, company_id: Uuid) -> StoreResult<Vec<LeaveType>> {
        let rows = sqlx::query_as::<_, LeaveTypeRow>(&format!(
            "SELECT {LEAVE_TYPE_COLUMNS} FROM leave_types \
             WHERE company_id = $1 AND is_active ORDER BY name"
        ))
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(LeaveType::from).collect())
    }
}

// -- Balances --

#[async_trait]
impl BalanceStore for PgStore {
    async fn balances(&self, employee_id: Uuid) -> StoreResult<LeaveBalance> {
        let rows: Vec<(Uuid, i64)> = sqlx::query_as(
            "SELECT leave_type_id, half_days FROM leave_balances WHERE employee_id = $1",
        )
        .bind(employee_id)
        .fetch_all(&self.pool)
        .await?;

        let mut balance = LeaveBalance::default();
        for (lt, halves) in rows {
            balance.set(lt, Days::from_halves(halves));
        }
        Ok(balance)
    }

    async fn adjust(&self, employee_id: Uuid, leave_type_id: Uuid, delta: Days) -> StoreResult<Option<Days>> {
        // The guarded UPDATE is the compare-and-set: it only matches while the
        // result stays non-negative, so concurrent deductions cannot overdraw.
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO leave_balances (employee_id, leave_type_id, half_days) \
             VALUES ($1, $2, 0) ON CONFLICT DO NOTHING",
        )
        .bind(employee_id)
        .bind(leave_type_id)
        .execute(&mut *tx)
        .await?;

        let next: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE leave_balances
            SET half_days = half_days + $3, updated_at = now()
            WHERE employee_id = $1 AND leave_type_id = $2 AND half_days + $3 >= 0
            RETURNING half_days
            "#,
        )
        .bind(employee_id)
        .bind(leave_type_id)
        .bind(delta.halves())
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(next.map(Days::from_halves))
    }

    async fn credit_capped(&self, employee_id: Uuid, leave_type_id: Uuid, amount: Days, cap: Days) -> StoreResult<Days> {
        let next: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO leave_balances (employee_id, leave_type_id, half_days)
            VALUES ($1, $2, LEAST($3, $4))
            ON CONFLICT (employee_id, leave_type_id) DO UPDATE
            SET half_days = GREATEST(
                    leave_balances.half_days,
                    LEAST(leave_balances.half_days + $3, $4)
                ),
                updated_at = now()
            RETURNING half_days
            "#,
        )
        .bind(employee_id)
        .bind(leave_type_id)
        .bind(amount.halves())
        .bind(cap.halves())
        .fetch_one(&self.pool)
        .await?;
        Ok(Days::from_halves(next))
    }

    async fn set(&self, employee_id: Uuid, leave_type_id: Uuid, value: Days) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO leave_balances (employee_id, leave_type_id, half_days)
            VALUES ($1, $2, $3)
            ON CONFLICT (employee_id, leave_type_id) DO UPDATE
            SET half_days = EXCLUDED.half_days, updated_at = now()
            "#,
        )
        .bind(employee_id)
        .bind(leave_type_id)
        .bind(value.halves())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// -- Leave requests --

#[async_trait]
impl LeaveRequestStore for PgStore {
    async fn insert(&self, r: &LeaveRequest) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO leave_requests ({LEAVE_REQUEST_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
              $18, $19, $20, $21, $22, $23, $24, $25)"
        ))
        .bind(r.id)
        .bind(r.employee_id)
        .bind(r.company_id)
        .bind(r.leave_type_id)
        .bind(&r.leave_type_code)
        .bind(&r.leave_type_name)
        .bind(r.from_date)
        .bind(r.to_date)
        .bind(r.is_half_day)
        .bind(r.half_day_period.map(|p| p.as_str()))
        .bind(r.total_days.halves())
        .bind(&r.reason)
        .bind(r.status)
        .bind(Json(&r.approval_chain))
        .bind(r.current_approval_level as i32)
        .bind(r.final_approver_id)
        .bind(r.final_approved_at)
        .bind(r.rejected_by)
        .bind(r.rejected_at)
        .bind(&r.rejection_reason)
        .bind(r.cancelled_at)
        .bind(&r.cancellation_reason)
        .bind(r.created_at)
        .bind(r.updated_at)
        .bind(r.version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<LeaveRequest>> {
        let row = sqlx::query_as::<_, LeaveRequestRow>(&format!(
            "SELECT {LEAVE_REQUEST_COLUMNS} FROM leave_requests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(LeaveRequest::try_from).transpose()
    }

    async fn update(&self, r: &LeaveRequest) -> StoreResult<LeaveRequest> {
        let row = sqlx::query_as::<_, LeaveRequestRow>(&format!(
            r#"
            UPDATE leave_requests SET
                status = $3, approval_chain = $4, current_approval_level = $5,
                final_approver_id = $6, final_approved_at = $7,
                rejected_by = $8, rejected_at = $9, rejection_reason = $10,
                cancelled_at = $11, cancellation_reason = $12,
                updated_at = $13, version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING {LEAVE_REQUEST_COLUMNS}
            "#
        ))
        .bind(r.id)
        .bind(r.version)
        .bind(r.status)
        .bind(Json(&r.approval_chain))
        .bind(r.current_approval_level as i32)
        .bind(r.final_approver_id)
        .bind(r.final_approved_at)
        .bind(r.rejected_by)
        .bind(r.rejected_at)
        .bind(&r.rejection_reason)
        .bind(r.cancelled_at)
        .bind(&r.cancellation_reason)
        .bind(r.updated_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::VersionConflict)?;
        LeaveRequest::try_from(row)
    }

    async fn find_overlapping(&self, employee_id: Uuid, from: Date, to: Date) -> StoreResult<Option<LeaveRequest>> {
        let row = sqlx::query_as::<_, LeaveRequestRow>(&format!(
            "SELECT {LEAVE_REQUEST_COLUMNS} FROM leave_requests \
             WHERE employee_id = $1 AND status IN ('pending', 'approved') \
               AND from_date <= $3 AND to_date >= $2 \
             LIMIT 1"
        ))
        .bind(employee_id)
        .bind(from)
        .bind(to)
        .fetch_optional(&self.pool)
        .await?;
        row.map(LeaveRequest::try_from).transpose()
    }

    async fn list_for_employee(&self, employee_id: Uuid, query: &LeaveQuery) -> StoreResult<Vec<LeaveRequest>> {
        let rows = sqlx::query_as::<_, LeaveRequestRow>(&format!(
            "SELECT {LEAVE_REQUEST_COLUMNS} FROM leave_requests \
             WHERE employee_id = $1 \
               AND ($2::leave_status IS NULL OR status = $2) \
               AND ($3::date IS NULL OR from_date >= $3) \
               AND ($4::date IS NULL OR from_date <= $4) \
             ORDER BY created_at DESC LIMIT $5 OFFSET $6"
        ))
        .bind(employee_id)
        .bind(query.status)
        .bind(query.from)
        .bind(query.to)
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LeaveRequest::try_from).collect()
    }

    async fn total_days(&self, employee_id: Uuid, leave_type_id: Uuid, status: LeaveStatus, year: Option<i32>) -> StoreResult<Days> {
        let halves: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(total_halves), 0)::BIGINT FROM leave_requests
            WHERE employee_id = $1 AND leave_type_id = $2 AND status = $3
              AND ($4::int IS NULL OR EXTRACT(YEAR FROM from_date)::int = $4)
            "#,
        )
        .bind(employee_id)
        .bind(leave_type_id)
        .bind(status)
        .bind(year)
        .fetch_one(&self.pool)
        .await?;
        Ok(Days::from_halves(halves))
    }

    async fn pending_for_approver(&self, approver_id: Uuid, limit: i64, offset: i64) -> StoreResult<Vec<LeaveRequest>> {
        let rows = sqlx::query_as::<_, LeaveRequestRow>(&format!(
            "SELECT {LEAVE_REQUEST_COLUMNS} FROM leave_requests lr \
             WHERE lr.status = 'pending' AND EXISTS ( \
                 SELECT 1 FROM jsonb_array_elements(lr.approval_chain) s \
                 WHERE (s->>'level')::int = lr.current_approval_level \
                   AND (s->>'approver_id')::uuid = $1 \
                   AND s->>'status' = 'pending') \
             ORDER BY lr.created_at DESC LIMIT $2 OFFSET $3"
        ))
        .bind(approver_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LeaveRequest::try_from).collect()
    }

    async fn approved_in_range(&self, employee_ids: &[Uuid], from: Date, to: Date) -> StoreResult<Vec<LeaveRequest>> {
        let rows = sqlx::query_as::<_, LeaveRequestRow>(&format!(
            "SELECT {LEAVE_REQUEST_COLUMNS} FROM leave_requests \
             WHERE employee_id = ANY($1) AND status = 'approved' \
               AND from_date <= $3 AND to_date >= $2 \
             ORDER BY from_date"
        ))
        .bind(employee_ids)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LeaveRequest::try_from).collect()
    }
}

// -- Attendance --

#[async_trait]
impl AttendanceStore for PgStore {
    async fn get(&self, id: Uuid) -> StoreResult<Option<AttendanceRecord>> {
        let row = sqlx::query_as::<_, AttendanceRow>(&format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance_records WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(AttendanceRecord::from))
    }

    async fn find_by_day(&self, employee_id: Uuid, date: Date) -> StoreResult<Option<AttendanceRecord>> {
        let row = sqlx::query_as::<_, AttendanceRow>(&format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance_records \
             WHERE employee_id = $1 AND date = $2"
        ))
        .bind(employee_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(AttendanceRecord::from))
    }

    async fn insert_if_absent(&self, r: &AttendanceRecord) -> StoreResult<bool> {
        let result = sqlx::query(&format!(
            "INSERT INTO attendance_records ({ATTENDANCE_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
              $18, $19, $20, $21, $22, $23, $24) \
             ON CONFLICT (employee_id, date) DO NOTHING"
        ))
        .bind(r.id)
        .bind(r.employee_id)
        .bind(r.company_id)
        .bind(r.date)
        .bind(r.shift_id)
        .bind(r.status)
        .bind(Json(&r.punches))
        .bind(r.punch_in)
        .bind(r.punch_out)
        .bind(r.total_hours.hundredths())
        .bind(r.is_late)
        .bind(r.late_by_minutes)
        .bind(r.is_early_exit)
        .bind(r.early_exit_by_minutes)
        .bind(r.is_half_day)
        .bind(r.is_wfh)
        .bind(r.is_manual_entry)
        .bind(r.manual_entry_by)
        .bind(&r.manual_entry_reason)
        .bind(&r.remarks)
        .bind(r.leave_request_id)
        .bind(r.created_at)
        .bind(r.updated_at)
        .bind(r.version)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn update(&self, r: &AttendanceRecord) -> StoreResult<AttendanceRecord> {
        let row = sqlx::query_as::<_, AttendanceRow>(&format!(
            r#"
            UPDATE attendance_records SET
                status = $3, punches = $4, punch_in = $5, punch_out = $6,
                total_hundredths = $7, is_late = $8, late_by_minutes = $9,
                is_early_exit = $10, early_exit_by_minutes = $11, is_half_day = $12,
                is_wfh = $13, is_manual_entry = $14, manual_entry_by = $15,
                manual_entry_reason = $16, remarks = $17, updated_at = $18,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING {ATTENDANCE_COLUMNS}
            "#
        ))
        .bind(r.id)
        .bind(r.version)
        .bind(r.status)
        .bind(Json(&r.punches))
        .bind(r.punch_in)
        .bind(r.punch_out)
        .bind(r.total_hours.hundredths())
        .bind(r.is_late)
        .bind(r.late_by_minutes)
        .bind(r.is_early_exit)
        .bind(r.early_exit_by_minutes)
        .bind(r.is_half_day)
        .bind(r.is_wfh)
        .bind(r.is_manual_entry)
        .bind(r.manual_entry_by)
        .bind(&r.manual_entry_reason)
        .bind(&r.remarks)
        .bind(r.updated_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::VersionConflict)?;
        Ok(row.into())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM attendance_records WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_for_leave(&self, leave_request_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM attendance_records WHERE leave_request_id = $1")
            .bind(leave_request_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list_for_employee(&self, employee_id: Uuid, from: Date, to: Date, limit: i64, offset: i64) -> StoreResult<Vec<AttendanceRecord>> {
        let rows = sqlx::query_as::<_, AttendanceRow>(&format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance_records \
             WHERE employee_id = $1 AND date BETWEEN $2 AND $3 \
             ORDER BY date DESC LIMIT $4 OFFSET $5"
        ))
        .bind(employee_id)
        .bind(from)
        .bind(to)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(AttendanceRecord::from).collect())
    }

    async fn list_for_day(&self, employee_ids: &[Uuid], date: Date) -> StoreResult<Vec<AttendanceRecord>> {
        let rows = sqlx::query_as::<_, AttendanceRow>(&format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance_records \
             WHERE employee_id = ANY($1) AND date = $2"
        ))
        .bind(employee_ids)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(AttendanceRecord::from).collect())
    }
}

// -- Audit trail --

#[async_trait]
impl AuditSink for PgStore {
    async fn record(&self, event: &AuditEvent) -> Result<(), SinkError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs
                (company_id, module, action, performed_by, target_id,
                 before_state, after_state, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(event.company_id)
        .bind(event.module)
        .bind(&event.action)
        .bind(event.performed_by)
        .bind(event.target_id)
        .bind(event.before.as_ref().map(Json))
        .bind(event.after.as_ref().map(Json))
        .bind(event.metadata.as_ref().map(Json))
        .bind(event.at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }
}
