//! Shared setup for the service tests: one company with a manager, an HR
//! approver and an employee reporting to the manager, two leave types and a
//! general shift, all on an in-memory store with a fixed clock.

use std::sync::Arc;

use time::macros::{date, datetime, time};
use time::Date;
use uuid::Uuid;

use crate::auth::Role;
use crate::calendar::{Calendar, Clock, FixedClock, WeeklyOffs};
use crate::models::{
    attendance::AttendanceStatus,
    days::{Days, Hours},
    employee::Employee,
    leave::{LeaveRequest, LeaveStatus, LeaveType},
    shift::ShiftPolicy,
};
use crate::services::face::MockFaceProvider;
use crate::services::sinks::{MemoryAuditSink, MemoryNotificationSink, Sinks};
use crate::services::{Actor, AttendanceService, LeaveLedger, LeaveWorkflow};
use crate::store::{AttendanceStore, BalanceStore, LeaveRequestStore, MemoryStore, Stores};

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub stores: Stores,
    pub clock: Arc<FixedClock>,
    pub calendar: Calendar,
    pub notifications: Arc<MemoryNotificationSink>,
    pub audit: Arc<MemoryAuditSink>,
    pub sinks: Sinks,
    pub face: Arc<MockFaceProvider>,
    pub company: Uuid,
    pub manager: Employee,
    pub hr: Employee,
    pub employee: Employee,
    pub shift: ShiftPolicy,
    pub casual: LeaveType,
    pub earned: LeaveType,
}

fn person(company_id: Uuid, first: &str, role: Role, manager_id: Option<Uuid>, shift_id: Option<Uuid>, joined: Date) -> Employee {
    let id = Uuid::new_v4();
    Employee {
        id,
        company_id,
        employee_code: format!("E-{}", &id.simple().to_string()[..6]),
        first_name: first.into(),
        last_name: "Test".into(),
        email: format!("{}@example.com", first.to_lowercase()),
        role,
        manager_id,
        shift_id,
        date_of_joining: joined,
        face_id: None,
        is_active: true,
    }
}

impl Fixture {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let stores = Stores::from_backend(store.clone());
        let clock = Arc::new(FixedClock::new(datetime!(2026-03-02 08:00 UTC)));
        let notifications = Arc::new(MemoryNotificationSink::default());
        let audit = Arc::new(MemoryAuditSink::default());
        let sinks = Sinks::new(notifications.clone(), audit.clone());
        let company = Uuid::new_v4();

        let shift = ShiftPolicy {
            shift_id: Uuid::new_v4(),
            name: "General".into(),
            start_time: time!(09:00),
            end_time: time!(18:00),
            grace_minutes: 15,
            half_day_hours: Hours::whole(4),
            weekly_offs: WeeklyOffs::WEEKEND,
        };
        store.add_shift(shift.clone()).await;

        let joined = date!(2024-01-01);
        let manager = person(company, "Maya", Role::Manager, None, Some(shift.shift_id), joined);
        let hr = person(company, "Harper", Role::Hr, None, Some(shift.shift_id), joined);
        let employee = person(company, "Eli", Role::Employee, Some(manager.id), Some(shift.shift_id), joined);
        for e in [&manager, &hr, &employee] {
            store.add_employee(e.clone()).await;
        }
        store.set_hr_approver(company, hr.id).await;

        let casual = LeaveType {
            id: Uuid::new_v4(),
            company_id: company,
            code: "CL".into(),
            name: "Casual Leave".into(),
            yearly_quota: Days::whole(12),
            is_paid: true,
            is_carry_forward: false,
            max_carry_forward: Days::ZERO,
            requires_approval: false,
            approval_levels: 1,
            can_apply_half_day: true,
            min_days_notice: 0,
            max_consecutive_days: None,
            is_accrual: false,
            accrual_rate: Days::ZERO,
            is_active: true,
        };
        let earned = LeaveType {
            id: Uuid::new_v4(),
            code: "EL".into(),
            name: "Earned Leave".into(),
            yearly_quota: Days::whole(18),
            is_carry_forward: true,
            max_carry_forward: Days::whole(5),
            is_accrual: true,
            accrual_rate: Days::from_halves(3),
            ..casual.clone()
        };
        store.add_leave_type(casual.clone()).await;
        store.add_leave_type(earned.clone()).await;

        Self {
            store,
            stores,
            clock,
            calendar: Calendar::default(),
            notifications,
            audit,
            sinks,
            face: Arc::new(MockFaceProvider::default()),
            company,
            manager,
            hr,
            employee,
            shift,
            casual,
            earned,
        }
    }

    pub fn ledger(&self) -> LeaveLedger {
        LeaveLedger::new(self.stores.clone(), self.clock.clone(), self.calendar, self.sinks.clone())
    }

    pub fn workflow(&self) -> LeaveWorkflow {
        LeaveWorkflow::new(
            self.stores.clone(),
            self.ledger(),
            self.clock.clone(),
            self.calendar,
            WeeklyOffs::WEEKEND,
            self.sinks.clone(),
        )
    }

    pub fn attendance(&self) -> AttendanceService {
        AttendanceService::new(
            self.stores.clone(),
            self.face.clone(),
            self.clock.clone(),
            self.calendar,
            self.sinks.clone(),
        )
    }

    pub fn actor(&self, employee: &Employee) -> Actor {
        Actor {
            id: employee.id,
            company_id: employee.company_id,
            role: employee.role,
        }
    }

    /// Adds an employee on the general shift.
    pub async fn hire(&self, date_of_joining: Date, manager_id: Option<Uuid>) -> Employee {
        let e = person(self.company, "Nora", Role::Employee, manager_id, Some(self.shift.shift_id), date_of_joining);
        self.store.add_employee(e.clone()).await;
        e
    }

    /// Employee on a 22:00-06:00 shift reporting to the manager.
    pub async fn night_shift_employee(&self) -> Employee {
        let night = ShiftPolicy {
            shift_id: Uuid::new_v4(),
            name: "Night".into(),
            start_time: time!(22:00),
            end_time: time!(06:00),
            ..self.shift.clone()
        };
        self.store.add_shift(night.clone()).await;
        let e = person(self.company, "Owen", Role::Employee, Some(self.manager.id), Some(night.shift_id), date!(2024-01-01));
        self.store.add_employee(e.clone()).await;
        e
    }

    pub async fn set_balance(&self, employee_id: Uuid, leave_type_id: Uuid, value: Days) {
        self.store.set(employee_id, leave_type_id, value).await.unwrap();
    }

    pub async fn store_balance(&self, employee_id: Uuid, leave_type_id: Uuid) -> Days {
        self.store.balances(employee_id).await.unwrap().get(leave_type_id)
    }

    /// A pending request written straight to the store, bypassing validation.
    pub async fn insert_pending(&self, employee_id: Uuid, leave_type: &LeaveType, days: Days) -> LeaveRequest {
        let now = self.clock.now();
        let request = LeaveRequest {
            id: Uuid::new_v4(),
            employee_id,
            company_id: self.company,
            leave_type_id: leave_type.id,
            leave_type_code: leave_type.code.clone(),
            leave_type_name: leave_type.name.clone(),
            from_date: date!(2026-06-01),
            to_date: date!(2026-06-01) + time::Duration::days((days.floor_whole().halves() / 2 - 1).max(0)),
            is_half_day: false,
            half_day_period: None,
            total_days: days,
            reason: "seeded".into(),
            status: LeaveStatus::Pending,
            approval_chain: Vec::new(),
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
        LeaveRequestStore::insert(self.store.as_ref(), &request).await.unwrap();
        request
    }

    pub async fn on_leave_days(&self, employee_id: Uuid) -> usize {
        AttendanceStore::list_for_employee(self.store.as_ref(), employee_id, date!(2000-01-01), date!(2100-12-31), 10_000, 0)
            .await
            .unwrap()
            .iter()
            .filter(|r| r.status == AttendanceStatus::OnLeave)
            .count()
    }
}
