//! Storage ports for the attendance and leave engines.
//!
//! Any backing store must provide two atomic primitives: insert-if-absent on
//! (employee, date) for attendance, and compare-and-set on leave balances and
//! on versioned records (leave requests, attendance records).

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use time::Date;
use uuid::Uuid;

use crate::models::{
    attendance::AttendanceRecord,
    days::Days,
    employee::Employee,
    leave::{LeaveBalance, LeaveRequest, LeaveStatus, LeaveType},
    shift::ShiftPolicy,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The record's version no longer matches; another writer got there first.
    #[error("record was modified concurrently")]
    VersionConflict,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored value is invalid: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Employee / org directory lookups.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn employee(&self, id: Uuid) -> StoreResult<Option<Employee>>;

    async fn active_employees(&self, company_id: Uuid) -> StoreResult<Vec<Employee>>;

    /// Active employees whose manager is `manager_id`.
    async fn direct_reports(&self, manager_id: Uuid) -> StoreResult<Vec<Employee>>;

    /// Person who acts on the HR stage of approval chains for a company.
    async fn hr_approver(&self, company_id: Uuid) -> StoreResult<Option<Uuid>>;

    async fn set_face_id(&self, employee_id: Uuid, face_id: Option<String>) -> StoreResult<()>;
}

#[async_trait]
pub trait ShiftPolicyStore: Send + Sync {
    /// `None` when the employee has no shift assigned.
    async fn shift_policy(&self, employee_id: Uuid) -> StoreResult<Option<ShiftPolicy>>;
}

#[async_trait]
pub trait LeaveTypeStore: Send + Sync {
    async fn leave_type(&self, id: Uuid) -> StoreResult<Option<LeaveType>>;

    async fn active_leave_types(&self, company_id: Uuid) -> StoreResult<Vec<LeaveType>>;
}

#[async_trait]
pub trait BalanceStore: Send + Sync {
    async fn balances(&self, employee_id: Uuid) -> StoreResult<LeaveBalance>;

    /// Atomically adds `delta` (which may be negative). Returns the new value,
    /// or `None` without writing anything if the result would drop below zero.
    async fn adjust(&self, employee_id: Uuid, leave_type_id: Uuid, delta: Days) -> StoreResult<Option<Days>>;

    /// Atomically credits `amount`, never taking the balance above `cap` and
    /// never lowering a balance that already exceeds it.
    async fn credit_capped(&self, employee_id: Uuid, leave_type_id: Uuid, amount: Days, cap: Days) -> StoreResult<Days>;

    async fn set(&self, employee_id: Uuid, leave_type_id: Uuid, value: Days) -> StoreResult<()>;
}

#[derive(Debug, Clone, Default)]
pub struct LeaveQuery {
    pub status: Option<LeaveStatus>,
    /// Requests whose `from_date` is on or after this day.
    pub from: Option<Date>,
    /// Requests whose `from_date` is on or before this day.
    pub to: Option<Date>,
    pub limit: i64,
    pub offset: i64,
}

#[async_trait]
pub trait LeaveRequestStore: Send + Sync {
    async fn insert(&self, request: &LeaveRequest) -> StoreResult<()>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<LeaveRequest>>;

    /// Compare-and-set on `request.version`. On success the stored copy (with
    /// its bumped version) is returned; otherwise `StoreError::VersionConflict`.
    async fn update(&self, request: &LeaveRequest) -> StoreResult<LeaveRequest>;

    /// A pending or approved request of the employee intersecting `[from, to]`.
    async fn find_overlapping(&self, employee_id: Uuid, from: Date, to: Date) -> StoreResult<Option<LeaveRequest>>;

    /// Newest first.
    async fn list_for_employee(&self, employee_id: Uuid, query: &LeaveQuery) -> StoreResult<Vec<LeaveRequest>>;

    /// Sum of `total_days` over requests in `status`, optionally restricted to
    /// those whose `from_date` falls in `year`.
    async fn total_days(&self, employee_id: Uuid, leave_type_id: Uuid, status: LeaveStatus, year: Option<i32>) -> StoreResult<Days>;

    /// Pending requests whose current stage is assigned to `approver_id` and still pending.
    async fn pending_for_approver(&self, approver_id: Uuid, limit: i64, offset: i64) -> StoreResult<Vec<LeaveRequest>>;

    /// Approved requests of the given employees intersecting `[from, to]`, ordered by `from_date`.
    async fn approved_in_range(&self, employee_ids: &[Uuid], from: Date, to: Date) -> StoreResult<Vec<LeaveRequest>>;
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn get(&self, id: Uuid) -> StoreResult<Option<AttendanceRecord>>;

    async fn find_by_day(&self, employee_id: Uuid, date: Date) -> StoreResult<Option<AttendanceRecord>>;

    /// Inserts unless a record for `(employee_id, date)` already exists.
    /// Returns `false` when it does; never creates a duplicate.
    async fn insert_if_absent(&self, record: &AttendanceRecord) -> StoreResult<bool>;

    /// Compare-and-set on `record.version`, like [`LeaveRequestStore::update`].
    async fn update(&self, record: &AttendanceRecord) -> StoreResult<AttendanceRecord>;

    async fn delete(&self, id: Uuid) -> StoreResult<bool>;

    /// Removes records materialized for a leave request. Returns how many went.
    async fn delete_for_leave(&self, leave_request_id: Uuid) -> StoreResult<u64>;

    /// Records in `[from, to]`, newest first.
    async fn list_for_employee(&self, employee_id: Uuid, from: Date, to: Date, limit: i64, offset: i64) -> StoreResult<Vec<AttendanceRecord>>;

    async fn list_for_day(&self, employee_ids: &[Uuid], date: Date) -> StoreResult<Vec<AttendanceRecord>>;
}

/// Every port the engines need, usually all backed by the same adapter.
#[derive(Clone)]
pub struct Stores {
    pub directory: Arc<dyn Directory>,
    pub shifts: Arc<dyn ShiftPolicyStore>,
    pub leave_types: Arc<dyn LeaveTypeStore>,
    pub balances: Arc<dyn BalanceStore>,
    pub requests: Arc<dyn LeaveRequestStore>,
    pub attendance: Arc<dyn AttendanceStore>,
}

impl Stores {
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: Directory
            + ShiftPolicyStore
            + LeaveTypeStore
            + BalanceStore
            + LeaveRequestStore
            + AttendanceStore
            + 'static,
    {
        Self {
            directory: backend.clone(),
            shifts: backend.clone(),
            leave_types: backend.clone(),
            balances: backend.clone(),
            requests: backend.clone(),
            attendance: backend,
        }
    }
}
