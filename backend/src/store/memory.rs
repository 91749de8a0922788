//! Process-local store. Every operation runs under one lock, which gives the
//! same atomicity guarantees the Postgres adapter gets from row locks and
//! unique constraints.

use std::cmp::Reverse;
use std::collections::HashMap;

use async_trait::async_trait;
use time::Date;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    AttendanceStore, BalanceStore, Directory, LeaveQuery, LeaveRequestStore, LeaveTypeStore,
    ShiftPolicyStore, StoreError, StoreResult,
};
use crate::models::{
    attendance::AttendanceRecord,
    days::Days,
    employee::Employee,
    leave::{LeaveBalance, LeaveRequest, LeaveStatus, LeaveType, StageStatus},
    shift::ShiftPolicy,
};

#[derive(Default)]
struct State {
    employees: HashMap<Uuid, Employee>,
    hr_approvers: HashMap<Uuid, Uuid>,
    shifts: HashMap<Uuid, ShiftPolicy>,
    leave_types: HashMap<Uuid, LeaveType>,
    balances: HashMap<(Uuid, Uuid), Days>,
    requests: HashMap<Uuid, LeaveRequest>,
    attendance: HashMap<Uuid, AttendanceRecord>,
    attendance_by_day: HashMap<(Uuid, Date), Uuid>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Reference data (owned by other services in production) --

    pub async fn add_employee(&self, employee: Employee) {
        self.state.lock().await.employees.insert(employee.id, employee);
    }

    pub async fn add_shift(&self, policy: ShiftPolicy) {
        self.state.lock().await.shifts.insert(policy.shift_id, policy);
    }

    pub async fn add_leave_type(&self, leave_type: LeaveType) {
        self.state.lock().await.leave_types.insert(leave_type.id, leave_type);
    }

    pub async fn set_hr_approver(&self, company_id: Uuid, approver_id: Uuid) {
        self.state.lock().await.hr_approvers.insert(company_id, approver_id);
    }
}

#[async_trait]
impl Directory for MemoryStore {
    async fn employee(&self, id: Uuid) -> StoreResult<Option<Employee>> {
        Ok(self.state.lock().await.employees.get(&id).cloned())
    }

    async fn active_employees(&self, company_id: Uuid) -> StoreResult<Vec<Employee>> {
        let state = self.state.lock().await;
        let mut out: Vec<Employee> = state
            .employees
            .values()
            .filter(|e| e.company_id == company_id && e.is_active)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.first_name.cmp(&b.first_name));
        Ok(out)
    }

    async fn direct_reports(&self, manager_id: Uuid) -> StoreResult<Vec<Employee>> {
        let state = self.state.lock().await;
        let mut out: Vec<Employee> = state
            .employees
            .values()
            .filter(|e| e.manager_id == Some(manager_id) && e.is_active)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.first_name.cmp(&b.first_name));
        Ok(out)
    }

    async fn hr_approver(&self, company_id: Uuid) -> StoreResult<Option<Uuid>> {
        Ok(self.state.lock().await.hr_approvers.get(&company_id).copied())
    }

    async fn set_face_id(&self, employee_id: Uuid, face_id: Option<String>) -> StoreResult<()> {
        if let Some(e) = self.state.lock().await.employees.get_mut(&employee_id) {
            e.face_id = face_id;
        }
        Ok(())
    }
}

#[async_trait]
impl ShiftPolicyStore for MemoryStore {
    async fn shift_policy(&self, employee_id: Uuid) -> StoreResult<Option<ShiftPolicy>> {
        let state = self.state.lock().await;
        Ok(state
            .employees
            .get(&employee_id)
            .and_then(|e| e.shift_id)
            .and_then(|sid| state.shifts.get(&sid))
            .cloned())
    }
}

#[async_trait]
impl LeaveTypeStore for MemoryStore {
    async fn leave_type(&self, id: Uuid) -> StoreResult<Option<LeaveType>> {
        Ok(self.state.lock().await.leave_types.get(&id).cloned())
    }

    async fn active_leave_types(&self, company_id: Uuid) -> StoreResult<Vec<LeaveType>> {
        let state = self.state.lock().await;
        let mut out: Vec<LeaveType> = state
            .leave_types
            .values()
            .filter(|t| t.company_id == company_id && t.is_active)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }
}

#[async_trait]
impl BalanceStore for MemoryStore {
    async fn balances(&self, employee_id: Uuid) -> StoreResult<LeaveBalance> {
        let state = self.state.lock().await;
        let mut balance = LeaveBalance::default();
        for ((emp, lt), days) in &state.balances {
            if *emp == employee_id {
                balance.set(*lt, *days);
            }
        }
        Ok(balance)
    }

    async fn adjust(&self, employee_id: Uuid, leave_type_id: Uuid, delta: Days) -> StoreResult<Option<Days>> {
        let mut state = self.state.lock().await;
        let slot = state.balances.entry((employee_id, leave_type_id)).or_default();
        let next = *slot + delta;
        if next.is_negative() {
            return Ok(None);
        }
        *slot = next;
        Ok(Some(next))
    }

    async fn credit_capped(&self, employee_id: Uuid, leave_type_id: Uuid, amount: Days, cap: Days) -> StoreResult<Days> {
        let mut state = self.state.lock().await;
        let slot = state.balances.entry((employee_id, leave_type_id)).or_default();
        *slot = (*slot).max((*slot + amount).min(cap));
        Ok(*slot)
    }

    async fn set(&self, employee_id: Uuid, leave_type_id: Uuid, value: Days) -> StoreResult<()> {
        self.state
            .lock()
            .await
            .balances
            .insert((employee_id, leave_type_id), value);
        Ok(())
    }
}

fn page<T>(items: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    items
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

#[async_trait]
impl LeaveRequestStore for MemoryStore {
    async fn insert(&self, request: &LeaveRequest) -> StoreResult<()> {
        self.state.lock().await.requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<LeaveRequest>> {
        Ok(self.state.lock().await.requests.get(&id).cloned())
    }

    async fn update(&self, request: &LeaveRequest) -> StoreResult<LeaveRequest> {
        let mut state = self.state.lock().await;
        let stored = state
            .requests
            .get_mut(&request.id)
            .ok_or(StoreError::VersionConflict)?;
        if stored.version != request.version {
            return Err(StoreError::VersionConflict);
        }
        let mut next = request.clone();
        next.version += 1;
        *stored = next.clone();
        Ok(next)
    }

    async fn find_overlapping(&self, employee_id: Uuid, from: Date, to: Date) -> StoreResult<Option<LeaveRequest>> {
        let state = self.state.lock().await;
        Ok(state
            .requests
            .values()
            .find(|r| r.employee_id == employee_id && r.status.holds_dates() && r.overlaps(from, to))
            .cloned())
    }

    async fn list_for_employee(&self, employee_id: Uuid, query: &LeaveQuery) -> StoreResult<Vec<LeaveRequest>> {
        let state = self.state.lock().await;
        let mut out: Vec<LeaveRequest> = state
            .requests
            .values()
            .filter(|r| r.employee_id == employee_id)
            .filter(|r| query.status.map_or(true, |s| r.status == s))
            .filter(|r| query.from.map_or(true, |d| r.from_date >= d))
            .filter(|r| query.to.map_or(true, |d| r.from_date <= d))
            .cloned()
            .collect();
        out.sort_by_key(|r| Reverse(r.created_at));
        Ok(page(out, query.limit, query.offset))
    }

    async fn total_days(&self, employee_id: Uuid, leave_type_id: Uuid, status: LeaveStatus, year: Option<i32>) -> StoreResult<Days> {
        let state = self.state.lock().await;
        Ok(state
            .requests
            .values()
            .filter(|r| r.employee_id == employee_id && r.leave_type_id == leave_type_id && r.status == status)
            .filter(|r| year.map_or(true, |y| r.from_date.year() == y))
            .map(|r| r.total_days)
            .sum())
    }

    async fn pending_for_approver(&self, approver_id: Uuid, limit: i64, offset: i64) -> StoreResult<Vec<LeaveRequest>> {
        let state = self.state.lock().await;
        let mut out: Vec<LeaveRequest> = state
            .requests
            .values()
            .filter(|r| r.status == LeaveStatus::Pending)
            .filter(|r| {
                r.current_stage()
                    .is_some_and(|s| s.approver_id == approver_id && s.status == StageStatus::Pending)
            })
            .cloned()
            .collect();
        out.sort_by_key(|r| Reverse(r.created_at));
        Ok(page(out, limit, offset))
    }

    async fn approved_in_range(&self, employee_ids: &[Uuid], from: Date, to: Date) -> StoreResult<Vec<LeaveRequest>> {
        let state = self.state.lock().await;
        let mut out: Vec<LeaveRequest> = state
            .requests
            .values()
            .filter(|r| employee_ids.contains(&r.employee_id))
            .filter(|r| r.status == LeaveStatus::Approved && r.overlaps(from, to))
            .cloned()
            .collect();
        out.sort_by_key(|r| r.from_date);
        Ok(out)
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn get(&self, id: Uuid) -> StoreResult<Option<AttendanceRecord>> {
        Ok(self.state.lock().await.attendance.get(&id).cloned())
    }

    async fn find_by_day(&self, employee_id: Uuid, date: Date) -> StoreResult<Option<AttendanceRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .attendance_by_day
            .get(&(employee_id, date))
            .and_then(|id| state.attendance.get(id))
            .cloned())
    }

    async fn insert_if_absent(&self, record: &AttendanceRecord) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let key = (record.employee_id, record.date);
        if state.attendance_by_day.contains_key(&key) {
            return Ok(false);
        }
        state.attendance_by_day.insert(key, record.id);
        state.attendance.insert(record.id, record.clone());
        Ok(true)
    }

    async fn update(&self, record: &AttendanceRecord) -> StoreResult<AttendanceRecord> {
        let mut state = self.state.lock().await;
        let stored = state
            .attendance
            .get_mut(&record.id)
            .ok_or(StoreError::VersionConflict)?;
        if stored.version != record.version {
            return Err(StoreError::VersionConflict);
        }
        let mut next = record.clone();
        next.version += 1;
        *stored = next.clone();
        Ok(next)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        match state.attendance.remove(&id) {
            Some(rec) => {
                state.attendance_by_day.remove(&(rec.employee_id, rec.date));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_for_leave(&self, leave_request_id: Uuid) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let doomed: Vec<(Uuid, Uuid, Date)> = state
            .attendance
            .values()
            .filter(|r| r.leave_request_id == Some(leave_request_id))
            .map(|r| (r.id, r.employee_id, r.date))
            .collect();
        for (id, employee_id, date) in &doomed {
            state.attendance.remove(id);
            state.attendance_by_day.remove(&(*employee_id, *date));
        }
        Ok(doomed.len() as u64)
    }

    async fn list_for_employee(&self, employee_id: Uuid, from: Date, to: Date, limit: i64, offset: i64) -> StoreResult<Vec<AttendanceRecord>> {
        let state = self.state.lock().await;
        let mut out: Vec<AttendanceRecord> = state
            .attendance
            .values()
            .filter(|r| r.employee_id == employee_id && r.date >= from && r.date <= to)
            .cloned()
            .collect();
        out.sort_by_key(|r| Reverse(r.date));
        Ok(page(out, limit, offset))
    }

    async fn list_for_day(&self, employee_ids: &[Uuid], date: Date) -> StoreResult<Vec<AttendanceRecord>> {
        let state = self.state.lock().await;
        Ok(employee_ids
            .iter()
            .filter_map(|e| state.attendance_by_day.get(&(*e, date)))
            .filter_map(|id| state.attendance.get(id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use time::macros::{date, datetime};

    use super::*;

    #[tokio::test]
    async fn adjust_refuses_to_go_negative() {
        let store = MemoryStore::new();
        let (emp, lt) = (Uuid::new_v4(), Uuid::new_v4());
        store.set(emp, lt, Days::whole(2)).await.unwrap();

        assert_eq!(store.adjust(emp, lt, -Days::whole(3)).await.unwrap(), None);
        assert_eq!(store.balances(emp).await.unwrap().get(lt), Days::whole(2));
        assert_eq!(store.adjust(emp, lt, -Days::whole(2)).await.unwrap(), Some(Days::ZERO));
    }

    #[tokio::test]
    async fn credit_capped_never_lowers() {
        let store = MemoryStore::new();
        let (emp, lt) = (Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(store.credit_capped(emp, lt, Days::whole(1), Days::whole(12)).await.unwrap(), Days::whole(1));
        store.set(emp, lt, Days::from_halves(23)).await.unwrap();
        assert_eq!(store.credit_capped(emp, lt, Days::whole(1), Days::whole(12)).await.unwrap(), Days::whole(12));
        store.set(emp, lt, Days::whole(15)).await.unwrap();
        assert_eq!(store.credit_capped(emp, lt, Days::whole(1), Days::whole(12)).await.unwrap(), Days::whole(15));
    }

    #[tokio::test]
    async fn attendance_day_is_unique_and_versioned() {
        let store = MemoryStore::new();
        let now = datetime!(2026-03-02 09:00 UTC);
        let rec = AttendanceRecord::new(Uuid::new_v4(), Uuid::new_v4(), date!(2026-03-02), None, now);
        let twin = AttendanceRecord::new(rec.employee_id, rec.company_id, rec.date, None, now);

        assert!(store.insert_if_absent(&rec).await.unwrap());
        assert!(!store.insert_if_absent(&twin).await.unwrap());

        let updated = AttendanceStore::update(&store, &rec).await.unwrap();
        assert_eq!(updated.version, 1);
        // Stale copy loses.
        assert!(matches!(
            AttendanceStore::update(&store, &rec).await,
            Err(StoreError::VersionConflict)
        ));
    }
}
