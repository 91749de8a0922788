use std::sync::Arc;

use serde::Serialize;
use time::Date;
use uuid::Uuid;

use crate::calendar::{Calendar, Clock};
use crate::models::{
    days::Days,
    leave::{BalanceLine, LeaveBalance, LeaveStatus, LeaveType},
};
use crate::services::sinks::{AuditEvent, Sinks, MODULE_LEAVE};
use crate::services::{Actor, DomainError, DomainResult};
use crate::store::Stores;

/// Outcome of a company-wide balance batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub employees: usize,
    pub leave_types: usize,
}

/// Per-employee, per-leave-type balances.
///
/// The stored balance is decremented when a request is finally approved, so
/// approved leave is already reflected in it. Availability only has to hold
/// back what is still pending.
#[derive(Clone)]
pub struct LeaveLedger {
    stores: Stores,
    clock: Arc<dyn Clock>,
    calendar: Calendar,
    sinks: Sinks,
}

impl LeaveLedger {
    pub fn new(stores: Stores, clock: Arc<dyn Clock>, calendar: Calendar, sinks: Sinks) -> Self {
        Self { stores, clock, calendar, sinks }
    }

    fn today(&self) -> Date {
        self.calendar.local_date(self.clock.now())
    }

    pub async fn available_balance(&self, employee_id: Uuid, leave_type_id: Uuid) -> DomainResult<Days> {
        let balance = self.stores.balances.balances(employee_id).await?.get(leave_type_id);
        let pending = self
            .stores
            .requests
            .total_days(employee_id, leave_type_id, LeaveStatus::Pending, None)
            .await?;
        Ok(balance - pending)
    }

    /// Advisory only: nothing is reserved, so two concurrent applications can
    /// both pass. [`deduct`](Self::deduct) is the authoritative check.
    pub async fn has_sufficient_balance(&self, employee_id: Uuid, leave_type_id: Uuid, days: Days) -> DomainResult<bool> {
        Ok(self.available_balance(employee_id, leave_type_id).await? >= days)
    }

    pub async fn deduct(&self, employee_id: Uuid, leave_type_id: Uuid, days: Days) -> DomainResult<Days> {
        match self.stores.balances.adjust(employee_id, leave_type_id, -days).await? {
            Some(next) => {
                tracing::info!(%employee_id, %leave_type_id, %days, remaining = %next, "leave balance deducted");
                Ok(next)
            }
            None => {
                let available = self.stores.balances.balances(employee_id).await?.get(leave_type_id);
                Err(DomainError::InsufficientBalance { available, requested: days })
            }
        }
    }

    pub async fn restore(&self, employee_id: Uuid, leave_type_id: Uuid, days: Days) -> DomainResult<Days> {
        let next = self
            .stores
            .balances
            .adjust(employee_id, leave_type_id, days)
            .await?
            .ok_or_else(|| DomainError::Validation("restore amount must not be negative".into()))?;
        tracing::info!(%employee_id, %leave_type_id, %days, balance = %next, "leave balance restored");
        Ok(next)
    }

    /// Credits each accrual type's monthly rate to every active employee,
    /// capped at the yearly quota.
    pub async fn accrue_monthly(&self, actor: Uuid, company_id: Uuid) -> DomainResult<BatchOutcome> {
        let types: Vec<LeaveType> = self
            .stores
            .leave_types
            .active_leave_types(company_id)
            .await?
            .into_iter()
            .filter(|t| t.is_accrual)
            .collect();
        let employees = self.stores.directory.active_employees(company_id).await?;

        for employee in &employees {
            for lt in &types {
                self.stores
                    .balances
                    .credit_capped(employee.id, lt.id, lt.accrual_rate, lt.yearly_quota)
                    .await?;
            }
        }

        let outcome = BatchOutcome { employees: employees.len(), leave_types: types.len() };
        tracing::info!(%company_id, employees = outcome.employees, leave_types = outcome.leave_types, "monthly accrual complete");
        self.sinks
            .audit(
                AuditEvent::new(MODULE_LEAVE, "ACCRUE_MONTHLY", actor, company_id, self.clock.now())
                    .metadata(serde_json::to_value(outcome).unwrap_or_default()),
            )
            .await;
        Ok(outcome)
    }

    /// Start-of-year reset: quota plus whatever carry-forward allows.
    pub async fn reset_yearly(&self, actor: Uuid, company_id: Uuid) -> DomainResult<BatchOutcome> {
        let types = self.stores.leave_types.active_leave_types(company_id).await?;
        let employees = self.stores.directory.active_employees(company_id).await?;

        for employee in &employees {
            let current = self.stores.balances.balances(employee.id).await?;
            for lt in &types {
                let carried = if lt.is_carry_forward {
                    current.get(lt.id).min(lt.max_carry_forward).max(Days::ZERO)
                } else {
                    Days::ZERO
                };
                self.stores
                    .balances
                    .set(employee.id, lt.id, lt.yearly_quota + carried)
                    .await?;
            }
        }

        let outcome = BatchOutcome { employees: employees.len(), leave_types: types.len() };
        tracing::info!(%company_id, employees = outcome.employees, "yearly balance reset complete");
        self.sinks
            .audit(
                AuditEvent::new(MODULE_LEAVE, "RESET_YEARLY", actor, company_id, self.clock.now())
                    .metadata(serde_json::to_value(outcome).unwrap_or_default()),
            )
            .await;
        Ok(outcome)
    }

    /// Seeds a new hire's balances for every active leave type.
    pub async fn initialize_balance(&self, actor: &Actor, employee_id: Uuid) -> DomainResult<LeaveBalance> {
        let employee = self
            .stores
            .directory
            .employee(employee_id)
            .await?
            .filter(|e| e.company_id == actor.company_id)
            .ok_or_else(|| DomainError::NotFound("Employee".into()))?;
        let types = self.stores.leave_types.active_leave_types(employee.company_id).await?;
        let today = self.today();

        let mut balance = LeaveBalance::default();
        for lt in &types {
            let opening = if lt.is_accrual {
                Days::ZERO
            } else {
                pro_rate(lt.yearly_quota, employee.date_of_joining, today)
            };
            self.stores.balances.set(employee.id, lt.id, opening).await?;
            balance.set(lt.id, opening);
        }

        self.sinks
            .audit(
                AuditEvent::new(MODULE_LEAVE, "INITIALIZE_BALANCE", actor.id, employee.company_id, self.clock.now())
                    .target(employee.id)
                    .after(&balance),
            )
            .await;
        Ok(balance)
    }

    pub async fn balance_summary(&self, employee_id: Uuid) -> DomainResult<Vec<BalanceLine>> {
        let employee = self
            .stores
            .directory
            .employee(employee_id)
            .await?
            .ok_or_else(|| DomainError::NotFound("Employee".into()))?;
        let types = self.stores.leave_types.active_leave_types(employee.company_id).await?;
        let balances = self.stores.balances.balances(employee_id).await?;
        let year = self.today().year();

        let mut lines = Vec::with_capacity(types.len());
        for lt in types {
            let total = balances.get(lt.id);
            let used = self
                .stores
                .requests
                .total_days(employee_id, lt.id, LeaveStatus::Approved, Some(year))
                .await?;
            let pending = self
                .stores
                .requests
                .total_days(employee_id, lt.id, LeaveStatus::Pending, None)
                .await?;
            lines.push(BalanceLine {
                leave_type_id: lt.id,
                code: lt.code,
                name: lt.name,
                total,
                used,
                pending,
                available: total - pending,
            });
        }
        Ok(lines)
    }
}

/// Opening balance for a non-accrual type. Someone joining this year gets
/// `floor(quota / 12 * months_remaining)` whole days, counting the joining
/// month. Anyone else, including hires dated into a later year, gets the full
/// quota.
pub fn pro_rate(yearly_quota: Days, date_of_joining: Date, today: Date) -> Days {
    if date_of_joining.year() != today.year() {
        return yearly_quota;
    }
    let months_remaining = 13 - i64::from(u8::from(date_of_joining.month()));
    // quota is in halves, so quota/12 days * months == halves * months / 24 days
    Days::whole(yearly_quota.halves() * months_remaining / 24)
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;
    use crate::services::fixtures::Fixture;

    #[test]
    fn pro_rate_counts_joining_month() {
        let today = date!(2026-03-02);
        assert_eq!(pro_rate(Days::whole(12), date!(2025-07-01), today), Days::whole(12));
        assert_eq!(pro_rate(Days::whole(12), date!(2026-01-15), today), Days::whole(12));
        assert_eq!(pro_rate(Days::whole(12), date!(2026-07-01), today), Days::whole(6));
        assert_eq!(pro_rate(Days::whole(12), date!(2026-12-31), today), Days::whole(1));
        // 15/12 * 10 = 12.5 -> 12
        assert_eq!(pro_rate(Days::whole(15), date!(2026-03-10), today), Days::whole(12));
    }

    #[test]
    fn pro_rate_gives_next_year_hires_the_full_quota() {
        let today = date!(2026-03-02);
        assert_eq!(pro_rate(Days::whole(12), date!(2027-07-01), today), Days::whole(12));
        assert_eq!(pro_rate(Days::whole(18), date!(2027-01-01), today), Days::whole(18));
    }

    #[tokio::test]
    async fn available_holds_back_pending() {
        let fx = Fixture::new().await;
        let ledger = fx.ledger();
        fx.set_balance(fx.employee.id, fx.casual.id, Days::whole(12)).await;
        fx.insert_pending(fx.employee.id, &fx.casual, Days::whole(3)).await;

        assert_eq!(ledger.available_balance(fx.employee.id, fx.casual.id).await.unwrap(), Days::whole(9));
        assert!(ledger.has_sufficient_balance(fx.employee.id, fx.casual.id, Days::whole(9)).await.unwrap());
        assert!(!ledger.has_sufficient_balance(fx.employee.id, fx.casual.id, Days::from_halves(19)).await.unwrap());
    }

    #[tokio::test]
    async fn deduct_refuses_overdraft() {
        let fx = Fixture::new().await;
        let ledger = fx.ledger();
        fx.set_balance(fx.employee.id, fx.casual.id, Days::whole(2)).await;

        let err = ledger.deduct(fx.employee.id, fx.casual.id, Days::whole(3)).await.unwrap_err();
        assert!(matches!(err, DomainError::InsufficientBalance { .. }));
        assert_eq!(ledger.deduct(fx.employee.id, fx.casual.id, Days::HALF).await.unwrap(), Days::from_halves(3));
        assert_eq!(ledger.restore(fx.employee.id, fx.casual.id, Days::HALF).await.unwrap(), Days::whole(2));
    }

    #[tokio::test]
    async fn concurrent_deductions_never_go_negative() {
        let fx = Fixture::new().await;
        let ledger = fx.ledger();
        fx.set_balance(fx.employee.id, fx.casual.id, Days::whole(5)).await;

        let attempts = (0..4).map(|_| ledger.deduct(fx.employee.id, fx.casual.id, Days::whole(2)));
        let results = futures::future::join_all(attempts).await;
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);

        let left = fx.store_balance(fx.employee.id, fx.casual.id).await;
        assert_eq!(left, Days::whole(1));
    }

    #[tokio::test]
    async fn accrual_caps_at_quota() {
        let fx = Fixture::new().await;
        let ledger = fx.ledger();
        // earned: 1.5/month, quota 18
        fx.set_balance(fx.employee.id, fx.earned.id, Days::whole(17)).await;

        let outcome = ledger.accrue_monthly(fx.hr.id, fx.company).await.unwrap();
        assert_eq!(outcome.leave_types, 1);
        assert_eq!(fx.store_balance(fx.employee.id, fx.earned.id).await, Days::whole(18));
        // Non-accrual types are untouched.
        assert_eq!(fx.store_balance(fx.employee.id, fx.casual.id).await, Days::ZERO);
        // Manager had nothing and gets one month's rate.
        assert_eq!(fx.store_balance(fx.manager.id, fx.earned.id).await, Days::from_halves(3));
    }

    #[tokio::test]
    async fn yearly_reset_applies_carry_forward_cap() {
        let fx = Fixture::new().await;
        let ledger = fx.ledger();
        // earned carries forward up to 5 days, casual does not carry.
        fx.set_balance(fx.employee.id, fx.earned.id, Days::whole(8)).await;
        fx.set_balance(fx.employee.id, fx.casual.id, Days::whole(4)).await;
        fx.set_balance(fx.manager.id, fx.earned.id, Days::whole(2)).await;

        ledger.reset_yearly(fx.hr.id, fx.company).await.unwrap();

        assert_eq!(fx.store_balance(fx.employee.id, fx.earned.id).await, Days::whole(23));
        assert_eq!(fx.store_balance(fx.employee.id, fx.casual.id).await, Days::whole(12));
        assert_eq!(fx.store_balance(fx.manager.id, fx.earned.id).await, Days::whole(20));
    }

    #[tokio::test]
    async fn initialize_pro_rates_new_hires() {
        let fx = Fixture::new().await;
        let ledger = fx.ledger();
        let hire = fx.hire(date!(2026-07-01), Some(fx.manager.id)).await;

        let balance = ledger.initialize_balance(&fx.actor(&fx.hr), hire.id).await.unwrap();
        assert_eq!(balance.get(fx.casual.id), Days::whole(6));
        assert_eq!(balance.get(fx.earned.id), Days::ZERO);

        let summary = ledger.balance_summary(hire.id).await.unwrap();
        let casual = summary.iter().find(|l| l.leave_type_id == fx.casual.id).unwrap();
        assert_eq!(casual.available, Days::whole(6));
        assert_eq!(fx.audit.events().await.last().unwrap().action, "INITIALIZE_BALANCE");
    }
}
