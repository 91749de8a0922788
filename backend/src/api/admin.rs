//! Balance batches. Admin-only, meant to be driven by an external scheduler.

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::Result,
    models::leave::LeaveBalance,
    services::{ledger::BatchOutcome, LeaveLedger},
};

pub async fn accrue_monthly(
    State(ledger): State<LeaveLedger>,
    auth: AuthUser,
) -> Result<Json<BatchOutcome>> {
    auth.require_admin()?;
    Ok(Json(ledger.accrue_monthly(auth.id, auth.company_id).await?))
}

pub async fn reset_yearly(
    State(ledger): State<LeaveLedger>,
    auth: AuthUser,
) -> Result<Json<BatchOutcome>> {
    auth.require_admin()?;
    Ok(Json(ledger.reset_yearly(auth.id, auth.company_id).await?))
}

/// Opening balances for an employee, pro-rated by joining date.
pub async fn initialize_balance(
    State(ledger): State<LeaveLedger>,
    auth: AuthUser,
    Path(employee_id): Path<Uuid>,
) -> Result<Json<LeaveBalance>> {
    auth.require_hr()?;
    Ok(Json(ledger.initialize_balance(&auth.actor(), employee_id).await?))
}
