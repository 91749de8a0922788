use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthUser,
    error::{AppError, Result},
    models::{
        common::{end_of_month, DateRangeParams, PaginationParams},
        leave::{
            ApplyLeaveRequest, BalanceLine, CancelLeaveRequest, LeaveListParams, LeaveRequest,
            LeaveType, ReviewLeaveRequest,
        },
    },
    services::{LeaveLedger, LeaveWorkflow},
    store::LeaveQuery,
};

pub async fn list_types(
    State(workflow): State<LeaveWorkflow>,
    auth: AuthUser,
) -> Result<Json<Vec<LeaveType>>> {
    Ok(Json(workflow.leave_types(auth.company_id).await?))
}

pub async fn balance(
    State(ledger): State<LeaveLedger>,
    auth: AuthUser,
) -> Result<Json<Vec<BalanceLine>>> {
    Ok(Json(ledger.balance_summary(auth.id).await?))
}

pub async fn apply(
    State(workflow): State<LeaveWorkflow>,
    auth: AuthUser,
    Json(body): Json<ApplyLeaveRequest>,
) -> Result<Json<LeaveRequest>> {
    body.validate()?;
    Ok(Json(workflow.apply(auth.id, body).await?))
}

pub async fn list(
    State(workflow): State<LeaveWorkflow>,
    auth: AuthUser,
    Query(params): Query<LeaveListParams>,
) -> Result<Json<Vec<LeaveRequest>>> {
    if let (Some(from), Some(to)) = (params.start_date, params.end_date) {
        if to < from {
            return Err(AppError::BadRequest("end_date must be >= start_date".into()));
        }
    }
    let query = LeaveQuery {
        status: params.status,
        from: params.start_date,
        to: params.end_date,
        limit: params.limit(),
        offset: params.offset(),
    };
    Ok(Json(workflow.list_mine(auth.id, &query).await?))
}

pub async fn get_one(
    State(workflow): State<LeaveWorkflow>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<LeaveRequest>> {
    Ok(Json(workflow.get(&auth.actor(), id).await?))
}

pub async fn pending_approvals(
    State(workflow): State<LeaveWorkflow>,
    auth: AuthUser,
    Query(page): Query<PaginationParams>,
) -> Result<Json<Vec<LeaveRequest>>> {
    Ok(Json(
        workflow
            .pending_approvals(auth.id, page.limit(), page.offset())
            .await?,
    ))
}

/// Approved leave of the caller's direct reports. Defaults to the current
/// month when no range is given.
pub async fn team_calendar(
    State(workflow): State<LeaveWorkflow>,
    auth: AuthUser,
    Query(range): Query<DateRangeParams>,
) -> Result<Json<Vec<LeaveRequest>>> {
    let (from, to) = range
        .resolve(workflow.current_date(), end_of_month)
        .ok_or_else(|| AppError::BadRequest("end_date must be >= start_date".into()))?;
    Ok(Json(workflow.team_calendar(auth.id, from, to).await?))
}

pub async fn approve(
    State(workflow): State<LeaveWorkflow>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    body: Option<Json<ReviewLeaveRequest>>,
) -> Result<Json<LeaveRequest>> {
    let Json(body) = body.unwrap_or_default();
    body.validate()?;
    Ok(Json(workflow.approve(auth.id, id, body.comments).await?))
}

pub async fn reject(
    State(workflow): State<LeaveWorkflow>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    body: Option<Json<ReviewLeaveRequest>>,
) -> Result<Json<LeaveRequest>> {
    let Json(body) = body.unwrap_or_default();
    body.validate()?;
    Ok(Json(workflow.reject(auth.id, id, body.comments).await?))
}

pub async fn cancel(
    State(workflow): State<LeaveWorkflow>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    body: Option<Json<CancelLeaveRequest>>,
) -> Result<Json<LeaveRequest>> {
    let Json(body) = body.unwrap_or_default();
    body.validate()?;
    Ok(Json(workflow.cancel(auth.id, id, body.reason).await?))
}

#[derive(Debug, Serialize)]
pub struct MaterializeResponse {
    pub created: usize,
}

/// Re-runs attendance materialization for an approved request.
pub async fn materialize(
    State(workflow): State<LeaveWorkflow>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MaterializeResponse>> {
    auth.require_hr()?;
    // Scope check: the request must belong to the caller's company.
    workflow.get(&auth.actor(), id).await?;
    let created = workflow.retry_materialization(auth.id, id).await?;
    Ok(Json(MaterializeResponse { created }))
}
