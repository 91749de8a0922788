use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthUser,
    error::{AppError, Result},
    models::{
        attendance::{
            AttendanceRecord, AttendanceSummary, CorrectAttendanceRequest, ManualEntryRequest,
            PunchRequest, RegisterFaceRequest, SummaryParams, TeamAttendance, TeamAttendanceParams,
            TodayAttendance,
        },
        common::{first_of_month, DateRangeParams},
    },
    services::{face::FaceEnrollment, AttendanceService},
};

pub async fn punch_in(
    State(svc): State<AttendanceService>,
    auth: AuthUser,
    Json(body): Json<PunchRequest>,
) -> Result<Json<AttendanceRecord>> {
    body.validate()?;
    Ok(Json(svc.punch_in(auth.id, body).await?))
}

pub async fn punch_out(
    State(svc): State<AttendanceService>,
    auth: AuthUser,
    Json(body): Json<PunchRequest>,
) -> Result<Json<AttendanceRecord>> {
    body.validate()?;
    Ok(Json(svc.punch_out(auth.id, body).await?))
}

pub async fn today(
    State(svc): State<AttendanceService>,
    auth: AuthUser,
) -> Result<Json<TodayAttendance>> {
    Ok(Json(svc.today_for(auth.id).await?))
}

/// The caller's own records, from the first of the month to today unless a
/// range is given.
pub async fn history(
    State(svc): State<AttendanceService>,
    auth: AuthUser,
    Query(range): Query<DateRangeParams>,
) -> Result<Json<Vec<AttendanceRecord>>> {
    let today = svc.today();
    let (from, to) = range
        .resolve(today, |_| today)
        .ok_or_else(|| AppError::BadRequest("end_date must be >= start_date".into()))?;
    Ok(Json(
        svc.history(auth.id, from, to, range.limit(), range.offset())
            .await?,
    ))
}

pub async fn summary(
    State(svc): State<AttendanceService>,
    auth: AuthUser,
    Query(params): Query<SummaryParams>,
) -> Result<Json<AttendanceSummary>> {
    let today = svc.today();
    let from = params.start_date.unwrap_or_else(|| first_of_month(today));
    let to = params.end_date.unwrap_or(today);
    let employee_id = params.employee_id.unwrap_or(auth.id);
    Ok(Json(svc.summary(&auth.actor(), employee_id, from, to).await?))
}

pub async fn team(
    State(svc): State<AttendanceService>,
    auth: AuthUser,
    Query(params): Query<TeamAttendanceParams>,
) -> Result<Json<TeamAttendance>> {
    if !auth.role.can_approve_leave() {
        return Err(AppError::Forbidden);
    }
    let date = params.date.unwrap_or_else(|| svc.today());
    Ok(Json(svc.team_day(auth.id, date, params.status).await?))
}

pub async fn manual_entry(
    State(svc): State<AttendanceService>,
    auth: AuthUser,
    Json(body): Json<ManualEntryRequest>,
) -> Result<(StatusCode, Json<AttendanceRecord>)> {
    auth.require_hr()?;
    body.validate()?;
    let record = svc.manual_entry(&auth.actor(), body).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn correct(
    State(svc): State<AttendanceService>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<CorrectAttendanceRequest>,
) -> Result<Json<AttendanceRecord>> {
    auth.require_hr()?;
    body.validate()?;
    Ok(Json(svc.correct(&auth.actor(), id, body).await?))
}

pub async fn delete(
    State(svc): State<AttendanceService>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    auth.require_admin()?;
    svc.delete(&auth.actor(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn register_face(
    State(svc): State<AttendanceService>,
    auth: AuthUser,
    Json(body): Json<RegisterFaceRequest>,
) -> Result<Json<FaceEnrollment>> {
    body.validate()?;
    Ok(Json(svc.register_face(auth.id, &body.face_image).await?))
}

pub async fn delete_face(
    State(svc): State<AttendanceService>,
    auth: AuthUser,
) -> Result<StatusCode> {
    svc.delete_face(auth.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
