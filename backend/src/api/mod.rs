pub mod admin;
pub mod attendance;
pub mod leave;

use axum::{Router, routing::{get, post, put}};
use crate::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        // Attendance
        .route("/api/attendance", get(attendance::history))
        .route("/api/attendance/punch-in", post(attendance::punch_in))
        .route("/api/attendance/punch-out", post(attendance::punch_out))
        .route("/api/attendance/today", get(attendance::today))
        .route("/api/attendance/summary", get(attendance::summary))
        .route("/api/attendance/team", get(attendance::team))
        .route("/api/attendance/manual", post(attendance::manual_entry))
        .route("/api/attendance/face", post(attendance::register_face).delete(attendance::delete_face))
        .route("/api/attendance/:id", put(attendance::correct).delete(attendance::delete))
        // Leave types and balances
        .route("/api/leave/types", get(leave::list_types))
        .route("/api/leave/balance", get(leave::balance))
        // Leave requests
        .route("/api/leave", get(leave::list).post(leave::apply))
        .route("/api/leave/pending-approvals", get(leave::pending_approvals))
        .route("/api/leave/team-calendar", get(leave::team_calendar))
        .route("/api/leave/:id", get(leave::get_one))
        .route("/api/leave/:id/approve", post(leave::approve))
        .route("/api/leave/:id/reject", post(leave::reject))
        .route("/api/leave/:id/cancel", post(leave::cancel))
        .route("/api/leave/:id/materialize", post(leave::materialize))
        // Balance batches
        .route("/api/admin/leave/accrue", post(admin::accrue_monthly))
        .route("/api/admin/leave/reset-yearly", post(admin::reset_yearly))
        .route("/api/admin/employees/:id/leave-balance", post(admin::initialize_balance))
        .with_state(state)
}
