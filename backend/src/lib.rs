pub mod api;
pub mod auth;
pub mod calendar;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod store;

use std::sync::Arc;

use calendar::{Calendar, Clock, WeeklyOffs};
use services::{face::FaceCapability, sinks::Sinks, AttendanceService, LeaveLedger, LeaveWorkflow};
use store::Stores;

/// Shared application state available to all handlers via axum's State extractor.
#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub attendance: AttendanceService,
    pub ledger: LeaveLedger,
    pub workflow: LeaveWorkflow,
    pub jwt_secret: String,
}

/// Everything the engines are wired from.
pub struct Wiring {
    pub stores: Stores,
    pub face: Arc<dyn FaceCapability>,
    pub clock: Arc<dyn Clock>,
    pub calendar: Calendar,
    pub default_weekly_offs: WeeklyOffs,
    pub sinks: Sinks,
    pub jwt_secret: String,
}

impl AppState {
    pub fn new(w: Wiring) -> Self {
        let ledger = LeaveLedger::new(w.stores.clone(), w.clock.clone(), w.calendar, w.sinks.clone());
        let workflow = LeaveWorkflow::new(
            w.stores.clone(),
            ledger.clone(),
            w.clock.clone(),
            w.calendar,
            w.default_weekly_offs,
            w.sinks.clone(),
        );
        let attendance = AttendanceService::new(w.stores.clone(), w.face, w.clock, w.calendar, w.sinks);
        Self {
            stores: w.stores,
            attendance,
            ledger,
            workflow,
            jwt_secret: w.jwt_secret,
        }
    }
}

impl axum::extract::FromRef<AppState> for AttendanceService {
    fn from_ref(state: &AppState) -> Self {
        state.attendance.clone()
    }
}

impl axum::extract::FromRef<AppState> for LeaveLedger {
    fn from_ref(state: &AppState) -> Self {
        state.ledger.clone()
    }
}

impl axum::extract::FromRef<AppState> for LeaveWorkflow {
    fn from_ref(state: &AppState) -> Self {
        state.workflow.clone()
    }
}
