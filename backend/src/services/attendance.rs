//! Daily punch lifecycle and attendance derivations.

use std::sync::Arc;

use time::{Date, Duration, OffsetDateTime, Time};
use uuid::Uuid;
use validator::Validate;

use crate::calendar::{Calendar, Clock};
use crate::models::{
    attendance::{
        AttendanceRecord, AttendanceStatus, AttendanceSummary, CorrectAttendanceRequest,
        ManualEntryRequest, PunchEvent, PunchPhase, PunchRequest, PunchSource, PunchType,
        TeamAttendance, TodayAttendance,
    },
    employee::{Employee, EmployeeSummary},
    shift::ShiftPolicy,
};
use crate::services::face::{FaceCapability, FaceEnrollment, FaceError};
use crate::services::sinks::{AuditEvent, Notification, NotificationEvent, Sinks, MODULE_ATTENDANCE};
use crate::services::{Actor, DomainError, DomainResult};
use crate::store::{StoreError, Stores};

#[derive(Clone)]
pub struct AttendanceService {
    stores: Stores,
    face: Arc<dyn FaceCapability>,
    clock: Arc<dyn Clock>,
    calendar: Calendar,
    sinks: Sinks,
}

impl AttendanceService {
    pub fn new(
        stores: Stores,
        face: Arc<dyn FaceCapability>,
        clock: Arc<dyn Clock>,
        calendar: Calendar,
        sinks: Sinks,
    ) -> Self {
        Self { stores, face, clock, calendar, sinks }
    }

    pub fn today(&self) -> Date {
        self.calendar.local_date(self.clock.now())
    }

    async fn employee(&self, id: Uuid) -> DomainResult<Employee> {
        self.stores
            .directory
            .employee(id)
            .await?
            .filter(|e| e.is_active)
            .ok_or_else(|| DomainError::NotFound("Employee".into()))
    }

    async fn record_in_company(&self, id: Uuid, company_id: Uuid) -> DomainResult<AttendanceRecord> {
        self.stores
            .attendance
            .get(id)
            .await?
            .filter(|r| r.company_id == company_id)
            .ok_or_else(|| DomainError::NotFound("Attendance record".into()))
    }

    /// Face punches need a registered face and a matching image. Other
    /// sources carry no confidence.
    async fn verify_face(&self, employee: &Employee, source: PunchSource, image: Option<&str>) -> DomainResult<Option<u8>> {
        if source != PunchSource::Face {
            return Ok(None);
        }
        if !employee.face_registered() {
            return Err(DomainError::FaceNotRegistered);
        }
        let image = image
            .filter(|i| !i.trim().is_empty())
            .ok_or_else(|| DomainError::Validation("face_image is required for face punches".into()))?;
        let result = self
            .face
            .verify(employee.id, image)
            .await
            .map_err(face_error)?;
        if !result.matched {
            tracing::warn!(employee_id = %employee.id, confidence = result.confidence, "face verification failed");
            return Err(DomainError::FaceMismatch { confidence: result.confidence });
        }
        Ok(Some(result.confidence))
    }

    fn punch_event(kind: PunchType, at: OffsetDateTime, source: PunchSource, confidence: Option<u8>, req: &PunchRequest) -> PunchEvent {
        PunchEvent {
            kind,
            time: at,
            source,
            location: req.location,
            face_confidence: confidence,
            device_info: req.device_info.clone(),
        }
    }

    fn source_of(req: &PunchRequest) -> PunchSource {
        req.source.unwrap_or(if req.face_image.is_some() {
            PunchSource::Face
        } else {
            PunchSource::Web
        })
    }

    // -- Punches --

    pub async fn punch_in(&self, employee_id: Uuid, req: PunchRequest) -> DomainResult<AttendanceRecord> {
        req.validate()
            .map_err(|e| DomainError::Validation(e.to_string()))?;
        let employee = self.employee(employee_id).await?;
        let now = self.clock.now();
        let date = self.calendar.local_date(now);

        let existing = self.stores.attendance.find_by_day(employee_id, date).await?;
        if existing.as_ref().is_some_and(|r| r.punch_in.is_some()) {
            return Err(DomainError::AlreadyPunchedIn);
        }

        let source = Self::source_of(&req);
        let confidence = self.verify_face(&employee, source, req.face_image.as_deref()).await?;
        let policy = self.stores.shifts.shift_policy(employee_id).await?;
        let event = Self::punch_event(PunchType::In, now, source, confidence, &req);

        let apply = |rec: &mut AttendanceRecord| {
            rec.punches.push(event.clone());
            rec.punch_in = Some(now);
            rec.is_wfh = req.is_wfh;
            rec.status = if req.is_wfh { AttendanceStatus::Wfh } else { AttendanceStatus::Present };
            rec.updated_at = now;
            rec.recompute(policy.as_ref(), &self.calendar);
        };

        let record = match existing {
            // A record can exist without a punch, e.g. one materialized for leave.
            Some(mut rec) => {
                apply(&mut rec);
                match self.stores.attendance.update(&rec).await {
                    Ok(saved) => saved,
                    Err(StoreError::VersionConflict) => return Err(DomainError::AlreadyPunchedIn),
                    Err(e) => return Err(e.into()),
                }
            }
            None => {
                let mut rec = AttendanceRecord::new(
                    employee_id,
                    employee.company_id,
                    date,
                    policy.as_ref().map(|p| p.shift_id),
                    now,
                );
                apply(&mut rec);
                if !self.stores.attendance.insert_if_absent(&rec).await? {
                    return Err(DomainError::AlreadyPunchedIn);
                }
                rec
            }
        };

        tracing::info!(
            %employee_id,
            %date,
            late = record.is_late,
            late_by = record.late_by_minutes,
            "punched in"
        );

        if record.is_late {
            if let Some(manager_id) = employee.manager_id {
                let local = now.to_offset(self.calendar.offset());
                self.sinks
                    .notify(Notification {
                        recipient_id: manager_id,
                        company_id: employee.company_id,
                        event: NotificationEvent::LateArrival,
                        title: "Late Arrival Alert".into(),
                        message: format!(
                            "{} arrived late today at {:02}:{:02}. Late by {} minutes.",
                            employee.full_name(),
                            local.hour(),
                            local.minute(),
                            record.late_by_minutes
                        ),
                        related_id: Some(record.id),
                    })
                    .await;
            }
        }

        self.sinks
            .audit(
                AuditEvent::new(MODULE_ATTENDANCE, "PUNCH_IN", employee_id, employee.company_id, now)
                    .target(record.id)
                    .metadata(serde_json::json!({
                        "is_late": record.is_late,
                        "late_by_minutes": record.late_by_minutes,
                        "face_confidence": confidence,
                    })),
            )
            .await;
        Ok(record)
    }

    /// The record a punch-out closes: today's, or yesterday's when a night
    /// shift is still open past midnight.
    async fn open_record(&self, employee_id: Uuid, date: Date, policy: Option<&ShiftPolicy>) -> DomainResult<AttendanceRecord> {
        let today = self.stores.attendance.find_by_day(employee_id, date).await?;
        if let Some(rec) = today.filter(|r| r.punch_in.is_some()) {
            return Ok(rec);
        }
        if policy.is_some_and(ShiftPolicy::crosses_midnight) {
            if let Some(prev) = date.previous_day() {
                let yesterday = self.stores.attendance.find_by_day(employee_id, prev).await?;
                if let Some(rec) = yesterday.filter(|r| r.phase() == PunchPhase::PunchedIn) {
                    return Ok(rec);
                }
            }
        }
        Err(DomainError::NotPunchedIn)
    }

    pub async fn punch_out(&self, employee_id: Uuid, req: PunchRequest) -> DomainResult<AttendanceRecord> {
        req.validate()
            .map_err(|e| DomainError::Validation(e.to_string()))?;
        let employee = self.employee(employee_id).await?;
        let now = self.clock.now();
        let date = self.calendar.local_date(now);
        let policy = self.stores.shifts.shift_policy(employee_id).await?;

        let mut record = self.open_record(employee_id, date, policy.as_ref()).await?;
        if record.punch_out.is_some() {
            return Err(DomainError::AlreadyPunchedOut);
        }

        let source = Self::source_of(&req);
        let confidence = self.verify_face(&employee, source, req.face_image.as_deref()).await?;
        record.punches.push(Self::punch_event(PunchType::Out, now, source, confidence, &req));
        record.punch_out = Some(now);
        record.updated_at = now;
        record.recompute(policy.as_ref(), &self.calendar);

        let saved = match self.stores.attendance.update(&record).await {
            Ok(saved) => saved,
            Err(StoreError::VersionConflict) => return Err(DomainError::AlreadyPunchedOut),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            %employee_id,
            date = %saved.date,
            hours = %saved.total_hours,
            early_exit = saved.is_early_exit,
            half_day = saved.is_half_day,
            "punched out"
        );
        self.sinks
            .audit(
                AuditEvent::new(MODULE_ATTENDANCE, "PUNCH_OUT", employee_id, employee.company_id, now)
                    .target(saved.id)
                    .metadata(serde_json::json!({
                        "total_hours": saved.total_hours,
                        "is_early_exit": saved.is_early_exit,
                        "face_confidence": confidence,
                    })),
            )
            .await;
        Ok(saved)
    }

    // -- HR actions --

    /// Resolves wall-clock punch times on `date`. A punch-out at or before the
    /// punch-in is only accepted for night shifts, where it lands next day.
    fn resolve_times(
        &self,
        date: Date,
        punch_in: Option<Time>,
        punch_out: Option<Time>,
        policy: Option<&ShiftPolicy>,
    ) -> DomainResult<(Option<OffsetDateTime>, Option<OffsetDateTime>)> {
        let pin = punch_in.map(|t| self.calendar.at(date, t));
        let mut pout = punch_out.map(|t| self.calendar.at(date, t));
        if let (Some(i), Some(o)) = (pin, pout) {
            if o <= i {
                if policy.is_some_and(ShiftPolicy::crosses_midnight) {
                    pout = Some(o + Duration::DAY);
                } else {
                    return Err(DomainError::Validation("punch_out_time must be after punch_in_time".into()));
                }
            }
        }
        Ok((pin, pout))
    }

    pub async fn manual_entry(&self, actor: &Actor, req: ManualEntryRequest) -> DomainResult<AttendanceRecord> {
        req.validate()
            .map_err(|e| DomainError::Validation(e.to_string()))?;
        let employee = self
            .employee(req.employee_id)
            .await?;
        if employee.company_id != actor.company_id {
            return Err(DomainError::NotFound("Employee".into()));
        }
        if req.date > self.today() {
            return Err(DomainError::Validation("cannot record attendance for a future date".into()));
        }
        if self
            .stores
            .attendance
            .find_by_day(employee.id, req.date)
            .await?
            .is_some()
        {
            return Err(DomainError::DuplicateRecord);
        }

        let policy = self.stores.shifts.shift_policy(employee.id).await?;
        let (pin, pout) = self.resolve_times(req.date, Some(req.punch_in_time), req.punch_out_time, policy.as_ref())?;
        let now = self.clock.now();

        let mut record = AttendanceRecord::new(
            employee.id,
            employee.company_id,
            req.date,
            policy.as_ref().map(|p| p.shift_id),
            now,
        );
        if let Some(t) = pin {
            record.punches.push(Self::manual_punch(PunchType::In, t));
        }
        if let Some(t) = pout {
            record.punches.push(Self::manual_punch(PunchType::Out, t));
        }
        record.punch_in = pin;
        record.punch_out = pout;
        record.is_wfh = req.is_wfh;
        record.status = if req.is_wfh { AttendanceStatus::Wfh } else { AttendanceStatus::Present };
        record.is_manual_entry = true;
        record.manual_entry_by = Some(actor.id);
        record.manual_entry_reason = Some(req.reason.trim().to_string());
        record.recompute(policy.as_ref(), &self.calendar);

        if !self.stores.attendance.insert_if_absent(&record).await? {
            return Err(DomainError::DuplicateRecord);
        }
        tracing::info!(employee_id = %employee.id, date = %record.date, by = %actor.id, "manual attendance entry");
        self.sinks
            .audit(
                AuditEvent::new(MODULE_ATTENDANCE, "MANUAL_ENTRY", actor.id, actor.company_id, now)
                    .target(record.id)
                    .after(&record),
            )
            .await;
        Ok(record)
    }

    fn manual_punch(kind: PunchType, time: OffsetDateTime) -> PunchEvent {
        PunchEvent {
            kind,
            time,
            source: PunchSource::Manual,
            location: None,
            face_confidence: None,
            device_info: None,
        }
    }

    /// HR correction of an existing day. Derived fields are recomputed from
    /// the corrected punches; an explicit status wins over the derived one.
    pub async fn correct(&self, actor: &Actor, record_id: Uuid, req: CorrectAttendanceRequest) -> DomainResult<AttendanceRecord> {
        req.validate()
            .map_err(|e| DomainError::Validation(e.to_string()))?;
        let mut record = self.record_in_company(record_id, actor.company_id).await?;
        let before = record.clone();
        let policy = self.stores.shifts.shift_policy(record.employee_id).await?;

        if let Some(remarks) = req.remarks {
            record.remarks = Some(remarks);
        }
        if req.punch_in_time.is_some() || req.punch_out_time.is_some() {
            let local = |t: OffsetDateTime| t.to_offset(self.calendar.offset()).time();
            let (pin, pout) = self.resolve_times(
                record.date,
                req.punch_in_time.or_else(|| record.punch_in.map(local)),
                req.punch_out_time.or_else(|| record.punch_out.map(local)),
                policy.as_ref(),
            )?;
            if pout.is_some() && pin.is_none() {
                return Err(DomainError::Validation("cannot set a punch-out without a punch-in".into()));
            }
            // Corrections are appended so the last event of each kind matches
            // the convenience fields.
            if let Some(t) = pin.filter(|t| record.punch_in != Some(*t)) {
                record.punches.push(Self::manual_punch(PunchType::In, t));
            }
            if let Some(t) = pout.filter(|t| record.punch_out != Some(*t)) {
                record.punches.push(Self::manual_punch(PunchType::Out, t));
            }
            record.punch_in = pin;
            record.punch_out = pout;
        }
        if let Some(AttendanceStatus::Wfh) = req.status {
            record.is_wfh = true;
        }
        record.recompute(policy.as_ref(), &self.calendar);
        if let Some(status) = req.status {
            record.status = status;
        }
        record.updated_at = self.clock.now();

        let saved = self.stores.attendance.update(&record).await?;
        tracing::info!(record_id = %saved.id, by = %actor.id, "attendance corrected");
        self.sinks
            .audit(
                AuditEvent::new(MODULE_ATTENDANCE, "CORRECT", actor.id, actor.company_id, saved.updated_at)
                    .target(saved.id)
                    .before(&before)
                    .after(&saved),
            )
            .await;
        Ok(saved)
    }

    pub async fn delete(&self, actor: &Actor, record_id: Uuid) -> DomainResult<()> {
        let record = self.record_in_company(record_id, actor.company_id).await?;
        if !self.stores.attendance.delete(record.id).await? {
            return Err(DomainError::NotFound("Attendance record".into()));
        }
        tracing::info!(record_id = %record.id, by = %actor.id, "attendance record deleted");
        self.sinks
            .audit(
                AuditEvent::new(MODULE_ATTENDANCE, "DELETE", actor.id, actor.company_id, self.clock.now())
                    .target(record.id)
                    .before(&record),
            )
            .await;
        Ok(())
    }

    // -- Face enrollment --

    pub async fn register_face(&self, employee_id: Uuid, image: &str) -> DomainResult<FaceEnrollment> {
        let employee = self.employee(employee_id).await?;
        let enrollment = self
            .face
            .register(employee_id, image)
            .await
            .map_err(face_error)?;

        if let Some(old) = employee.face_id.as_deref().filter(|old| *old != enrollment.face_id) {
            if let Err(e) = self.face.delete(old).await {
                tracing::warn!(%employee_id, "failed to remove previous face enrollment: {e}");
            }
        }
        self.stores
            .directory
            .set_face_id(employee_id, Some(enrollment.face_id.clone()))
            .await?;

        tracing::info!(%employee_id, "face registered");
        self.sinks
            .audit(
                AuditEvent::new(MODULE_ATTENDANCE, "FACE_REGISTER", employee_id, employee.company_id, self.clock.now())
                    .target(employee_id)
                    .metadata(serde_json::json!({ "confidence": enrollment.confidence })),
            )
            .await;
        Ok(enrollment)
    }

    pub async fn delete_face(&self, employee_id: Uuid) -> DomainResult<()> {
        let employee = self.employee(employee_id).await?;
        let face_id = employee.face_id.as_deref().ok_or(DomainError::FaceNotRegistered)?;
        self.face.delete(face_id).await.map_err(face_error)?;
        self.stores.directory.set_face_id(employee_id, None).await?;

        tracing::info!(%employee_id, "face enrollment removed");
        self.sinks
            .audit(
                AuditEvent::new(MODULE_ATTENDANCE, "FACE_DELETE", employee_id, employee.company_id, self.clock.now())
                    .target(employee_id),
            )
            .await;
        Ok(())
    }

    // -- Queries --

    pub async fn today_for(&self, employee_id: Uuid) -> DomainResult<TodayAttendance> {
        let record = self
            .stores
            .attendance
            .find_by_day(employee_id, self.today())
            .await?;
        Ok(TodayAttendance {
            has_punched_in: record.as_ref().is_some_and(|r| r.punch_in.is_some()),
            has_punched_out: record.as_ref().is_some_and(|r| r.punch_out.is_some()),
            record,
        })
    }

    pub async fn history(&self, employee_id: Uuid, from: Date, to: Date, limit: i64, offset: i64) -> DomainResult<Vec<AttendanceRecord>> {
        if to < from {
            return Err(DomainError::Validation("end_date must not be before start_date".into()));
        }
        Ok(self
            .stores
            .attendance
            .list_for_employee(employee_id, from, to, limit, offset)
            .await?)
    }

    /// Own summary, a direct report's, or anyone's in the company for HR/admin.
    pub async fn summary(&self, viewer: &Actor, employee_id: Uuid, from: Date, to: Date) -> DomainResult<AttendanceSummary> {
        if to < from {
            return Err(DomainError::Validation("end_date must not be before start_date".into()));
        }
        if employee_id != viewer.id {
            let target = self.employee(employee_id).await?;
            if target.company_id != viewer.company_id {
                return Err(DomainError::NotFound("Employee".into()));
            }
            if !viewer.role.is_hr_or_admin() && target.manager_id != Some(viewer.id) {
                return Err(DomainError::Forbidden);
            }
        }
        let span = (to - from).whole_days() + 1;
        let records = self
            .stores
            .attendance
            .list_for_employee(employee_id, from, to, span, 0)
            .await?;
        Ok(AttendanceSummary::from_records(from, to, &records))
    }

    /// A manager's direct reports on one day, with the ones who have no
    /// record listed as absent.
    pub async fn team_day(&self, manager_id: Uuid, date: Date, status: Option<AttendanceStatus>) -> DomainResult<TeamAttendance> {
        let team = self.stores.directory.direct_reports(manager_id).await?;
        let ids: Vec<Uuid> = team.iter().map(|e| e.id).collect();
        let mut records = if ids.is_empty() {
            Vec::new()
        } else {
            self.stores.attendance.list_for_day(&ids, date).await?
        };

        let absent: Vec<EmployeeSummary> = team
            .iter()
            .filter(|e| !records.iter().any(|r| r.employee_id == e.id))
            .map(EmployeeSummary::from)
            .collect();
        let present = records
            .iter()
            .filter(|r| matches!(r.status, AttendanceStatus::Present | AttendanceStatus::Wfh))
            .count();
        let on_leave = records.iter().filter(|r| r.status == AttendanceStatus::OnLeave).count();
        let late = records.iter().filter(|r| r.is_late).count();

        if let Some(status) = status {
            records.retain(|r| r.status == status);
        }
        // Same order as the team listing.
        records.sort_by_key(|r| ids.iter().position(|id| *id == r.employee_id));

        Ok(TeamAttendance {
            date,
            records,
            absent,
            total: team.len(),
            present,
            on_leave,
            late,
        })
    }
}

fn face_error(e: FaceError) -> DomainError {
    match e {
        FaceError::MissingImage => DomainError::Validation(e.to_string()),
        other => DomainError::External(other.to_string()),
    }
}
