#![allow(dead_code)]
use std::net::SocketAddr;
use std::sync::Arc;

use time::macros::{date, datetime, time};
use uuid::Uuid;

use workforce_backend::{
    api,
    auth::{create_token, Claims, Role},
    calendar::{Calendar, FixedClock, WeeklyOffs},
    models::{
        days::{Days, Hours},
        employee::Employee,
        leave::LeaveType,
        shift::ShiftPolicy,
    },
    services::{
        face::MockFaceProvider,
        sinks::{MemoryAuditSink, MemoryNotificationSink, Sinks},
    },
    store::{BalanceStore, MemoryStore, Stores},
    AppState, Wiring,
};

pub const JWT_SECRET: &str = "test-secret-that-is-at-least-32-chars-long!!";

/// A running server plus handles on everything behind it. The clock starts
/// at Monday 2026-03-02 08:00 UTC.
pub struct TestApp {
    pub addr: SocketAddr,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
    pub notifications: Arc<MemoryNotificationSink>,
    pub audit: Arc<MemoryAuditSink>,
    pub face: Arc<MockFaceProvider>,
    pub company: Uuid,
    pub admin: Employee,
    pub hr: Employee,
    pub manager: Employee,
    pub employee: Employee,
    /// Admin of a different company.
    pub outsider: Employee,
    pub casual: LeaveType,
}

fn person(company_id: Uuid, first: &str, role: Role, manager_id: Option<Uuid>, shift_id: Option<Uuid>) -> Employee {
    let id = Uuid::new_v4();
    Employee {
        id,
        company_id,
        employee_code: format!("T-{}", &id.to_string()[..8]),
        first_name: first.into(),
        last_name: "User".into(),
        email: format!("{}+{}@test.local", first.to_lowercase(), &id.to_string()[..8]),
        role,
        manager_id,
        shift_id,
        date_of_joining: date!(2024-01-01),
        face_id: None,
        is_active: true,
    }
}

/// Spin up a real Axum server on a random port backed by the in-memory store.
pub async fn setup_test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::new(datetime!(2026-03-02 08:00 UTC)));
    let notifications = Arc::new(MemoryNotificationSink::default());
    let audit = Arc::new(MemoryAuditSink::default());
    let face = Arc::new(MockFaceProvider::default());
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

    let sid = Some(shift.shift_id);
    let admin = person(company, "Ada", Role::Admin, None, sid);
    let hr = person(company, "Hana", Role::Hr, None, sid);
    let manager = person(company, "Milo", Role::Manager, None, sid);
    let employee = person(company, "Esme", Role::Employee, Some(manager.id), sid);
    let outsider = person(Uuid::new_v4(), "Otto", Role::Admin, None, None);
    for e in [&admin, &hr, &manager, &employee, &outsider] {
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
    store.add_leave_type(casual.clone()).await;
    store
        .set(employee.id, casual.id, Days::whole(12))
        .await
        .expect("Failed to seed balance");

    let state = AppState::new(Wiring {
        stores: Stores::from_backend(store.clone()),
        face: face.clone(),
        clock: clock.clone(),
        calendar: Calendar::default(),
        default_weekly_offs: WeeklyOffs::WEEKEND,
        sinks: Sinks::new(notifications.clone(), audit.clone()),
        jwt_secret: JWT_SECRET.to_string(),
    });
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        addr,
        store,
        clock,
        notifications,
        audit,
        face,
        company,
        admin,
        hr,
        manager,
        employee,
        outsider,
        casual,
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}/api{}", self.addr, path)
    }

    pub fn token(&self, who: &Employee) -> String {
        create_token(who.id, who.company_id, who.role, JWT_SECRET, 1).expect("Failed to mint token")
    }
}

/// Create a JWT token that is already expired (exp in the past).
pub fn create_expired_token(employee: &Employee) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let now = time::OffsetDateTime::now_utc();
    let claims = Claims {
        sub: employee.id,
        company_id: employee.company_id,
        role: employee.role,
        exp: (now - time::Duration::hours(1)).unix_timestamp(), // expired 1 hour ago
        iat: (now - time::Duration::hours(2)).unix_timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("Failed to create expired token")
}

/// Build a reqwest client (reusable across requests in a test).
pub fn http_client() -> reqwest::Client {
    reqwest::Client::new()
}
