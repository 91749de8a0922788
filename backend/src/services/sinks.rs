//! Outbound side effects: notifications and the audit trail.
//!
//! Both are best effort. [`Sinks`] logs and swallows delivery failures so a
//! broken webhook or audit table never fails the action that triggered it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("http delivery failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

// -- Notifications --

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    LateArrival,
    LeaveApplied,
    LeaveApprovalRequested,
    LeaveApproved,
    LeaveRejected,
    LeaveCancelled,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Notification {
    pub recipient_id: Uuid,
    pub company_id: Uuid,
    pub event: NotificationEvent,
    pub title: String,
    pub message: String,
    /// Entity the notification is about (leave request, attendance record).
    pub related_id: Option<Uuid>,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), SinkError>;
}

/// Writes notifications to the log only.
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn send(&self, n: &Notification) -> Result<(), SinkError> {
        tracing::info!(
            recipient = %n.recipient_id,
            event = ?n.event,
            related = ?n.related_id,
            "notification: {}",
            n.title
        );
        Ok(())
    }
}

/// POSTs each notification as JSON to a configured URL.
pub struct WebhookNotificationSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotificationSink {
    /// `timeout` bounds each delivery so a stalled endpoint cannot hold up
    /// the workflow action that sent it.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookNotificationSink {
    async fn send(&self, n: &Notification) -> Result<(), SinkError> {
        self.client
            .post(&self.url)
            .json(n)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Keeps everything it is sent. Used by tests to assert on side effects.
#[derive(Default)]
pub struct MemoryNotificationSink {
    sent: Mutex<Vec<Notification>>,
}

impl MemoryNotificationSink {
    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl NotificationSink for MemoryNotificationSink {
    async fn send(&self, n: &Notification) -> Result<(), SinkError> {
        self.sent.lock().await.push(n.clone());
        Ok(())
    }
}

// -- Audit --

pub const MODULE_ATTENDANCE: &str = "ATTENDANCE";
pub const MODULE_LEAVE: &str = "LEAVE";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AuditEvent {
    pub module: &'static str,
    pub action: String,
    pub performed_by: Uuid,
    pub company_id: Uuid,
    pub target_id: Option<Uuid>,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

impl AuditEvent {
    pub fn new(module: &'static str, action: impl Into<String>, performed_by: Uuid, company_id: Uuid, at: OffsetDateTime) -> Self {
        Self {
            module,
            action: action.into(),
            performed_by,
            company_id,
            target_id: None,
            before: None,
            after: None,
            metadata: None,
            at,
        }
    }

    pub fn target(mut self, id: Uuid) -> Self {
        self.target_id = Some(id);
        self
    }

    pub fn before<T: Serialize>(mut self, state: &T) -> Self {
        self.before = serde_json::to_value(state).ok();
        self
    }

    pub fn after<T: Serialize>(mut self, state: &T) -> Self {
        self.after = serde_json::to_value(state).ok();
        self
    }

    pub fn metadata(mut self, value: serde_json::Value) -> Self {
        self.metadata = Some(value);
        self
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &AuditEvent) -> Result<(), SinkError>;
}

pub struct LogAuditSink;

#[async_trait]
impl AuditSink for LogAuditSink {
    async fn record(&self, e: &AuditEvent) -> Result<(), SinkError> {
        tracing::info!(
            target: "audit",
            module = e.module,
            action = %e.action,
            performed_by = %e.performed_by,
            target_id = ?e.target_id,
            "audit event"
        );
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<(), SinkError> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

/// Fire-and-forget front for both sinks.
#[derive(Clone)]
pub struct Sinks {
    notifications: Arc<dyn NotificationSink>,
    audit: Arc<dyn AuditSink>,
}

impl Sinks {
    pub fn new(notifications: Arc<dyn NotificationSink>, audit: Arc<dyn AuditSink>) -> Self {
        Self { notifications, audit }
    }

    pub fn logging() -> Self {
        Self::new(Arc::new(LogNotificationSink), Arc::new(LogAuditSink))
    }

    pub async fn notify(&self, notification: Notification) {
        if let Err(e) = self.notifications.send(&notification).await {
            tracing::warn!(
                recipient = %notification.recipient_id,
                event = ?notification.event,
                "notification delivery failed: {e}"
            );
        }
    }

    pub async fn audit(&self, event: AuditEvent) {
        if let Err(e) = self.audit.record(&event).await {
            tracing::warn!(module = event.module, action = %event.action, "audit write failed: {e}");
        }
    }
}
