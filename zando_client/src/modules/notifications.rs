use serde::Serialize;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

const EVENT_CAP: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Error,
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub severity: Severity,
    pub message: String,
    pub detail: Option<String>,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

#[derive(Debug, Clone)]
pub enum NotificationEvent {
    Shown(Notification),
    Dismissed(Uuid),
}

struct Inner {
    active: Mutex<Vec<Notification>>,
    events: broadcast::Sender<NotificationEvent>,
    default_duration: Duration,
}

/// Toast queue. Each notification dismisses itself after its duration unless
/// it was dismissed by hand first.
#[derive(Clone)]
pub struct NotificationCenter {
    inner: Arc<Inner>,
}

impl NotificationCenter {
    pub fn new(default_duration: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAP);
        Self {
            inner: Arc::new(Inner {
                active: Mutex::new(Vec::new()),
                events,
                default_duration,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.inner.events.subscribe()
    }

    pub fn show(
        &self,
        severity: Severity,
        message: impl Into<String>,
        detail: Option<String>,
        duration: Option<Duration>,
    ) -> Uuid {
        let duration = duration
            .filter(|d| !d.is_zero())
            .unwrap_or(self.inner.default_duration);
        let n = Notification {
            id: Uuid::new_v4(),
            severity,
            message: message.into(),
            detail,
            duration,
        };
        let id = n.id;

        debug!(?severity, message = %n.message, detail = ?n.detail, "notification");

        if let Ok(mut active) = self.inner.active.lock() {
            active.push(n.clone());
        }
        let _ = self.inner.events.send(NotificationEvent::Shown(n));

        self.schedule_dismiss(id, duration);
        id
    }

    fn schedule_dismiss(&self, id: Uuid, after: Duration) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("no tokio runtime; notification {id} stays until dismissed");
            return;
        };
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        handle.spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(inner) = weak.upgrade() {
                NotificationCenter { inner }.dismiss(id);
            }
        });
    }

    pub fn success(&self, message: impl Into<String>, detail: Option<String>) -> Uuid {
        self.show(Severity::Success, message, detail, None)
    }

    pub fn error(&self, message: impl Into<String>, detail: Option<String>) -> Uuid {
        self.show(Severity::Error, message, detail, None)
    }

    pub fn info(&self, message: impl Into<String>, detail: Option<String>) -> Uuid {
        self.show(Severity::Info, message, detail, None)
    }

    pub fn warning(&self, message: impl Into<String>, detail: Option<String>) -> Uuid {
        self.show(Severity::Warning, message, detail, None)
    }

    /// Returns false when the notification was already gone.
    pub fn dismiss(&self, id: Uuid) -> bool {
        let removed = match self.inner.active.lock() {
            Ok(mut active) => match active.iter().position(|n| n.id == id) {
                Some(pos) => {
                    active.remove(pos);
                    true
                }
                None => false,
            },
            Err(_) => false,
        };
        if removed {
            let _ = self.inner.events.send(NotificationEvent::Dismissed(id));
        }
        removed
    }

    pub fn active(&self) -> Vec<Notification> {
        self.inner
            .active
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default()
    }
}
