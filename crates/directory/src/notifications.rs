//! Resident notifications.
//!
//! Visitor-arrival notifications carry `requires_action` and are closed
//! (`action_taken`) when the resident responds, the request expires, or
//! the originating session ends. Persisted to JSONL and kept in a
//! bounded in-memory ring; a broadcast channel feeds the SSE endpoint.

use std::collections::VecDeque;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Notification model
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: String,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
    /// The recipient must approve or deny (visitor arrivals).
    #[serde(default)]
    pub requires_action: bool,
    #[serde(default)]
    pub action_taken: bool,
    /// Decision recorded when the action was taken.
    #[serde(default)]
    pub approved: Option<bool>,
    /// Why the action closed without an explicit decision
    /// ("approval_timeout", "session_ended").
    #[serde(default)]
    pub action_reason: Option<String>,
    /// Concierge session that produced this notification, if any.
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub data: serde_json::Value,
}

impl Notification {
    pub fn new(
        recipient_id: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient_id: recipient_id.into(),
            title: title.into(),
            message: message.into(),
            created_at: Utc::now(),
            read: false,
            requires_action: false,
            action_taken: false,
            approved: None,
            action_reason: None,
            session_id: None,
            expires_at: None,
            data: serde_json::Value::Null,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Events (for SSE)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    Created { notification: Notification },
    ActionTaken { id: Uuid, approved: bool },
    Read { id: Uuid },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// NotificationStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const MAX_NOTIFICATIONS: usize = 1000;

pub struct NotificationStore {
    inner: RwLock<VecDeque<Notification>>,
    persist_path: PathBuf,
    event_tx: broadcast::Sender<NotificationEvent>,
}

impl NotificationStore {
    pub fn new(state_path: &std::path::Path) -> Self {
        let persist_path = state_path.join("notifications.jsonl");
        let (event_tx, _) = broadcast::channel(64);

        let mut store = Self {
            inner: RwLock::new(VecDeque::new()),
            persist_path,
            event_tx,
        };
        store.load();
        store
    }

    fn load(&mut self) {
        if let Ok(data) = std::fs::read_to_string(&self.persist_path) {
            let mut notifications = VecDeque::new();
            for line in data.lines() {
                if let Ok(n) = serde_json::from_str::<Notification>(line) {
                    notifications.push_back(n);
                }
            }
            let original_count = notifications.len();
            while notifications.len() > MAX_NOTIFICATIONS {
                notifications.pop_front();
            }
            if notifications.len() < original_count {
                Self::rewrite_jsonl(&self.persist_path, &notifications);
            }
            let count = notifications.len();
            self.inner = RwLock::new(notifications);
            if count > 0 {
                tracing::info!(count, "loaded notifications from disk");
            }
        }
    }

    fn rewrite_jsonl(path: &std::path::Path, notifications: &VecDeque<Notification>) {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let tmp = path.with_extension("jsonl.tmp");
        let mut ok = false;
        if let Ok(mut f) = std::fs::File::create(&tmp) {
            use std::io::Write;
            ok = true;
            for n in notifications {
                if let Ok(json) = serde_json::to_string(n) {
                    if writeln!(f, "{}", json).is_err() {
                        ok = false;
                        break;
                    }
                }
            }
        }
        if ok {
            let _ = std::fs::rename(&tmp, path);
        } else {
            let _ = std::fs::remove_file(&tmp);
        }
    }

    fn persist_one(path: &std::path::Path, notification: &Notification) {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Ok(json) = serde_json::to_string(notification) {
            use std::io::Write;
            if let Ok(mut f) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
            {
                let _ = writeln!(f, "{}", json);
            }
        }
    }

    /// Store a notification and announce it. Delivery to the recipient's
    /// device is fire-and-forget: a notification nobody sees simply
    /// expires.
    pub async fn insert(&self, notification: Notification) -> Notification {
        let n = notification.clone();
        let mut inner = self.inner.write().await;
        inner.push_back(notification);
        while inner.len() > MAX_NOTIFICATIONS {
            inner.pop_front();
        }
        drop(inner);

        Self::persist_one(&self.persist_path, &n);
        let _ = self.event_tx.send(NotificationEvent::Created {
            notification: n.clone(),
        });
        n
    }

    /// List notifications, most recent first, optionally scoped to a
    /// recipient.
    pub async fn list(
        &self,
        recipient_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> (Vec<Notification>, usize) {
        let inner = self.inner.read().await;
        let matching: Vec<&Notification> = inner
            .iter()
            .filter(|n| recipient_id.map(|r| n.recipient_id == r).unwrap_or(true))
            .collect();
        let total = matching.len();
        let items: Vec<Notification> = matching
            .into_iter()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        (items, total)
    }

    pub async fn get(&self, id: &Uuid) -> Option<Notification> {
        self.inner
            .read()
            .await
            .iter()
            .find(|n| n.id == *id)
            .cloned()
    }

    pub async fn mark_read(&self, id: &Uuid) -> bool {
        let mut inner = self.inner.write().await;
        if let Some(n) = inner.iter_mut().find(|n| n.id == *id) {
            n.read = true;
            Self::rewrite_jsonl(&self.persist_path, &inner);
            let _ = self.event_tx.send(NotificationEvent::Read { id: *id });
            true
        } else {
            false
        }
    }

    /// Record the recipient's decision on an actionable notification.
    pub async fn mark_action_taken(
        &self,
        id: &Uuid,
        approved: bool,
        reason: Option<String>,
    ) -> bool {
        let mut inner = self.inner.write().await;
        if let Some(n) = inner
            .iter_mut()
            .find(|n| n.id == *id && n.requires_action && !n.action_taken)
        {
            n.action_taken = true;
            n.approved = Some(approved);
            n.action_reason = reason;
            Self::rewrite_jsonl(&self.persist_path, &inner);
            let _ = self
                .event_tx
                .send(NotificationEvent::ActionTaken { id: *id, approved });
            true
        } else {
            false
        }
    }

    /// Close every open actionable notification tied to a session
    /// (respond / expiry / session end all funnel through here).
    /// Returns how many were closed.
    pub async fn close_for_session(
        &self,
        session_id: &str,
        approved: bool,
        reason: Option<String>,
    ) -> usize {
        let mut inner = self.inner.write().await;
        let mut closed = Vec::new();
        for n in inner.iter_mut() {
            if n.requires_action
                && !n.action_taken
                && n.session_id.as_deref() == Some(session_id)
            {
                n.action_taken = true;
                n.approved = Some(approved);
                n.action_reason = reason.clone();
                closed.push(n.id);
            }
        }
        if !closed.is_empty() {
            Self::rewrite_jsonl(&self.persist_path, &inner);
        }
        drop(inner);

        for id in &closed {
            let _ = self
                .event_tx
                .send(NotificationEvent::ActionTaken { id: *id, approved });
        }
        closed.len()
    }

    pub async fn unread_count(&self, recipient_id: Option<&str>) -> usize {
        self.inner
            .read()
            .await
            .iter()
            .filter(|n| !n.read && recipient_id.map(|r| n.recipient_id == r).unwrap_or(true))
            .count()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.event_tx.subscribe()
    }
}
