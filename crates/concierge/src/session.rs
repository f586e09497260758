//! Concierge session records and the in-memory session store.
//!
//! Session state is an explicit finite-state machine with a single
//! transition function: every lifecycle change goes through
//! [`Session::transition`], which rejects illegal moves instead of
//! relying on scattered flags.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use porter_domain::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// State machine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Active,
    AwaitingApproval,
    Ended,
}

impl SessionState {
    /// Legal transitions. `Ended` is terminal.
    fn can_transition(self, to: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, to),
            (Created, Active)
                | (Created, Ended)
                | (Active, AwaitingApproval)
                | (Active, Ended)
                | (AwaitingApproval, Active)
                | (AwaitingApproval, Ended)
        )
    }
}

/// Which channel initiated the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionSource {
    #[default]
    Web,
    Hub,
}

/// Terminal status recorded when a session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalStatus {
    Completed,
    Cancelled,
    Timeout,
}

impl std::fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Timeout => f.write_str("timeout"),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Collected visitor data
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Data the assistant accumulates across tool calls. Merging is
/// field-wise, last write wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorData {
    #[serde(default)]
    pub visitor_name: Option<String>,
    #[serde(default)]
    pub visitor_rut: Option<String>,
    #[serde(default)]
    pub visitor_phone: Option<String>,
    #[serde(default)]
    pub vehicle_plate: Option<String>,
    #[serde(default)]
    pub visit_reason: Option<String>,
    #[serde(default)]
    pub destination_unit: Option<String>,
    #[serde(default)]
    pub resident_response: Option<String>,
}

impl VisitorData {
    pub fn merge(&mut self, other: &VisitorData) {
        fn take(dst: &mut Option<String>, src: &Option<String>) {
            if src.is_some() {
                *dst = src.clone();
            }
        }
        take(&mut self.visitor_name, &other.visitor_name);
        take(&mut self.visitor_rut, &other.visitor_rut);
        take(&mut self.visitor_phone, &other.visitor_phone);
        take(&mut self.vehicle_plate, &other.vehicle_plate);
        take(&mut self.visit_reason, &other.visit_reason);
        take(&mut self.destination_unit, &other.destination_unit);
        take(&mut self.resident_response, &other.resident_response);
    }

    /// Whether enough was collected to constitute a valid visit:
    /// destination unit + visitor identity at minimum.
    pub fn has_visit_minimum(&self) -> bool {
        self.visitor_name.is_some() && self.destination_unit.is_some()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session record
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Memoized result of the first `end` call, so repeated ends return the
/// same figures without re-running side effects.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EndSummary {
    pub status: FinalStatus,
    pub duration_seconds: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub state: SessionState,
    pub source: SessionSource,
    #[serde(default)]
    pub hub_id: Option<String>,
    #[serde(default)]
    pub socket_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub collected: VisitorData,
    /// Visit created during this session (by `notify_resident`,
    /// `create_visit`, or the end-of-session flush), at most one.
    #[serde(default)]
    pub created_visit: Option<Uuid>,
    #[serde(default)]
    pub final_status: Option<FinalStatus>,
    #[serde(default)]
    pub end_summary: Option<EndSummary>,
}

impl Session {
    pub fn new(
        id: String,
        source: SessionSource,
        hub_id: Option<String>,
        socket_id: Option<String>,
    ) -> Self {
        Self {
            id,
            state: SessionState::Created,
            source,
            hub_id,
            socket_id,
            created_at: Utc::now(),
            ended_at: None,
            collected: VisitorData::default(),
            created_visit: None,
            final_status: None,
            end_summary: None,
        }
    }

    /// Apply a state transition, rejecting illegal ones.
    pub fn transition(&mut self, to: SessionState) -> Result<()> {
        if !self.state.can_transition(to) {
            return Err(Error::Validation(format!(
                "illegal session state transition: {:?} -> {to:?}",
                self.state
            )));
        }
        self.state = to;
        Ok(())
    }

    pub fn is_ended(&self) -> bool {
        self.state == SessionState::Ended
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.created_at)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Keyed in-memory session map. Sessions are process-lifetime state: a
/// crashed gateway loses them and the kiosk client simply times out.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, session: Session) {
        self.sessions.write().insert(session.id.clone(), session);
    }

    pub fn snapshot(&self, id: &str) -> Option<Session> {
        self.sessions.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.read().contains_key(id)
    }

    /// Mutate a session under the map's write lock. The closure should
    /// stay short; I/O belongs outside it.
    pub fn with_session<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut Session) -> Result<R>,
    ) -> Result<R> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("session {id}")))?;
        f(session)
    }

    /// IDs of sessions older than `max_age` that have not ended yet.
    pub fn expired_ids(&self, max_age: Duration, now: DateTime<Utc>) -> Vec<String> {
        self.sessions
            .read()
            .values()
            .filter(|s| !s.is_ended() && s.age(now) > max_age)
            .map(|s| s.id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
