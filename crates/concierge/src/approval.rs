//! Approval correlation: bridges a resident's asynchronous yes/no back
//! to the session that asked for it.
//!
//! `notify_resident` opens a pending approval and returns immediately;
//! the resolution arrives later through the respond endpoint, or never
//! arrives and the request expires. Resolution is compare-and-set under
//! one lock: the first writer out of `Pending` wins, later attempts are
//! no-ops that report the recorded decision. Expiry is an implicit
//! denial applied lazily on read and by the background sweep, so no
//! per-approval timer is needed.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

use porter_domain::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Pending,
    Approved,
    Denied,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Approved => f.write_str("approved"),
            Self::Denied => f.write_str("denied"),
        }
    }
}

/// An outstanding (or settled) resident decision request.
#[derive(Debug, Clone, Serialize)]
pub struct PendingApproval {
    pub id: Uuid,
    pub session_id: String,
    /// Resident who was asked to decide.
    pub resident_id: String,
    pub visit_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub decision: Decision,
    /// `None` on implicit (expiry / session-end) denials.
    pub responded_by: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl PendingApproval {
    fn expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Outcome of a resolution attempt.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// This call performed the transition out of `Pending`.
    Decided(PendingApproval),
    /// Someone (or the expiry) got there first.
    AlreadyResolved {
        decision: Decision,
        responded_by: Option<String>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Keyed by session: the invariant is at most one open approval per
/// session, so the session id is the natural correlation key.
pub struct ApprovalStore {
    by_session: RwLock<HashMap<String, PendingApproval>>,
    ttl: Duration,
}

impl ApprovalStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            by_session: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Open a new pending approval for a session. Fails while another
    /// one is still open; a settled or expired predecessor is replaced.
    pub fn open(
        &self,
        session_id: &str,
        resident_id: &str,
        visit_id: Option<Uuid>,
    ) -> Result<PendingApproval> {
        let now = Utc::now();
        let mut by_session = self.by_session.write();

        if let Some(existing) = by_session.get(session_id) {
            if existing.decision == Decision::Pending && !existing.expired(now) {
                return Err(Error::Validation("approval_already_pending".into()));
            }
        }

        let approval = PendingApproval {
            id: Uuid::new_v4(),
            session_id: session_id.to_owned(),
            resident_id: resident_id.to_owned(),
            visit_id,
            created_at: now,
            expires_at: now + self.ttl,
            decision: Decision::Pending,
            responded_by: None,
            responded_at: None,
        };
        by_session.insert(session_id.to_owned(), approval.clone());

        tracing::info!(
            session_id = %session_id,
            resident_id = %resident_id,
            approval_id = %approval.id,
            "approval opened"
        );
        Ok(approval)
    }

    /// Resolve the session's approval. Compare-and-set: exactly one
    /// caller (explicit respond, expiry, or session end) performs the
    /// transition; everyone else observes the recorded decision.
    pub fn resolve(
        &self,
        session_id: &str,
        approved: bool,
        responded_by: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Resolution> {
        let mut by_session = self.by_session.write();
        let approval = by_session
            .get_mut(session_id)
            .ok_or_else(|| Error::NotFound(format!("no pending approval for session {session_id}")))?;

        // Lazy expiry: an elapsed pending approval was already denied,
        // it just had not been written yet.
        if approval.decision == Decision::Pending && approval.expired(now) {
            approval.decision = Decision::Denied;
            approval.responded_at = Some(approval.expires_at);
        }

        if approval.decision != Decision::Pending {
            return Ok(Resolution::AlreadyResolved {
                decision: approval.decision,
                responded_by: approval.responded_by.clone(),
            });
        }

        approval.decision = if approved {
            Decision::Approved
        } else {
            Decision::Denied
        };
        approval.responded_by = responded_by;
        approval.responded_at = Some(now);

        tracing::info!(
            session_id = %session_id,
            decision = %approval.decision,
            "approval resolved"
        );
        Ok(Resolution::Decided(approval.clone()))
    }

    /// Peek at the session's approval without touching it.
    pub fn get(&self, session_id: &str) -> Option<PendingApproval> {
        self.by_session.read().get(session_id).cloned()
    }

    /// Write the implicit denial for this session's approval if (and
    /// only if) its expiry has elapsed while still pending. Returns the
    /// denied approval when this call performed the write.
    pub fn expire_if_elapsed(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Option<PendingApproval> {
        let mut by_session = self.by_session.write();
        let approval = by_session.get_mut(session_id)?;
        if approval.decision == Decision::Pending && approval.expired(now) {
            approval.decision = Decision::Denied;
            approval.responded_at = Some(approval.expires_at);
            return Some(approval.clone());
        }
        None
    }

    /// Write the implicit denial for every elapsed pending approval and
    /// return them, so the caller can run the denial side effects.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<PendingApproval> {
        let mut by_session = self.by_session.write();
        let mut denied = Vec::new();
        for approval in by_session.values_mut() {
            if approval.decision == Decision::Pending && approval.expired(now) {
                approval.decision = Decision::Denied;
                approval.responded_at = Some(approval.expires_at);
                denied.push(approval.clone());
            }
        }
        if !denied.is_empty() {
            tracing::info!(count = denied.len(), "expired approvals denied");
        }
        denied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn store() -> ApprovalStore {
        ApprovalStore::new(Duration::minutes(15))
    }

    #[test]
    fn open_resolve_round_trip() {
        let store = store();
        store.open("s1", "R1", None).unwrap();

        match store.resolve("s1", true, Some("R1".into()), Utc::now()).unwrap() {
            Resolution::Decided(a) => {
                assert_eq!(a.decision, Decision::Approved);
                assert_eq!(a.responded_by.as_deref(), Some("R1"));
            }
            other => panic!("expected Decided, got {other:?}"),
        }
    }

    #[test]
    fn second_resolution_is_a_no_op() {
        let store = store();
        store.open("s1", "R1", None).unwrap();
        store.resolve("s1", true, Some("R1".into()), Utc::now()).unwrap();

        match store.resolve("s1", false, Some("R2".into()), Utc::now()).unwrap() {
            Resolution::AlreadyResolved { decision, responded_by } => {
                assert_eq!(decision, Decision::Approved);
                assert_eq!(responded_by.as_deref(), Some("R1"));
            }
            other => panic!("expected AlreadyResolved, got {other:?}"),
        }
    }

    #[test]
    fn concurrent_resolutions_record_exactly_one_decision() {
        let store = Arc::new(store());
        store.open("s1", "R1", None).unwrap();

        let mut handles = Vec::new();
        for approved in [true, false, true, false] {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                store.resolve("s1", approved, Some("R1".into()), Utc::now())
            }));
        }

        let decided = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .filter(|r| matches!(r, Resolution::Decided(_)))
            .count();
        assert_eq!(decided, 1, "exactly one resolution must win");

        let recorded = store.get("s1").unwrap();
        assert_ne!(recorded.decision, Decision::Pending);
    }

    #[test]
    fn expired_pending_is_denied_without_prior_write() {
        let store = ApprovalStore::new(Duration::zero());
        store.open("s1", "R1", None).unwrap();

        match store.resolve("s1", true, Some("R1".into()), Utc::now()).unwrap() {
            Resolution::AlreadyResolved { decision, responded_by } => {
                assert_eq!(decision, Decision::Denied);
                assert!(responded_by.is_none());
            }
            other => panic!("expected implicit denial, got {other:?}"),
        }
    }

    #[test]
    fn at_most_one_open_per_session() {
        let store = store();
        store.open("s1", "R1", None).unwrap();
        assert!(matches!(
            store.open("s1", "R2", None),
            Err(Error::Validation(_))
        ));

        // Settled approval can be replaced by a fresh request.
        store.resolve("s1", false, None, Utc::now()).unwrap();
        assert!(store.open("s1", "R2", None).is_ok());
    }

    #[test]
    fn unknown_session_is_not_found() {
        let store = store();
        assert!(matches!(
            store.resolve("nope", true, None, Utc::now()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn sweep_denies_only_elapsed_pendings() {
        let store = ApprovalStore::new(Duration::zero());
        store.open("s1", "R1", None).unwrap();

        let fresh = ApprovalStore::new(Duration::minutes(15));
        fresh.open("s2", "R2", None).unwrap();

        let denied = store.sweep_expired(Utc::now());
        assert_eq!(denied.len(), 1);
        assert_eq!(denied[0].session_id, "s1");
        assert!(fresh.sweep_expired(Utc::now()).is_empty());
    }
}
