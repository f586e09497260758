//! Concierge session lifecycle.
//!
//! The public surface of the core: start, house-context, execute-tool,
//! status, respond, end. Every multi-step operation on a session runs
//! under that session's lock (see [`crate::locks`]), so the
//! at-most-one-visit and at-most-one-resolution invariants hold even
//! with concurrent HTTP calls; unrelated sessions proceed in parallel.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use porter_directory::{NewVisit, NotificationStore, UnitDirectory, VisitStatus, VisitStore};
use porter_domain::config::ConciergeConfig;
use porter_domain::error::{Error, Result};
use porter_domain::tool::{ToolCall, ToolName, ToolResult};
use porter_hub_protocol::{AccessKind, HubMessage};
use porter_realtime::CredentialIssuer;

use crate::approval::{ApprovalStore, PendingApproval, Resolution};
use crate::context;
use crate::hub::HubChannel;
use crate::locks::SessionLockMap;
use crate::session::{
    EndSummary, FinalStatus, Session, SessionSource, SessionState, SessionStore,
};
use crate::tools::ToolExecutor;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartSessionRequest {
    #[serde(default)]
    pub socket_id: Option<String>,
    #[serde(default)]
    pub source: SessionSource,
    #[serde(default)]
    pub hub_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub ephemeral_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Whether a session currently accepts tool execution / responses.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SessionStatus {
    fn active() -> Self {
        Self {
            active: true,
            reason: None,
        }
    }

    fn inactive(reason: &str) -> Self {
        Self {
            active: false,
            reason: Some(reason.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RespondOutcome {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EndSessionResponse {
    pub session_id: String,
    pub status: FinalStatus,
    pub duration_seconds: i64,
    pub visit_created: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ConciergeService {
    cfg: ConciergeConfig,
    sessions: SessionStore,
    approvals: Arc<ApprovalStore>,
    executor: ToolExecutor,
    issuer: Arc<dyn CredentialIssuer>,
    directory: Arc<UnitDirectory>,
    visits: Arc<VisitStore>,
    notifications: Arc<NotificationStore>,
    hub: HubChannel,
    locks: SessionLockMap,
}

impl ConciergeService {
    pub fn new(
        cfg: ConciergeConfig,
        directory: Arc<UnitDirectory>,
        visits: Arc<VisitStore>,
        notifications: Arc<NotificationStore>,
        issuer: Arc<dyn CredentialIssuer>,
    ) -> Self {
        let approvals = Arc::new(ApprovalStore::new(Duration::minutes(
            cfg.approval_timeout_minutes as i64,
        )));
        let executor = ToolExecutor::new(
            Arc::clone(&directory),
            Arc::clone(&visits),
            Arc::clone(&notifications),
            Arc::clone(&approvals),
        );
        let hub = HubChannel::new(cfg.hub_event_buffer);

        Self {
            cfg,
            sessions: SessionStore::new(),
            approvals,
            executor,
            issuer,
            directory,
            visits,
            notifications,
            hub,
            locks: SessionLockMap::new(),
        }
    }

    /// The hub event channel (the gateway's WS endpoint subscribes here).
    pub fn hub(&self) -> &HubChannel {
        &self.hub
    }

    /// Read-only session snapshot (introspection and tests).
    pub fn session(&self, session_id: &str) -> Option<Session> {
        self.sessions.snapshot(session_id)
    }

    // ── start ─────────────────────────────────────────────────────

    /// Start a session: mint the realtime credential first, record the
    /// session only once the credential exists. An unreachable issuer
    /// surfaces as ServiceUnavailable and leaves no orphan entry.
    pub async fn start_session(&self, req: StartSessionRequest) -> Result<StartSessionResponse> {
        let session_id = Uuid::new_v4().simple().to_string();

        let credential = self.issuer.issue(&session_id).await?;

        let mut session = Session::new(session_id.clone(), req.source, req.hub_id, req.socket_id);
        session.transition(SessionState::Active)?;
        self.sessions.insert(session);

        tracing::info!(
            session_id = %session_id,
            source = ?req.source,
            provider = %self.issuer.provider_id(),
            "concierge session started"
        );

        Ok(StartSessionResponse {
            session_id,
            ephemeral_token: credential.token,
            expires_at: credential.expires_at,
        })
    }

    // ── house context ─────────────────────────────────────────────

    /// Prior-visit history primer for a destination unit. Side-effect
    /// free; no session required.
    pub fn house_context(&self, house_number: &str) -> Result<String> {
        context::build_house_context(
            &self.directory,
            &self.visits,
            house_number,
            self.cfg.context_visit_limit,
        )
    }

    // ── execute tool ──────────────────────────────────────────────

    pub async fn execute_tool(&self, session_id: &str, call: &ToolCall) -> Result<ToolResult> {
        let _permit = self.locks.acquire(session_id).await?;
        self.expire_if_stale(session_id).await;

        let snapshot = self
            .sessions
            .snapshot(session_id)
            .ok_or_else(|| Error::NotFound(format!("session {session_id}")))?;
        if snapshot.is_ended() {
            return Err(Error::TerminalSession(format!(
                "session {session_id} has ended"
            )));
        }

        // Unknown tool names are conversation-level failures, not
        // transport errors: the assistant hears about it and moves on.
        let Some(name) = ToolName::parse(&call.tool_name) else {
            tracing::warn!(
                session_id = %session_id,
                tool = %call.tool_name,
                "unknown tool requested"
            );
            return Ok(ToolResult::fail(format!(
                "unknown tool: {}",
                call.tool_name
            )));
        };

        let outcome = self.executor.execute(&snapshot, name, &call.parameters).await;

        self.sessions.with_session(session_id, |session| {
            if let Some(fragment) = &outcome.collected {
                session.collected.merge(fragment);
            }
            if let Some(visit_id) = outcome.created_visit {
                session.created_visit = Some(visit_id);
            }
            if outcome.awaiting_approval {
                session.transition(SessionState::AwaitingApproval)?;
            }
            Ok(())
        })?;

        Ok(outcome.result)
    }

    // ── status ────────────────────────────────────────────────────

    pub async fn is_session_active(&self, session_id: &str) -> Result<SessionStatus> {
        let _permit = self.locks.acquire(session_id).await?;
        self.expire_if_stale(session_id).await;

        let Some(session) = self.sessions.snapshot(session_id) else {
            return Ok(SessionStatus::inactive("not_found"));
        };

        if session.is_ended() {
            let reason = match session.final_status {
                Some(FinalStatus::Timeout) => "expired",
                _ => "ended",
            };
            return Ok(SessionStatus::inactive(reason));
        }

        // An elapsed approval is already denied, it just may not have
        // been written yet. Settle it here rather than waiting for the
        // sweep.
        if let Some(approval) = self.approvals.expire_if_elapsed(session_id, Utc::now()) {
            self.settle_implicit_denial(&approval, "approval_timeout").await;
        }

        Ok(SessionStatus::active())
    }

    // ── respond ───────────────────────────────────────────────────

    /// Resolve the session's pending approval with a resident decision.
    /// Idempotent: a second response (or one racing the expiry) is a
    /// no-op that reports the recorded outcome.
    pub async fn respond_to_visitor(
        &self,
        session_id: &str,
        approved: bool,
        resident_id: Option<String>,
    ) -> Result<RespondOutcome> {
        let _permit = self.locks.acquire(session_id).await?;
        self.expire_if_stale(session_id).await;

        let snapshot = self
            .sessions
            .snapshot(session_id)
            .ok_or_else(|| Error::NotFound(format!("session {session_id}")))?;
        if snapshot.is_ended() {
            // A stale approval arriving after the session closed must
            // not reopen anything.
            return Err(Error::TerminalSession(format!(
                "session {session_id} has ended"
            )));
        }

        // Settle an elapsed approval first: the response then observes
        // the implicit denial instead of racing it.
        if let Some(expired) = self.approvals.expire_if_elapsed(session_id, Utc::now()) {
            self.settle_implicit_denial(&expired, "approval_timeout").await;
        }

        let resolution =
            self.approvals
                .resolve(session_id, approved, resident_id.clone(), Utc::now())?;

        let approval = match resolution {
            Resolution::AlreadyResolved { decision, .. } => {
                return Ok(RespondOutcome {
                    success: true,
                    message: format!("request already resolved: {decision}"),
                });
            }
            Resolution::Decided(approval) => approval,
        };

        // record_decision: the winning resolution writes the response
        // into the session's collected data.
        self.sessions.with_session(session_id, |session| {
            session.collected.resident_response = Some(
                if approved { "approved" } else { "denied" }.to_owned(),
            );
            if session.state == SessionState::AwaitingApproval {
                session.transition(SessionState::Active)?;
            }
            Ok(())
        })?;

        if let Some(visit_id) = approval.visit_id {
            if approved {
                if let Err(e) = self.visits.check_in(&visit_id) {
                    tracing::warn!(visit_id = %visit_id, error = %e, "visit check-in failed");
                }
                // Reassign the host to the resident who actually
                // answered. Only the notified resident counts.
                if let Some(rid) = &resident_id {
                    if *rid == approval.resident_id {
                        if let Err(e) = self.visits.set_host(&visit_id, rid) {
                            tracing::warn!(visit_id = %visit_id, error = %e, "host update failed");
                        }
                    } else {
                        tracing::warn!(
                            resident_id = %rid,
                            notified = %approval.resident_id,
                            "responding resident was not the one notified, keeping host"
                        );
                    }
                }
            } else if let Err(e) = self.visits.update_status(&visit_id, VisitStatus::Denied) {
                tracing::warn!(visit_id = %visit_id, error = %e, "visit denial failed");
            }
        }

        self.notifications
            .close_for_session(session_id, approved, None)
            .await;

        self.hub.emit(HubMessage::VisitorResponse {
            session_id: session_id.to_owned(),
            approved,
            visit_id: approval.visit_id,
            responded_by: resident_id,
            timestamp: Utc::now(),
        });
        if approved {
            if let Some(visit_id) = approval.visit_id {
                let access = match self.visits.get(&visit_id).map(|v| v.kind) {
                    Some(porter_directory::VisitKind::Vehicular) => AccessKind::Vehicular,
                    _ => AccessKind::Pedestrian,
                };
                self.hub.emit(HubMessage::DoorOpen { access, visit_id });
            }
        }

        tracing::info!(
            session_id = %session_id,
            approved,
            "visitor response recorded"
        );

        Ok(RespondOutcome {
            success: true,
            message: if approved {
                "visit approved".to_owned()
            } else {
                "visit denied".to_owned()
            },
        })
    }

    // ── end ───────────────────────────────────────────────────────

    /// End a session. Idempotent: repeated calls return the memoized
    /// duration with `visit_created: false` and run no side effects.
    pub async fn end_session(
        &self,
        session_id: &str,
        final_status: Option<FinalStatus>,
    ) -> Result<EndSessionResponse> {
        let _permit = self.locks.acquire(session_id).await?;
        self.expire_if_stale(session_id).await;
        self.finalize(
            session_id,
            final_status.unwrap_or(FinalStatus::Completed),
            true,
        )
        .await
    }

    /// Background sweep: settle expired approvals and time out stale
    /// sessions. Called periodically by the gateway.
    pub async fn sweep(&self, now: DateTime<Utc>) {
        for approval in self.approvals.sweep_expired(now) {
            self.settle_implicit_denial(&approval, "approval_timeout").await;
        }

        let max_age = Duration::minutes(self.cfg.session_max_minutes as i64);
        for session_id in self.sessions.expired_ids(max_age, now) {
            match self.locks.acquire(&session_id).await {
                Ok(_permit) => {
                    if let Err(e) = self
                        .finalize(&session_id, FinalStatus::Timeout, false)
                        .await
                    {
                        tracing::warn!(session_id = %session_id, error = %e, "session timeout failed");
                    }
                }
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "session lock unavailable");
                }
            }
        }

        self.locks.prune_idle();
    }

    // ── internals ─────────────────────────────────────────────────

    /// Time out a stale session. Caller holds the session lock.
    async fn expire_if_stale(&self, session_id: &str) {
        let max_age = Duration::minutes(self.cfg.session_max_minutes as i64);
        let stale = self
            .sessions
            .snapshot(session_id)
            .map(|s| !s.is_ended() && s.age(Utc::now()) > max_age)
            .unwrap_or(false);
        if stale {
            if let Err(e) = self.finalize(session_id, FinalStatus::Timeout, false).await {
                tracing::warn!(session_id = %session_id, error = %e, "session expiry failed");
            }
        }
    }

    /// Side effects of an implicit (expiry) denial: notifications are
    /// closed, the session leaves AwaitingApproval, and hubs hear the
    /// denial.
    async fn settle_implicit_denial(&self, approval: &PendingApproval, reason: &str) {
        self.notifications
            .close_for_session(&approval.session_id, false, Some(reason.to_owned()))
            .await;

        let _ = self.sessions.with_session(&approval.session_id, |session| {
            if session.state == SessionState::AwaitingApproval {
                session.transition(SessionState::Active)?;
            }
            if session.collected.resident_response.is_none() {
                session.collected.resident_response = Some("denied".to_owned());
            }
            Ok(())
        });

        if let Some(visit_id) = approval.visit_id {
            if let Err(e) = self.visits.update_status(&visit_id, VisitStatus::Expired) {
                tracing::warn!(visit_id = %visit_id, error = %e, "visit expiry failed");
            }
        }

        self.hub.emit(HubMessage::VisitorResponse {
            session_id: approval.session_id.clone(),
            approved: false,
            visit_id: approval.visit_id,
            responded_by: None,
            timestamp: Utc::now(),
        });

        tracing::info!(
            session_id = %approval.session_id,
            reason,
            "pending approval implicitly denied"
        );
    }

    /// Shared end path. Caller holds the session lock. `flush_visit`
    /// is true only for explicit end calls; a timeout does not create
    /// records on the visitor's behalf.
    async fn finalize(
        &self,
        session_id: &str,
        status: FinalStatus,
        flush_visit: bool,
    ) -> Result<EndSessionResponse> {
        let snapshot = self
            .sessions
            .snapshot(session_id)
            .ok_or_else(|| Error::NotFound(format!("session {session_id}")))?;

        if let Some(summary) = snapshot.end_summary {
            return Ok(EndSessionResponse {
                session_id: session_id.to_owned(),
                status: summary.status,
                duration_seconds: summary.duration_seconds,
                visit_created: false,
            });
        }

        // Cancellation propagates downward: an open approval dies with
        // the session. An already-elapsed one is settled as an expiry
        // first so its notifications close with the right reason.
        let denial_reason = match status {
            FinalStatus::Timeout => "session_timeout",
            _ => "session_ended",
        };
        if let Some(approval) = self.approvals.expire_if_elapsed(session_id, Utc::now()) {
            self.settle_implicit_denial(&approval, "approval_timeout").await;
        }
        if let Ok(Resolution::Decided(approval)) =
            self.approvals.resolve(session_id, false, None, Utc::now())
        {
            self.notifications
                .close_for_session(session_id, false, Some(denial_reason.to_owned()))
                .await;
            if let Some(visit_id) = approval.visit_id {
                if let Err(e) = self.visits.update_status(&visit_id, VisitStatus::Denied) {
                    tracing::warn!(visit_id = %visit_id, error = %e, "visit denial failed");
                }
            }
            self.hub.emit(HubMessage::VisitorResponse {
                session_id: session_id.to_owned(),
                approved: false,
                visit_id: approval.visit_id,
                responded_by: None,
                timestamp: Utc::now(),
            });
        }

        // Flush the visit-creation side effect: data was collected but
        // no tool call produced the record yet.
        let mut created_visit = None;
        if flush_visit
            && snapshot.created_visit.is_none()
            && snapshot.collected.has_visit_minimum()
        {
            let destination = snapshot
                .collected
                .destination_unit
                .clone()
                .unwrap_or_default();
            match self.directory.find_by_identifier(&destination) {
                Some(unit) => {
                    let visit = self.visits.create(NewVisit {
                        visitor_name: snapshot.collected.visitor_name.clone().unwrap_or_default(),
                        visitor_rut: snapshot.collected.visitor_rut.clone(),
                        visitor_phone: snapshot.collected.visitor_phone.clone(),
                        vehicle_plate: snapshot.collected.vehicle_plate.clone(),
                        reason: snapshot.collected.visit_reason.clone(),
                        unit_identifier: unit.identifier,
                        host_id: unit.residents.first().map(|r| r.id.clone()),
                    });
                    created_visit = Some(visit.id);
                }
                None => {
                    tracing::warn!(
                        session_id = %session_id,
                        unit = %destination,
                        "collected destination unit unknown, skipping visit creation"
                    );
                }
            }
        }

        let visit_created = flush_visit && (created_visit.is_some() || snapshot.created_visit.is_some());

        let duration_seconds = self.sessions.with_session(session_id, |session| {
            if let Some(visit_id) = created_visit {
                session.created_visit = Some(visit_id);
            }
            session.transition(SessionState::Ended)?;
            let now = Utc::now();
            session.ended_at = Some(now);
            session.final_status = Some(status);
            let duration = session.age(now).num_seconds().max(0);
            session.end_summary = Some(EndSummary {
                status,
                duration_seconds: duration,
            });
            Ok(duration)
        })?;

        tracing::info!(
            session_id = %session_id,
            status = %status,
            duration_seconds,
            visit_created,
            "concierge session ended"
        );

        Ok(EndSessionResponse {
            session_id: session_id.to_owned(),
            status,
            duration_seconds,
            visit_created,
        })
    }
}
