//! Tool execution.
//!
//! A closed dispatch table over [`ToolName`]: each handler runs one
//! backend operation and reports a structured [`ToolResult`] plus the
//! session mutations to apply (collected-data fragment, created visit,
//! state change). Handlers never tear the session down: any failure,
//! expected or not, becomes `{success: false, error}` and the
//! conversation goes on.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use porter_directory::{NewVisit, Notification, NotificationStore, UnitDirectory, VisitStore};
use porter_domain::error::{Error, Result};
use porter_domain::tool::{ToolName, ToolResult};

use crate::approval::ApprovalStore;
use crate::session::{Session, VisitorData};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What a tool call produced: the wire result plus the session
/// mutations the service applies afterwards.
#[derive(Debug, Default)]
pub struct ToolOutcome {
    pub result: ToolResult,
    /// Collected-data fragment to merge into the session.
    pub collected: Option<VisitorData>,
    /// Visit created by this call, to record on the session.
    pub created_visit: Option<Uuid>,
    /// The call opened a pending approval.
    pub awaiting_approval: bool,
}

impl ToolOutcome {
    fn success(data: Value) -> Self {
        Self {
            result: ToolResult::ok(data),
            ..Default::default()
        }
    }

    fn failure(error: impl Into<String>) -> Self {
        Self {
            result: ToolResult::fail(error),
            ..Default::default()
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Parameter shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct SaveVisitorDataArgs {
    #[serde(default)]
    visitor_name: Option<String>,
    #[serde(default)]
    rut: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    plate: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    destination_unit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupResidentArgs {
    unit_number: String,
}

#[derive(Debug, Deserialize)]
struct CreateVisitArgs {
    visitor_name: String,
    #[serde(default)]
    rut: Option<String>,
    #[serde(default)]
    plate: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    destination_unit: String,
}

#[derive(Debug, Deserialize)]
struct NotifyResidentArgs {
    resident_id: String,
    #[serde(default)]
    message: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Executor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ToolExecutor {
    directory: Arc<UnitDirectory>,
    visits: Arc<VisitStore>,
    notifications: Arc<NotificationStore>,
    approvals: Arc<ApprovalStore>,
}

impl ToolExecutor {
    pub fn new(
        directory: Arc<UnitDirectory>,
        visits: Arc<VisitStore>,
        notifications: Arc<NotificationStore>,
        approvals: Arc<ApprovalStore>,
    ) -> Self {
        Self {
            directory,
            visits,
            notifications,
            approvals,
        }
    }

    /// Run one tool call against the given session snapshot. The caller
    /// holds the per-session lock, so the snapshot cannot go stale
    /// under us.
    pub async fn execute(&self, session: &Session, name: ToolName, params: &Value) -> ToolOutcome {
        let outcome = match self.dispatch(session, name, params).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(
                    session_id = %session.id,
                    tool = %name,
                    error = %e,
                    "tool execution failed"
                );
                ToolOutcome::failure(e.to_string())
            }
        };
        tracing::debug!(
            session_id = %session.id,
            tool = %name,
            success = outcome.result.success,
            "tool executed"
        );
        outcome
    }

    async fn dispatch(
        &self,
        session: &Session,
        name: ToolName,
        params: &Value,
    ) -> Result<ToolOutcome> {
        match name {
            ToolName::SaveVisitorData => self.save_visitor_data(session, params),
            ToolName::LookupResidentByUnit => self.lookup_resident_by_unit(params),
            ToolName::CreateVisit => self.create_visit(session, params),
            ToolName::NotifyResident => self.notify_resident(session, params).await,
        }
    }

    // ── save_visitor_data ─────────────────────────────────────────

    fn save_visitor_data(&self, session: &Session, params: &Value) -> Result<ToolOutcome> {
        let args = SaveVisitorDataArgs::deserialize(params)
            .map_err(|e| Error::Validation(format!("invalid save_visitor_data arguments: {e}")))?;

        let fragment = VisitorData {
            visitor_name: args.visitor_name,
            visitor_rut: args.rut,
            visitor_phone: args.phone,
            vehicle_plate: args.plate,
            visit_reason: args.reason,
            destination_unit: args.destination_unit,
            resident_response: None,
        };

        let mut merged = session.collected.clone();
        merged.merge(&fragment);

        let mut outcome = ToolOutcome::success(serde_json::json!({
            "message": "visitor data saved",
            "saved": merged,
        }));
        outcome.collected = Some(fragment);
        Ok(outcome)
    }

    // ── lookup_resident_by_unit ───────────────────────────────────

    fn lookup_resident_by_unit(&self, params: &Value) -> Result<ToolOutcome> {
        let args = LookupResidentArgs::deserialize(params).map_err(|e| {
            Error::Validation(format!("invalid lookup_resident_by_unit arguments: {e}"))
        })?;

        let Some(unit) = self.directory.find_by_identifier(&args.unit_number) else {
            return Ok(ToolOutcome::failure("unit_not_found"));
        };
        if unit.residents.is_empty() {
            return Ok(ToolOutcome::failure("unit_has_no_residents"));
        }

        let residents: Vec<Value> = unit
            .residents
            .iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.id,
                    "name": r.name,
                    "phone": r.phone,
                })
            })
            .collect();

        Ok(ToolOutcome::success(serde_json::json!({
            "found": true,
            "unit": unit.identifier,
            "family_name": unit.family_name,
            "residents": residents,
            "resident_count": unit.residents.len(),
        })))
    }

    // ── create_visit ──────────────────────────────────────────────

    fn create_visit(&self, session: &Session, params: &Value) -> Result<ToolOutcome> {
        let args = CreateVisitArgs::deserialize(params)
            .map_err(|e| Error::Validation(format!("invalid create_visit arguments: {e}")))?;

        let Some(unit) = self.directory.find_by_identifier(&args.destination_unit) else {
            return Ok(ToolOutcome::failure("unit_not_found"));
        };

        let fragment = VisitorData {
            visitor_name: Some(args.visitor_name.clone()),
            visitor_rut: args.rut.clone(),
            vehicle_plate: args.plate.clone(),
            visit_reason: args.reason.clone(),
            destination_unit: Some(unit.identifier.clone()),
            ..Default::default()
        };

        // A session produces at most one visit; a repeat call reports
        // the existing record instead of duplicating it.
        if let Some(existing) = session.created_visit {
            let mut outcome = ToolOutcome::success(serde_json::json!({
                "visit_id": existing,
                "already_created": true,
            }));
            outcome.collected = Some(fragment);
            return Ok(outcome);
        }

        let placeholder_host = unit.residents.first().map(|r| r.id.clone());
        let visit = self.visits.create(NewVisit {
            visitor_name: args.visitor_name,
            visitor_rut: args.rut,
            visitor_phone: session.collected.visitor_phone.clone(),
            vehicle_plate: args.plate,
            reason: args.reason,
            unit_identifier: unit.identifier,
            host_id: placeholder_host,
        });

        let mut outcome = ToolOutcome::success(serde_json::json!({
            "visit_id": visit.id,
            "status": visit.status,
            "kind": visit.kind,
        }));
        outcome.collected = Some(fragment);
        outcome.created_visit = Some(visit.id);
        Ok(outcome)
    }

    // ── notify_resident ───────────────────────────────────────────

    async fn notify_resident(&self, session: &Session, params: &Value) -> Result<ToolOutcome> {
        let args = NotifyResidentArgs::deserialize(params)
            .map_err(|e| Error::Validation(format!("invalid notify_resident arguments: {e}")))?;

        let collected = &session.collected;
        if !collected.has_visit_minimum() {
            return Ok(ToolOutcome::failure(
                "missing visitor data: name and destination unit are required before notifying",
            ));
        }
        let destination = collected
            .destination_unit
            .as_deref()
            .unwrap_or_default()
            .to_owned();

        let Some((unit, resident)) = self.directory.find_resident(&args.resident_id) else {
            return Ok(ToolOutcome::failure("resident_not_found"));
        };
        if !self.directory.resident_in_unit(&destination, &resident.id) {
            return Ok(ToolOutcome::failure("resident_not_in_unit"));
        }

        // The visit exists before the resident is asked about it, so an
        // approval can check it in directly.
        let (visit_id, created_now) = match session.created_visit {
            Some(id) => (id, false),
            None => {
                let visit = self.visits.create(NewVisit {
                    visitor_name: collected.visitor_name.clone().unwrap_or_default(),
                    visitor_rut: collected.visitor_rut.clone(),
                    visitor_phone: collected.visitor_phone.clone(),
                    vehicle_plate: collected.vehicle_plate.clone(),
                    reason: collected.visit_reason.clone(),
                    unit_identifier: unit.identifier.clone(),
                    host_id: Some(resident.id.clone()),
                });
                (visit.id, true)
            }
        };

        let approval = match self.approvals.open(&session.id, &resident.id, Some(visit_id)) {
            Ok(approval) => approval,
            Err(Error::Validation(_)) => {
                return Ok(ToolOutcome::failure("approval_already_pending"));
            }
            Err(e) => return Err(e),
        };

        let visitor_name = collected.visitor_name.clone().unwrap_or_default();
        let message = args.message.unwrap_or_else(|| match &collected.vehicle_plate {
            Some(plate) => format!("{visitor_name} is waiting at the gate (plate {plate})"),
            None => format!("{visitor_name} is waiting at the gate"),
        });

        let mut notification =
            Notification::new(resident.id.clone(), "Visitor at the gate", message.clone());
        notification.requires_action = true;
        notification.session_id = Some(session.id.clone());
        notification.expires_at = Some(approval.expires_at);
        notification.data = serde_json::json!({
            "session_id": session.id,
            "visit_id": visit_id,
            "visitor": {
                "name": visitor_name,
                "rut": collected.visitor_rut,
                "phone": collected.visitor_phone,
                "plate": collected.vehicle_plate,
                "reason": collected.visit_reason,
            },
        });
        self.notifications.insert(notification).await;

        let mut outcome = ToolOutcome::success(serde_json::json!({
            "notified": true,
            "resident": resident.name,
            "visit_id": visit_id,
            "awaiting_approval": true,
            "expires_at": approval.expires_at,
            "message": message,
        }));
        if created_now {
            outcome.created_visit = Some(visit_id);
        }
        outcome.awaiting_approval = true;
        Ok(outcome)
    }
}
