//! End-to-end exercises of the concierge session lifecycle against
//! in-memory stores and a stub credential issuer.

use std::sync::Arc;

use porter_concierge::{ConciergeService, FinalStatus, StartSessionRequest};
use porter_directory::{
    NotificationStore, Resident, Unit, UnitDirectory, VisitStatus, VisitStore,
};
use porter_domain::config::ConciergeConfig;
use porter_domain::error::Error;
use porter_domain::tool::{ToolCall, ToolName};
use porter_hub_protocol::{AccessKind, HubMessage};
use porter_realtime::{CredentialIssuer, EphemeralCredential};

// ── Fixtures ───────────────────────────────────────────────────────

struct StaticIssuer;

#[async_trait::async_trait]
impl CredentialIssuer for StaticIssuer {
    async fn issue(&self, _session_id: &str) -> porter_domain::Result<EphemeralCredential> {
        Ok(EphemeralCredential {
            token: "ek_test".into(),
            expires_at: chrono::Utc::now() + chrono::Duration::seconds(60),
        })
    }

    fn provider_id(&self) -> &str {
        "static-test"
    }
}

struct FailingIssuer;

#[async_trait::async_trait]
impl CredentialIssuer for FailingIssuer {
    async fn issue(&self, _session_id: &str) -> porter_domain::Result<EphemeralCredential> {
        Err(Error::ServiceUnavailable("provider unreachable".into()))
    }

    fn provider_id(&self) -> &str {
        "failing-test"
    }
}

struct Fixture {
    _tmp: tempfile::TempDir,
    service: ConciergeService,
    visits: Arc<VisitStore>,
    notifications: Arc<NotificationStore>,
}

fn sample_directory() -> UnitDirectory {
    UnitDirectory::from_units(vec![
        Unit {
            id: "u-303".into(),
            identifier: "303".into(),
            family_name: Some("Pérez".into()),
            residents: vec![
                Resident {
                    id: "R1".into(),
                    name: "María Pérez".into(),
                    phone: Some("+56911111111".into()),
                },
                Resident {
                    id: "R2".into(),
                    name: "Jorge Pérez".into(),
                    phone: None,
                },
            ],
        },
        Unit {
            id: "u-15".into(),
            identifier: "Casa 15".into(),
            family_name: None,
            residents: vec![Resident {
                id: "R9".into(),
                name: "Carla Soto".into(),
                phone: None,
            }],
        },
    ])
}

fn fixture_with(cfg: ConciergeConfig, issuer: Arc<dyn CredentialIssuer>) -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let visits = Arc::new(VisitStore::new(tmp.path()).unwrap());
    let notifications = Arc::new(NotificationStore::new(tmp.path()));
    let service = ConciergeService::new(
        cfg,
        Arc::new(sample_directory()),
        Arc::clone(&visits),
        Arc::clone(&notifications),
        issuer,
    );
    Fixture {
        _tmp: tmp,
        service,
        visits,
        notifications,
    }
}

fn fixture() -> Fixture {
    fixture_with(ConciergeConfig::default(), Arc::new(StaticIssuer))
}

fn call(tool_name: &str, parameters: serde_json::Value) -> ToolCall {
    ToolCall {
        tool_name: tool_name.into(),
        parameters,
    }
}

async fn started(f: &Fixture) -> String {
    f.service
        .start_session(StartSessionRequest::default())
        .await
        .unwrap()
        .session_id
}

// ── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_session_is_not_found() {
    let f = fixture();
    let err = f
        .service
        .execute_tool("no-such-session", &call("create_visit", serde_json::json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let err = f
        .service
        .respond_to_visitor("no-such-session", true, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn start_session_returns_credential() {
    let f = fixture();
    let resp = f
        .service
        .start_session(StartSessionRequest::default())
        .await
        .unwrap();
    assert_eq!(resp.ephemeral_token, "ek_test");
    assert!(resp.expires_at > chrono::Utc::now());

    let status = f.service.is_session_active(&resp.session_id).await.unwrap();
    assert!(status.active);
}

#[tokio::test]
async fn failed_issuer_leaves_no_session_behind() {
    let f = fixture_with(ConciergeConfig::default(), Arc::new(FailingIssuer));
    let err = f
        .service
        .start_session(StartSessionRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ServiceUnavailable(_)));

    let status = f
        .service
        .is_session_active("0000aaaa0000aaaa0000aaaa0000aaaa")
        .await
        .unwrap();
    assert!(!status.active);
    assert_eq!(status.reason.as_deref(), Some("not_found"));
}

#[tokio::test]
async fn end_session_is_idempotent() {
    let f = fixture();
    let id = started(&f).await;

    let first = f.service.end_session(&id, None).await.unwrap();
    assert_eq!(first.status, FinalStatus::Completed);
    assert!(first.duration_seconds >= 0);

    let second = f.service.end_session(&id, Some(FinalStatus::Cancelled)).await.unwrap();
    assert_eq!(second.duration_seconds, first.duration_seconds);
    assert_eq!(second.status, first.status);
    assert!(!second.visit_created);
}

#[tokio::test]
async fn ended_session_rejects_every_tool() {
    let f = fixture();
    let id = started(&f).await;
    f.service.end_session(&id, None).await.unwrap();

    for name in ToolName::ALL {
        let err = f
            .service
            .execute_tool(&id, &call(name.as_str(), serde_json::json!({})))
            .await
            .unwrap_err();
        assert!(
            matches!(err, Error::TerminalSession(_)),
            "{name} must be rejected on an ended session"
        );
    }

    // A stale resident response is rejected too.
    let err = f.service.respond_to_visitor(&id, true, None).await.unwrap_err();
    assert!(matches!(err, Error::TerminalSession(_)));
}

#[tokio::test]
async fn unknown_tool_keeps_session_alive() {
    let f = fixture();
    let id = started(&f).await;

    let result = f
        .service
        .execute_tool(&id, &call("nonexistent_tool", serde_json::json!({})))
        .await
        .unwrap();
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("unknown tool: nonexistent_tool"));

    let status = f.service.is_session_active(&id).await.unwrap();
    assert!(status.active);
}

#[tokio::test]
async fn happy_path_approval_flow() {
    let f = fixture();
    let id = started(&f).await;
    let mut hub_rx = f.service.hub().subscribe();

    let created = f
        .service
        .execute_tool(
            &id,
            &call(
                "create_visit",
                serde_json::json!({
                    "visitor_name": "Ana Pérez",
                    "destination_unit": "303",
                }),
            ),
        )
        .await
        .unwrap();
    assert!(created.success, "create_visit failed: {:?}", created.error);

    let notified = f
        .service
        .execute_tool(
            &id,
            &call(
                "notify_resident",
                serde_json::json!({
                    "resident_id": "R1",
                    "message": "Ana espera en portería",
                }),
            ),
        )
        .await
        .unwrap();
    assert!(notified.success, "notify_resident failed: {:?}", notified.error);
    let data = notified.data.unwrap();
    assert_eq!(data["awaiting_approval"], true);

    // The notification exists, actionable, tied to the session.
    let (items, _) = f.notifications.list(Some("R1"), 10, 0).await;
    assert_eq!(items.len(), 1);
    assert!(items[0].requires_action);
    assert_eq!(items[0].session_id.as_deref(), Some(id.as_str()));

    let outcome = f
        .service
        .respond_to_visitor(&id, true, Some("R1".into()))
        .await
        .unwrap();
    assert!(outcome.success);

    // Hub observed the response and the door command.
    match hub_rx.recv().await.unwrap() {
        HubMessage::VisitorResponse { approved, .. } => assert!(approved),
        other => panic!("expected visitor_response, got {other:?}"),
    }
    match hub_rx.recv().await.unwrap() {
        HubMessage::DoorOpen { access, .. } => assert_eq!(access, AccessKind::Pedestrian),
        other => panic!("expected door_open, got {other:?}"),
    }

    let ended = f.service.end_session(&id, None).await.unwrap();
    assert_eq!(ended.status, FinalStatus::Completed);
    assert!(ended.visit_created);
    assert!(ended.duration_seconds >= 0);

    // The visit was checked in and rehomed to the approving resident.
    let session = f.service.session(&id).unwrap();
    let visit = f.visits.get(&session.created_visit.unwrap()).unwrap();
    assert_eq!(visit.status, VisitStatus::Active);
    assert_eq!(visit.used_count, 1);
    assert_eq!(visit.host_id.as_deref(), Some("R1"));
    assert_eq!(session.collected.resident_response.as_deref(), Some("approved"));
}

#[tokio::test]
async fn first_resolution_wins() {
    let f = fixture();
    let id = started(&f).await;

    f.service
        .execute_tool(
            &id,
            &call(
                "save_visitor_data",
                serde_json::json!({ "visitor_name": "Luis", "destination_unit": "303" }),
            ),
        )
        .await
        .unwrap();
    let notified = f
        .service
        .execute_tool(
            &id,
            &call("notify_resident", serde_json::json!({ "resident_id": "R1" })),
        )
        .await
        .unwrap();
    assert!(notified.success);

    let deny = f
        .service
        .respond_to_visitor(&id, false, Some("R1".into()))
        .await
        .unwrap();
    assert_eq!(deny.message, "visit denied");

    // The competing approval is a no-op reporting the recorded denial.
    let approve = f
        .service
        .respond_to_visitor(&id, true, Some("R2".into()))
        .await
        .unwrap();
    assert!(approve.success);
    assert!(approve.message.contains("denied"));

    let session = f.service.session(&id).unwrap();
    let visit = f.visits.get(&session.created_visit.unwrap()).unwrap();
    assert_eq!(visit.status, VisitStatus::Denied);
}

#[tokio::test]
async fn second_notify_while_approval_open_fails() {
    let f = fixture();
    let id = started(&f).await;

    f.service
        .execute_tool(
            &id,
            &call(
                "save_visitor_data",
                serde_json::json!({ "visitor_name": "Luis", "destination_unit": "303" }),
            ),
        )
        .await
        .unwrap();
    f.service
        .execute_tool(
            &id,
            &call("notify_resident", serde_json::json!({ "resident_id": "R1" })),
        )
        .await
        .unwrap();

    let again = f
        .service
        .execute_tool(
            &id,
            &call("notify_resident", serde_json::json!({ "resident_id": "R2" })),
        )
        .await
        .unwrap();
    assert!(!again.success);
    assert_eq!(again.error.as_deref(), Some("approval_already_pending"));
}

#[tokio::test]
async fn expired_approval_is_treated_as_denied() {
    let cfg = ConciergeConfig {
        approval_timeout_minutes: 0,
        ..Default::default()
    };
    let f = fixture_with(cfg, Arc::new(StaticIssuer));
    let id = started(&f).await;

    f.service
        .execute_tool(
            &id,
            &call(
                "save_visitor_data",
                serde_json::json!({ "visitor_name": "Luis", "destination_unit": "303" }),
            ),
        )
        .await
        .unwrap();
    f.service
        .execute_tool(
            &id,
            &call("notify_resident", serde_json::json!({ "resident_id": "R1" })),
        )
        .await
        .unwrap();

    // No explicit write happened, yet the approval already counts as
    // denied: the late approval is a no-op.
    let outcome = f
        .service
        .respond_to_visitor(&id, true, Some("R1".into()))
        .await
        .unwrap();
    assert!(outcome.success);
    assert!(outcome.message.contains("denied"));

    // The arrival notification closed with the expiry reason.
    let (items, _) = f.notifications.list(Some("R1"), 10, 0).await;
    assert!(items[0].action_taken);
    assert_eq!(items[0].approved, Some(false));
    assert_eq!(items[0].action_reason.as_deref(), Some("approval_timeout"));

    // The session itself is still usable.
    let status = f.service.is_session_active(&id).await.unwrap();
    assert!(status.active);
}

#[tokio::test]
async fn respond_without_approval_is_not_found() {
    let f = fixture();
    let id = started(&f).await;
    let err = f
        .service
        .respond_to_visitor(&id, true, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn stale_session_expires_as_timeout() {
    let cfg = ConciergeConfig {
        session_max_minutes: 0,
        ..Default::default()
    };
    let f = fixture_with(cfg, Arc::new(StaticIssuer));
    let id = started(&f).await;

    // Any age above zero minutes is stale.
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    let status = f.service.is_session_active(&id).await.unwrap();
    assert!(!status.active);
    assert_eq!(status.reason.as_deref(), Some("expired"));

    let err = f
        .service
        .execute_tool(&id, &call("save_visitor_data", serde_json::json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TerminalSession(_)));

    // Explicit end after the timeout returns the memoized summary.
    let ended = f.service.end_session(&id, None).await.unwrap();
    assert_eq!(ended.status, FinalStatus::Timeout);
    assert!(!ended.visit_created);
}

#[tokio::test]
async fn collected_data_survives_unrelated_tool_calls() {
    let f = fixture();
    let id = started(&f).await;

    f.service
        .execute_tool(
            &id,
            &call(
                "save_visitor_data",
                serde_json::json!({
                    "visitor_name": "Ana Pérez",
                    "rut": "12.345.678-9",
                    "destination_unit": "303",
                }),
            ),
        )
        .await
        .unwrap();

    // Unrelated lookup in between must not disturb collected data.
    let lookup = f
        .service
        .execute_tool(
            &id,
            &call("lookup_resident_by_unit", serde_json::json!({ "unit_number": "casa 15" })),
        )
        .await
        .unwrap();
    assert!(lookup.success);

    let ended = f.service.end_session(&id, None).await.unwrap();
    assert!(ended.visit_created, "end must flush the collected visit");

    let session = f.service.session(&id).unwrap();
    assert_eq!(session.collected.visitor_name.as_deref(), Some("Ana Pérez"));
    assert_eq!(session.collected.visitor_rut.as_deref(), Some("12.345.678-9"));
    assert_eq!(session.collected.destination_unit.as_deref(), Some("303"));

    let visit = f.visits.get(&session.created_visit.unwrap()).unwrap();
    assert_eq!(visit.visitor_name, "Ana Pérez");
    assert_eq!(visit.visitor_rut.as_deref(), Some("12.345.678-9"));
    assert_eq!(visit.unit_identifier, "303");
}

#[tokio::test]
async fn ending_with_open_approval_denies_it() {
    let f = fixture();
    let id = started(&f).await;

    f.service
        .execute_tool(
            &id,
            &call(
                "save_visitor_data",
                serde_json::json!({ "visitor_name": "Luis", "destination_unit": "303" }),
            ),
        )
        .await
        .unwrap();
    f.service
        .execute_tool(
            &id,
            &call("notify_resident", serde_json::json!({ "resident_id": "R1" })),
        )
        .await
        .unwrap();

    f.service.end_session(&id, None).await.unwrap();

    // The arrival notification closed as a session-end denial.
    let (items, _) = f.notifications.list(Some("R1"), 10, 0).await;
    assert!(items[0].action_taken);
    assert_eq!(items[0].approved, Some(false));
    assert_eq!(items[0].action_reason.as_deref(), Some("session_ended"));

    // And the stale approval afterwards is rejected.
    let err = f.service.respond_to_visitor(&id, true, Some("R1".into())).await.unwrap_err();
    assert!(matches!(err, Error::TerminalSession(_)));
}

#[tokio::test]
async fn sweep_times_out_stale_sessions() {
    let cfg = ConciergeConfig {
        session_max_minutes: 0,
        ..Default::default()
    };
    let f = fixture_with(cfg, Arc::new(StaticIssuer));
    let id = started(&f).await;

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    f.service.sweep(chrono::Utc::now()).await;

    let session = f.service.session(&id).unwrap();
    assert!(session.is_ended());
    assert_eq!(session.final_status, Some(FinalStatus::Timeout));
}
