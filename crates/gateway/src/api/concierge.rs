//! Digital-concierge session endpoints.
//!
//! The kiosk/web client starts and ends sessions; the realtime model
//! provider calls back into `execute-tool`; the resident app answers
//! through `respond`. Tool-level failures ride inside a 200 response;
//! only session-level problems (unknown id, terminal state, issuer
//! down) surface as HTTP errors.

use axum::extract::{Path, State};
use axum::response::Json;
use serde::Deserialize;

use porter_concierge::{FinalStatus, StartSessionRequest};
use porter_domain::tool::{ToolCall, ToolResult};

use crate::api::ApiResult;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/concierge/session/start
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn start_session(
    State(state): State<AppState>,
    Json(body): Json<StartSessionRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let resp = state.concierge.start_session(body).await?;
    Ok(Json(serde_json::json!({
        "session_id": resp.session_id,
        "ephemeral_token": resp.ephemeral_token,
        "expires_at": resp.expires_at,
    })))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/concierge/context/:house_number
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn house_context(
    State(state): State<AppState>,
    Path(house_number): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let context = state.concierge.house_context(&house_number)?;
    Ok(Json(serde_json::json!({ "context": context })))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/concierge/session/:id/execute-tool
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn execute_tool(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(call): Json<ToolCall>,
) -> ApiResult<Json<ToolResult>> {
    tracing::debug!(session_id = %session_id, tool = %call.tool_name, "execute-tool request");
    let result = state.concierge.execute_tool(&session_id, &call).await?;
    Ok(Json(result))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/concierge/session/:id/end
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Default, Deserialize)]
pub struct EndSessionBody {
    #[serde(default)]
    pub final_status: Option<FinalStatus>,
}

pub async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Option<Json<EndSessionBody>>,
) -> ApiResult<Json<serde_json::Value>> {
    let final_status = body.and_then(|Json(b)| b.final_status);
    let resp = state.concierge.end_session(&session_id, final_status).await?;
    Ok(Json(serde_json::json!({
        "session_id": resp.session_id,
        "status": resp.status,
        "duration_seconds": resp.duration_seconds,
        "visit_created": resp.visit_created,
    })))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/concierge/session/:id/status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let status = state.concierge.is_session_active(&session_id).await?;
    Ok(Json(serde_json::json!(status)))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/concierge/session/:id/respond
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct RespondBody {
    pub approved: bool,
    #[serde(default)]
    pub resident_id: Option<String>,
}

pub async fn respond(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<RespondBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let outcome = state
        .concierge
        .respond_to_visitor(&session_id, body.approved, body.resident_id)
        .await?;
    Ok(Json(serde_json::json!(outcome)))
}
