//! Hub registry introspection.

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/hubs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_hubs(State(state): State<AppState>) -> impl IntoResponse {
    let hubs = state.hubs.list();
    Json(serde_json::json!({
        "hubs": hubs,
        "count": hubs.len(),
    }))
}
