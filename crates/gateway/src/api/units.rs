//! Unit directory endpoints (read-only).

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/units
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_units(State(state): State<AppState>) -> impl IntoResponse {
    let units = state.directory.list();
    Json(serde_json::json!({
        "units": units,
        "count": units.len(),
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/units/:identifier
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Flexible lookup: "303", "Casa 303", "depto a-1234" all resolve.
pub async fn get_unit(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> impl IntoResponse {
    match state.directory.find_by_identifier(&identifier) {
        Some(unit) => Json(serde_json::json!({ "unit": unit })).into_response(),
        None => (
            axum::http::StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "unit not found" })),
        )
            .into_response(),
    }
}
