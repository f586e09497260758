pub mod auth;
pub mod concierge;
pub mod hubs;
pub mod notifications;
pub mod units;
pub mod visits;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;

use porter_domain::error::Error;

use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Router
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Build the full API router.
///
/// Routes are split into **public** (health, and the hub WS which
/// carries its own token) and **protected** (gated behind the
/// `PORTER_API_TOKEN` bearer middleware).
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/v1/health", get(health))
        .route("/v1/hub/ws", get(crate::hub::ws::hub_ws));

    let protected = Router::new()
        // Concierge sessions
        .route("/v1/concierge/session/start", post(concierge::start_session))
        .route(
            "/v1/concierge/context/:house_number",
            post(concierge::house_context),
        )
        .route(
            "/v1/concierge/session/:session_id/execute-tool",
            post(concierge::execute_tool),
        )
        .route(
            "/v1/concierge/session/:session_id/end",
            post(concierge::end_session),
        )
        .route(
            "/v1/concierge/session/:session_id/status",
            post(concierge::session_status),
        )
        .route(
            "/v1/concierge/session/:session_id/respond",
            post(concierge::respond),
        )
        // Visits
        .route("/v1/visits", get(visits::list_visits))
        .route("/v1/visits/:id", get(visits::get_visit))
        .route("/v1/visits/:id/check-in", post(visits::check_in))
        .route("/v1/visits/:id/status", post(visits::update_status))
        // Units
        .route("/v1/units", get(units::list_units))
        .route("/v1/units/:identifier", get(units::get_unit))
        // Notifications
        .route("/v1/notifications", get(notifications::list_notifications))
        .route(
            "/v1/notifications/:id/read",
            post(notifications::mark_read),
        )
        .route(
            "/v1/notifications/events",
            get(notifications::notification_events_sse),
        )
        // Hubs (introspection)
        .route("/v1/hubs", get(hubs::list_hubs))
        // Apply API auth middleware to all protected routes.
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public.merge(protected)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error mapping
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Wrapper carrying a domain error out of a handler; `IntoResponse`
/// maps the taxonomy to a status code with an `{ "error": … }` body.
pub struct ApiError(pub Error);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::TerminalSession(_) => StatusCode::CONFLICT,
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (
            status,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_expected_statuses() {
        assert_eq!(
            status_for(&Error::NotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&Error::TerminalSession("x".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&Error::Validation("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&Error::ServiceUnavailable("x".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&Error::Other("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
