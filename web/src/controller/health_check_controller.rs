use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::AppState;

/// GET liveness. Always 200: a lost event medium only degrades real-time
/// delivery, so it is reported rather than failing the check.
/// Credential counters cover this instance since it started.
pub async fn health_check(State(app_state): State<AppState>) -> impl IntoResponse {
    let stats = app_state.credentials.stats();
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "event_bus": if app_state.bus.is_healthy() { "up" } else { "degraded" },
            "sessions": app_state.sessions.session_count(),
            "credentials": {
                "issued": stats.issued(),
                "accepted": stats.accepted(),
                "rejected": stats.rejected(),
            },
        })),
    )
}
