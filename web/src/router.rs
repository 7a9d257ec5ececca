use crate::{controller::health_check_controller, sse, AppState};
use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::controller::{
    credential_controller, event_controller, scan_controller, session_controller,
};

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(health_routes(app_state.clone()))
        .merge(credential_routes(app_state.clone()))
        .merge(scan_routes(app_state.clone()))
        .merge(event_routes(app_state.clone()))
        .merge(session_routes(app_state))
}

fn health_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check_controller::health_check))
        .with_state(app_state)
}

fn credential_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/credentials", post(credential_controller::create))
        .route("/credentials/revoke", post(credential_controller::revoke))
        .route(
            "/subjects/:subject_id/rotate",
            post(credential_controller::rotate),
        )
        .with_state(app_state)
}

fn scan_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/scans", post(scan_controller::create))
        .with_state(app_state)
}

fn event_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/events", post(event_controller::create))
        .with_state(app_state)
}

fn session_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/sessions/stream", get(sse::handler::sse_handler))
        .route(
            "/sessions/:id/subscriptions",
            post(session_controller::subscribe).delete(session_controller::unsubscribe),
        )
        .route("/sessions/:id/heartbeat", post(session_controller::heartbeat))
        .route("/sessions/:id", delete(session_controller::delete))
        .with_state(app_state)
}
