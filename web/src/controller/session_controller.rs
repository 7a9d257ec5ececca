use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::controller::ApiResponse;
use crate::extractors::caller::Caller;
use crate::{AppState, Error};
use domain::error::{DomainErrorKind, Error as DomainError, InternalErrorKind, SessionErrorKind};
use domain::{Filter, SessionId, TopicKind};
use log::*;

#[derive(Debug, Deserialize)]
pub struct SubscriptionParams {
    pub topic_kind: TopicKind,
    /// On subscribe, narrows the subscription. On unsubscribe, removes only
    /// the subscription with this exact filter; omit to remove all on the kind.
    #[serde(default)]
    pub filter: Option<Filter>,
}

/// Sessions are only visible to their owner. Anyone else gets the same
/// answer as for a session that does not exist.
fn owned_session(app_state: &AppState, caller: &Caller, id: String) -> Result<SessionId, Error> {
    let session_id = SessionId::from(id);
    if is_owner(app_state, caller, &session_id) {
        Ok(session_id)
    } else {
        Err(DomainError {
            source: Some(format!("No session {session_id} for {}", caller.id).into()),
            error_kind: DomainErrorKind::Internal(InternalErrorKind::Session(
                SessionErrorKind::NotFound,
            )),
        }
        .into())
    }
}

fn is_owner(app_state: &AppState, caller: &Caller, session_id: &SessionId) -> bool {
    app_state
        .sessions
        .session_info(session_id)
        .is_some_and(|info| info.owner_id == caller.id)
}

/// POST add a subscription to a live session
pub async fn subscribe(
    caller: Caller,
    State(app_state): State<AppState>,
    Path(id): Path<String>,
    Json(params): Json<SubscriptionParams>,
) -> Result<impl IntoResponse, Error> {
    let session_id = owned_session(&app_state, &caller, id)?;
    debug!("POST Subscribe session {} to {}", session_id, params.topic_kind);

    let subscription = app_state.sessions.subscribe(
        &session_id,
        params.topic_kind,
        params.filter.unwrap_or_default(),
    )?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(StatusCode::CREATED.into(), subscription)),
    ))
}

/// DELETE remove subscriptions from a live session
pub async fn unsubscribe(
    caller: Caller,
    State(app_state): State<AppState>,
    Path(id): Path<String>,
    Json(params): Json<SubscriptionParams>,
) -> Result<impl IntoResponse, Error> {
    let session_id = owned_session(&app_state, &caller, id)?;
    debug!(
        "DELETE Unsubscribe session {} from {}",
        session_id, params.topic_kind
    );

    let removed =
        app_state
            .sessions
            .unsubscribe(&session_id, params.topic_kind, params.filter.as_ref())?;

    Ok(Json(ApiResponse::new(
        StatusCode::OK.into(),
        serde_json::json!({ "removed": removed }),
    )))
}

/// POST keep a session from being reclaimed as idle
pub async fn heartbeat(
    caller: Caller,
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, Error> {
    let session_id = owned_session(&app_state, &caller, id)?;
    trace!("POST Heartbeat for session {}", session_id);

    app_state.sessions.touch(&session_id)?;

    Ok(Json(ApiResponse::<()>::no_content(StatusCode::NO_CONTENT.into())))
}

/// DELETE close a live session; its stream ends immediately.
///
/// Closing is idempotent: an already closed, unknown or foreign session gets
/// the same answer and is left untouched.
pub async fn delete(
    caller: Caller,
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, Error> {
    let session_id = SessionId::from(id);
    debug!("DELETE Session {}", session_id);

    if is_owner(&app_state, &caller, &session_id) {
        app_state.sessions.close_session(&session_id);
    }

    Ok(Json(ApiResponse::<()>::no_content(StatusCode::NO_CONTENT.into())))
}
