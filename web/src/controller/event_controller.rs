use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::controller::ApiResponse;
use crate::extractors::caller::Caller;
use crate::{AppState, Error};
use domain::publish::{self as PublishApi, PublishRequest};
use log::*;

/// POST publish an event on behalf of the CRUD layer
pub async fn create(
    caller: Caller,
    State(app_state): State<AppState>,
    Json(request): Json<PublishRequest>,
) -> Result<impl IntoResponse, Error> {
    debug!(
        "POST Publish on {}:{} by {}",
        request.topic_kind, request.scope_id, caller.id
    );

    let id = PublishApi::publish(&app_state.bus, caller.role, request).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::new(StatusCode::ACCEPTED.into(), json!({"id": id}))),
    ))
}
