use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use crate::controller::ApiResponse;
use crate::extractors::caller::Caller;
use crate::{AppState, Error};
use domain::ScanRequest;
use log::*;

#[derive(Debug, Deserialize)]
pub struct ScanParams {
    pub credential: String,
    pub activity_id: String,
    #[serde(default)]
    pub force_register: bool,
    #[serde(default)]
    pub client_meta: Value,
}

/// POST scan a presented credential at an activity
///
/// Rejected credentials are a normal 200 response carrying a non-revealing
/// reason. Only an undecidable scan (store unreachable) is a 503.
pub async fn create(
    caller: Caller,
    State(app_state): State<AppState>,
    Json(params): Json<ScanParams>,
) -> Result<impl IntoResponse, Error> {
    debug!(
        "POST Scan at activity {} by scanner {}",
        params.activity_id, caller.id
    );

    let outcome = app_state
        .scans
        .scan(ScanRequest {
            raw_credential: params.credential,
            activity_id: params.activity_id,
            scanner_id: caller.id,
            scanner_role: caller.role,
            force_register: params.force_register,
            client_meta: params.client_meta,
        })
        .await?;

    Ok(Json(ApiResponse::new(StatusCode::OK.into(), outcome.receipt())))
}
