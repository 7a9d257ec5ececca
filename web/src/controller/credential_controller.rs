use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::controller::ApiResponse;
use crate::extractors::caller::Caller;
use crate::{AppState, Error};
use domain::credentials::{self as CredentialApi, RevokeTarget};
use domain::error::Error as DomainError;
use log::*;

#[derive(Debug, Deserialize)]
pub struct RevokeParams {
    pub signature: Option<String>,
    pub credential: Option<String>,
    pub reason: String,
}

impl RevokeParams {
    fn target(self) -> Result<(RevokeTarget, String), Error> {
        match (self.signature, self.credential) {
            (Some(signature), None) => Ok((RevokeTarget::Signature(signature), self.reason)),
            (None, Some(credential)) => Ok((RevokeTarget::Credential(credential), self.reason)),
            _ => Err(DomainError::invalid("give exactly one of signature or credential").into()),
        }
    }
}

/// POST issue a credential for the caller
pub async fn create(
    caller: Caller,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, Error> {
    debug!("POST Issue credential for {}", caller.id);

    let issued = CredentialApi::issue(&app_state.credentials, &caller.id).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(StatusCode::CREATED.into(), issued)),
    ))
}

/// POST revoke a credential by signature or by its encoded form
pub async fn revoke(
    caller: Caller,
    State(app_state): State<AppState>,
    Json(params): Json<RevokeParams>,
) -> Result<impl IntoResponse, Error> {
    let (target, reason) = params.target()?;
    debug!("POST Revoke credential by {}: {}", caller.id, reason);

    CredentialApi::revoke(&app_state.credentials, caller.role, target, &reason).await?;

    Ok(Json(ApiResponse::<()>::no_content(StatusCode::NO_CONTENT.into())))
}

/// POST rotate a subject's secret, invalidating every credential issued under it
pub async fn rotate(
    caller: Caller,
    State(app_state): State<AppState>,
    Path(subject_id): Path<String>,
) -> Result<impl IntoResponse, Error> {
    debug!("POST Rotate secret of {} by {}", subject_id, caller.id);

    CredentialApi::rotate_secret(&app_state.credentials, &caller.id, caller.role, &subject_id)
        .await?;

    Ok(Json(ApiResponse::<()>::no_content(StatusCode::NO_CONTENT.into())))
}
