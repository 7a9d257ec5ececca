use crate::extractors::RejectionType;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use domain::Role;
use log::*;

pub(crate) const USER_ID_HEADER: &str = "x-user-id";
pub(crate) const USER_ROLE_HEADER: &str = "x-user-role";

/// The authenticated caller, as asserted by the upstream authentication layer.
pub(crate) struct Caller {
    pub id: String,
    pub role: Role,
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = RejectionType;

    // A request without a user id never got past authentication. A missing
    // role header means the least privileged role.
    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()))?
            .to_string();

        let role = match parts.headers.get(USER_ROLE_HEADER) {
            None => Role::default(),
            Some(value) => value
                .to_str()
                .ok()
                .and_then(|role| role.parse::<Role>().ok())
                .ok_or_else(|| {
                    warn!("Rejecting request from {} with unknown role header", id);
                    (StatusCode::BAD_REQUEST, "Unknown role".to_string())
                })?,
        };

        Ok(Caller { id, role })
    }
}
