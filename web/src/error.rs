use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use domain::error::{
    DomainErrorKind, Error as DomainError, ExternalErrorKind, InternalErrorKind, SessionErrorKind,
};

extern crate log;
use log::*;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error(DomainError);

impl StdError for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        write!(fmt, "{}", self.0)
    }
}

// List of possible StatusCode variants https://docs.rs/http/latest/http/status/struct.StatusCode.html
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self.0.error_kind {
            DomainErrorKind::Internal(internal_error_kind) => match internal_error_kind {
                InternalErrorKind::Session(SessionErrorKind::NotFound) => {
                    (StatusCode::NOT_FOUND, "NOT FOUND").into_response()
                }
                InternalErrorKind::Session(SessionErrorKind::CapacityExceeded) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({"reason": "capacity_exceeded"})),
                )
                    .into_response(),
                InternalErrorKind::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN").into_response(),
                InternalErrorKind::Invalid => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "UNPROCESSABLE ENTITY").into_response()
                }
                InternalErrorKind::Other(message) => {
                    error!("Internal error: {}", message);
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL SERVER ERROR").into_response()
                }
            },
            DomainErrorKind::External(external_error_kind) => match external_error_kind {
                ExternalErrorKind::ServiceUnavailable => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({"reason": "service_unavailable"})),
                )
                    .into_response(),
                ExternalErrorKind::Other(message) => {
                    warn!("External error: {}", message);
                    (StatusCode::BAD_GATEWAY, "BAD GATEWAY").into_response()
                }
            },
        }
    }
}

impl<E> From<E> for Error
where
    E: Into<DomainError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
