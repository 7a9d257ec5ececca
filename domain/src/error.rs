//! Error types for the `domain` layer.
use std::error::Error as StdError;
use std::fmt;

use credential::error::{ErrorKind as CredentialErrorKind, StoreErrorKind};
use events::error::{ErrorKind as EventsErrorKind, MediumErrorKind};
use sse::ErrorKind as SseErrorKind;

/// Top-level domain error type.
/// Errors in the Domain layer are modeled as a tree with `domain::error::Error`
/// as the root holding an `error_kind` enum tree. Lower layers (`credential`,
/// `events`, `sse`) are translated here so `web` depends only on `domain` to
/// pick HTTP status codes.
///
/// Rejected credentials are not errors; they arrive as a failed
/// [`crate::scan::ScanOutcome`].
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: DomainErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum DomainErrorKind {
    Internal(InternalErrorKind),
    External(ExternalErrorKind),
}

#[derive(Debug, PartialEq)]
pub enum InternalErrorKind {
    Session(SessionErrorKind),
    /// The caller's role lacks the required capability.
    Forbidden,
    /// The request cannot be acted on as given.
    Invalid,
    Other(String),
}

#[derive(Debug, PartialEq)]
pub enum SessionErrorKind {
    CapacityExceeded,
    NotFound,
}

#[derive(Debug, PartialEq)]
pub enum ExternalErrorKind {
    /// The shared store or event medium could not be reached.
    ServiceUnavailable,
    Other(String),
}

impl Error {
    pub fn forbidden(message: impl Into<String>) -> Self {
        Error {
            source: Some(message.into().into()),
            error_kind: DomainErrorKind::Internal(InternalErrorKind::Forbidden),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Error {
            source: Some(message.into().into()),
            error_kind: DomainErrorKind::Internal(InternalErrorKind::Invalid),
        }
    }

    pub fn is_forbidden(&self) -> bool {
        self.error_kind == DomainErrorKind::Internal(InternalErrorKind::Forbidden)
    }

    pub fn is_service_unavailable(&self) -> bool {
        self.error_kind == DomainErrorKind::External(ExternalErrorKind::ServiceUnavailable)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "Domain Error ({:?}): {}", self.error_kind, source),
            None => write!(f, "Domain Error: {:?}", self.error_kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

// This is where we translate errors from the `credential` layer to the `domain` layer.
impl From<credential::Error> for Error {
    fn from(err: credential::Error) -> Self {
        let error_kind = match &err.error_kind {
            CredentialErrorKind::Store(StoreErrorKind::Unavailable) => {
                DomainErrorKind::External(ExternalErrorKind::ServiceUnavailable)
            }
            CredentialErrorKind::Store(kind) => {
                DomainErrorKind::External(ExternalErrorKind::Other(format!("store: {kind:?}")))
            }
            CredentialErrorKind::Encoding | CredentialErrorKind::Signing => {
                DomainErrorKind::Internal(InternalErrorKind::Other(err.to_string()))
            }
        };
        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

impl From<events::Error> for Error {
    fn from(err: events::Error) -> Self {
        let error_kind = match &err.error_kind {
            EventsErrorKind::Medium(MediumErrorKind::Unavailable) => {
                DomainErrorKind::External(ExternalErrorKind::ServiceUnavailable)
            }
            EventsErrorKind::Medium(MediumErrorKind::Command) => {
                DomainErrorKind::External(ExternalErrorKind::Other(err.to_string()))
            }
            EventsErrorKind::Serialization | EventsErrorKind::Handler => {
                DomainErrorKind::Internal(InternalErrorKind::Other(err.to_string()))
            }
        };
        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

impl From<sse::Error> for Error {
    fn from(err: sse::Error) -> Self {
        let session_error_kind = match &err.error_kind {
            SseErrorKind::CapacityExceeded => SessionErrorKind::CapacityExceeded,
            SseErrorKind::SessionNotFound => SessionErrorKind::NotFound,
        };
        Error {
            source: Some(Box::new(err)),
            error_kind: DomainErrorKind::Internal(InternalErrorKind::Session(session_error_kind)),
        }
    }
}
