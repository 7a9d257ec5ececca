//! Error types for the `sse` crate.
//!
//! Eviction and idle reclamation are normal outcomes, not errors. Only a
//! refused admission or an operation on a session that no longer exists is
//! reported here.

use std::error::Error as StdError;
use std::fmt;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// The instance already holds its maximum number of sessions.
    CapacityExceeded,
    /// The session was closed, evicted or never existed.
    SessionNotFound,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::CapacityExceeded => write!(f, "Session capacity exceeded"),
            ErrorKind::SessionNotFound => write!(f, "Session not found"),
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

pub(crate) fn capacity_exceeded(limit: usize) -> Error {
    Error {
        source: Some(format!("Limit of {limit} sessions reached").into()),
        error_kind: ErrorKind::CapacityExceeded,
    }
}

pub(crate) fn session_not_found(session_id: &str) -> Error {
    Error {
        source: Some(format!("No active session {session_id}").into()),
        error_kind: ErrorKind::SessionNotFound,
    }
}
