//! Error types for the `events` crate.

use std::error::Error as StdError;
use std::fmt;

/// Top-level error type for the event bus.
/// Holds error kind and optional source for error chaining.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    Medium(MediumErrorKind),
    Serialization,
    /// Raised by an [`crate::EventHandler`]; logged, never propagated to publishers.
    Handler,
}

/// Errors from the broadcast medium carrying events between instances.
#[derive(Debug, PartialEq)]
pub enum MediumErrorKind {
    Unavailable,
    Command,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (&self.error_kind, &self.source) {
            (ErrorKind::Medium(kind), Some(source)) => {
                write!(f, "Event medium error ({:?}): {}", kind, source)
            }
            (ErrorKind::Medium(kind), None) => write!(f, "Event medium error: {:?}", kind),
            (ErrorKind::Serialization, _) => write!(f, "Event serialization error"),
            (ErrorKind::Handler, Some(source)) => write!(f, "Event handler error: {}", source),
            (ErrorKind::Handler, None) => write!(f, "Event handler error"),
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

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        let kind = if err.is_io_error()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
        {
            MediumErrorKind::Unavailable
        } else {
            MediumErrorKind::Command
        };

        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Medium(kind),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Serialization,
        }
    }
}

/// Helper function for handlers to report a failure.
pub fn handler_error(message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Handler,
    }
}

/// Helper function to create medium errors.
pub fn medium_error(kind: MediumErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Medium(kind),
    }
}
