//! Error types for the `credential` crate.
//!
//! Only conditions that prevent a validation decision are errors. A credential
//! that is expired, replayed, forged or otherwise unacceptable is a normal
//! outcome and is reported as a [`crate::Rejection`], never through this type.

use std::error::Error as StdError;
use std::fmt;

/// Top-level error type for the credential crate.
/// Holds error kind and optional source for error chaining.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Major categories of errors in the credential crate.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    Store(StoreErrorKind),
    Encoding,
    Signing,
}

/// Errors from the shared keyed store.
#[derive(Debug, PartialEq)]
pub enum StoreErrorKind {
    /// The store could not be reached; the caller cannot determine validity.
    Unavailable,
    /// The store was reachable but rejected the command.
    Command,
    /// A stored value could not be interpreted.
    Corrupt,
}

impl Error {
    /// True when the shared store could not be reached.
    pub fn is_unavailable(&self) -> bool {
        self.error_kind == ErrorKind::Store(StoreErrorKind::Unavailable)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::Store(kind) => write!(f, "Credential store error: {:?}", kind),
            ErrorKind::Encoding => write!(f, "Credential encoding error"),
            ErrorKind::Signing => write!(f, "Credential signing error"),
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
            StoreErrorKind::Unavailable
        } else {
            StoreErrorKind::Command
        };

        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Store(kind),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Encoding,
        }
    }
}

/// Helper function to create store errors.
pub fn store_error(kind: StoreErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Store(kind),
    }
}

/// Helper function to create signing errors.
pub fn signing_error(message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Signing,
    }
}
