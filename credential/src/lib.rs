//! # credential
//!
//! Short-lived, signed attendance credentials ("QR credentials").
//!
//! - [`CredentialManager`] issues credentials and validates them exactly once,
//!   with blacklist, freshness, replay, rate-limit, signature and secret checks.
//! - [`store::Store`] is the shared keyed store all replay and revocation state
//!   lives in, with Redis and in-process implementations.
//! - [`clock::Clock`] supplies time so TTL windows can be driven in tests.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let manager = CredentialManager::new(store, &master_secret, Settings::default())?;
//! let raw = manager.issue("student-42").await?.encode()?;
//! match manager.validate(&raw, "gate-3").await? {
//!     Validation::Valid { subject_id, .. } => { /* mark attendance */ }
//!     Validation::Rejected { reason, .. } => { /* report reason */ }
//! }
//! ```

pub mod clock;
pub mod credential;
pub mod error;
pub mod manager;
pub mod signing;
pub mod store;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use credential::{Credential, CREDENTIAL_VERSION};
pub use error::{Error, ErrorKind};
pub use manager::{
    CredentialManager, CredentialStats, Rejection, Settings, UsageRecord, Validation,
};
