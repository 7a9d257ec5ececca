//! Attendance scanning, credential administration and event publishing.
//!
//! The lower layers are re-exported here so `web` depends only on `domain`
//! (and `service`) and never reaches into `credential`, `events` or `sse`
//! directly.
pub use credential::{Credential, CredentialManager};
pub use events::{Event, EventBus, EventKind, TopicKind};
pub use sse::{
    Filter, Manager as SessionManager, Message as SessionMessage, SessionHandle, SessionId,
    SessionInfo, SessionStream, Subscription,
};

pub mod attendance;
pub mod credentials;
pub mod error;
pub mod publish;
pub mod roles;
pub mod scan;

pub use roles::{Capability, Role};
pub use scan::{ScanCoordinator, ScanOutcome, ScanReason, ScanReceipt, ScanRequest};
