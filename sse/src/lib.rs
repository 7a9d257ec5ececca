//! Live client sessions and real-time fan-out of bus events.
//!
//! # Architecture
//!
//! - **Session registry**: [`connection::ConnectionRegistry`] indexes sessions
//!   by id and by owner in two DashMaps. Admission is serialized so the global
//!   cap and the per-owner cap (oldest session evicted) hold under concurrency.
//! - **Bounded, lossy queues**: each session owns a bounded queue. A full queue
//!   drops the newest message; publishers never wait on a slow client.
//! - **Routing rules**: owner-addressed events go to the owner's sessions,
//!   alerts to every session subscribed to the system topic kind, everything
//!   else to sessions whose subscription filter matches.
//! - **Lifecycle**: sessions end by explicit close, idle timeout (cleanup loop)
//!   or owner eviction. Closing cancels the session's stream immediately.
//!
//! # Message Flow
//!
//! 1. The web layer opens a session and streams its [`SessionStream`].
//! 2. An [`events::EventBus`] subscription delivers each event to
//!    [`SessionEventHandler`].
//! 3. [`Manager::route`] collects matching sessions, then queues one
//!    [`message::Message`] per session without holding index locks.

pub mod bus_handler;
pub mod connection;
pub mod error;
pub mod manager;
pub mod message;

pub use bus_handler::SessionEventHandler;
pub use connection::{
    CloseReason, ConnectionRegistry, Filter, OwnerId, RouteReport, SessionHandle, SessionId,
    SessionInfo, SessionStream, Settings, Subscription,
};
pub use error::{Error, ErrorKind};
pub use manager::Manager;
pub use message::Message;
