//! Event bus infrastructure for the attendance platform.
//!
//! This crate lets domain operations publish events once and have them reach
//! every process instance, where subscribers route them on to live sessions.
//!
//! # Architecture
//!
//! - **Event**: a typed envelope (`kind`, `timestamp`, JSON `payload`,
//!   `routing` metadata) that is never mutated after publish
//! - **Topic / Pattern**: `kind:scope` addresses and `*` wildcard patterns
//! - **Medium**: the shared broadcast transport (Redis pub/sub, or an
//!   in-process channel for a single instance)
//! - **EventBus**: stamps and publishes events, and runs one delivery path
//!   per subscribed pattern that calls an **EventHandler** for each message
//!
//! This crate has no dependencies on internal crates, avoiding circular
//! dependencies. Entity data is carried as serialized JSON values.

pub mod bus;
pub mod error;
pub mod event;
pub mod medium;
pub mod topic;

pub use bus::{BusSettings, EventBus, EventHandler};
pub use error::{Error, ErrorKind};
pub use event::{Delivery, Event, EventKind, RoutingMetadata, TopicKind};
pub use medium::{LocalMedium, Medium, RedisMedium};
pub use topic::{Pattern, Topic};
