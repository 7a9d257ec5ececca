//! Broadcast media that carry serialized events between process instances.
//!
//! A medium only moves strings: the [`crate::EventBus`] owns serialization,
//! stamping and handler dispatch.

mod local;
mod redis_medium;

pub use self::local::LocalMedium;
pub use self::redis_medium::RedisMedium;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::error::Error;
use crate::topic::Pattern;

/// Messages received on one pattern subscription. The stream ends when the
/// underlying connection is lost.
pub type MessageStream = Pin<Box<dyn Stream<Item = String> + Send>>;

#[async_trait]
pub trait Medium: Send + Sync {
    /// Fire-and-forget broadcast to whoever is listening right now.
    async fn publish(&self, topic: &str, message: String) -> Result<(), Error>;

    /// Open a dedicated subscription for every topic matching `pattern`.
    async fn subscribe(&self, pattern: &Pattern) -> Result<MessageStream, Error>;

    /// Liveness probe.
    async fn ping(&self) -> Result<(), Error>;
}
