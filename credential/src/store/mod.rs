//! Shared keyed store holding subject secrets, usage records, blacklist
//! entries and rate-limit counters.
//!
//! Every instance validating credentials must talk to the same store: replay
//! protection relies on [`Store::set_if_absent`] being a single atomic
//! check-and-set there, never a local read followed by a write.

mod memory;
mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Error;

/// Trait for a keyed store with per-key expiry.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch a value, `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, Error>;

    /// Unconditionally store a value with the given time to live.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), Error>;

    /// Atomically store a value only if the key is absent.
    ///
    /// Returns `true` if this call created the key, `false` if it already existed.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, Error>;

    async fn exists(&self, key: &str) -> Result<bool, Error>;

    /// Delete a key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), Error>;

    /// Atomically increment a counter and return the new value.
    ///
    /// `ttl` applies only when the increment creates the counter. Later
    /// increments keep the original expiry, so a counter spans a fixed
    /// window starting at its first increment.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, Error>;

    /// Liveness probe.
    async fn ping(&self) -> Result<(), Error>;
}
