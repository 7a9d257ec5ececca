//! In-process [`Store`] for single-instance deployments and tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use log::*;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::Store;
use crate::error::{store_error, Error, StoreErrorKind};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn new(value: String, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Keys expire lazily when read or overwritten, and in bulk through
/// [`MemoryStore::spawn_purge`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired key and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live());
        before.saturating_sub(self.entries.len())
    }

    /// Run [`MemoryStore::purge_expired`] on a fixed interval. Keys that are
    /// never read again would otherwise stay in memory for good.
    pub fn spawn_purge(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let purged = store.purge_expired();
                if purged > 0 {
                    debug!("Purged {} expired keys from the in-memory store", purged);
                }
            }
        })
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self
            .entries
            .get(key)
            .filter(|entry| entry.is_live())
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), Error> {
        self.entries
            .insert(key.to_string(), Entry::new(value.to_string(), ttl));
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, Error> {
        // The entry guard holds the shard lock, making check-and-set atomic.
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                if occupied.get().is_live() {
                    return Ok(false);
                }
                occupied.insert(Entry::new(value.to_string(), ttl));
                Ok(true)
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry::new(value.to_string(), ttl));
                Ok(true)
            }
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, Error> {
        Ok(self
            .entries
            .get(key)
            .map(|entry| entry.is_live())
            .unwrap_or(false))
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.entries.remove(key);
        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, Error> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new("0".to_string(), ttl));

        if !entry.is_live() {
            *entry = Entry::new("0".to_string(), ttl);
        }

        let next = entry.value.parse::<u64>().map_err(|_| {
            store_error(StoreErrorKind::Corrupt, "Counter value is not an integer")
        })? + 1;
        entry.value = next.to_string();
        Ok(next)
    }

    async fn ping(&self) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_set_if_absent_only_succeeds_once() {
        let store = MemoryStore::new();

        assert!(store.set_if_absent("k", "first", MINUTE).await.unwrap());
        assert!(!store.set_if_absent("k", "second", MINUTE).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_concurrent_set_if_absent_has_single_winner() {
        let store = Arc::new(MemoryStore::new());

        let attempts = (0..16).map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .set_if_absent("used:sig", &i.to_string(), MINUTE)
                    .await
                    .unwrap()
            })
        });

        let mut winners = 0;
        for attempt in attempts {
            if attempt.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_expired_keys_are_invisible_and_replaceable() {
        let store = MemoryStore::new();
        store.set("k", "old", Duration::ZERO).await.unwrap();

        assert!(!store.exists("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.set_if_absent("k", "new", MINUTE).await.unwrap());

        assert_eq!(store.purge_expired(), 0);
        assert!(store.exists("k").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_task_frees_unread_expired_keys() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..100 {
            store.increment(&format!("rate:{i}"), MINUTE).await.unwrap();
            store
                .set_if_absent(&format!("used:{i}"), "x", MINUTE)
                .await
                .unwrap();
        }
        store.set("secret", "kept", MINUTE * 10).await.unwrap();
        assert_eq!(store.entries.len(), 201);

        let purge = store.spawn_purge(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(91)).await;

        assert_eq!(store.entries.len(), 1);
        assert!(store.exists("secret").await.unwrap());
        purge.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_increment_keeps_expiry_of_first_increment() {
        let store = MemoryStore::new();

        assert_eq!(store.increment("c", MINUTE).await.unwrap(), 1);
        tokio::time::advance(Duration::from_secs(40)).await;
        assert_eq!(store.increment("c", MINUTE).await.unwrap(), 2);

        tokio::time::advance(Duration::from_secs(21)).await;
        assert_eq!(store.increment("c", MINUTE).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_increment_counts_and_restarts_after_expiry() {
        let store = MemoryStore::new();

        assert_eq!(store.increment("c", MINUTE).await.unwrap(), 1);
        assert_eq!(store.increment("c", MINUTE).await.unwrap(), 2);

        assert_eq!(store.increment("z", Duration::ZERO).await.unwrap(), 1);
        assert_eq!(store.increment("z", MINUTE).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_key_is_ok() {
        let store = MemoryStore::new();
        store.delete("missing").await.unwrap();
        store.set("k", "v", MINUTE).await.unwrap();
        store.delete("k").await.unwrap();
        assert!(!store.exists("k").await.unwrap());
    }
}
