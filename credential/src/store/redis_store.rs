//! Redis-backed [`Store`] shared by every application instance.

use std::time::Duration;

use async_trait::async_trait;
use log::*;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use super::Store;
use crate::error::{store_error, Error, StoreErrorKind};

/// How long to wait for the initial connection before giving up.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Redis store over a multiplexed, automatically reconnecting connection.
#[derive(Clone)]
pub struct RedisStore {
    connection_manager: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis and verify the connection with a PING.
    pub async fn connect(redis_url: &str) -> Result<Self, Error> {
        let client = Client::open(redis_url)?;

        let connection_manager = tokio::time::timeout(CONNECT_TIMEOUT, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                store_error(
                    StoreErrorKind::Unavailable,
                    &format!(
                        "Timed out after {}s connecting to Redis",
                        CONNECT_TIMEOUT.as_secs()
                    ),
                )
            })??;

        let store = Self { connection_manager };
        store.ping().await?;
        info!("Connected to credential store");
        Ok(store)
    }

    fn ttl_secs(ttl: Duration) -> u64 {
        // Redis rejects an expiry of zero.
        ttl.as_secs().max(1)
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let mut conn = self.connection_manager.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), Error> {
        let mut conn = self.connection_manager.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(Self::ttl_secs(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, Error> {
        let mut conn = self.connection_manager.clone();
        // SET NX replies OK when written and nil when the key already existed.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(Self::ttl_secs(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, Error> {
        let mut conn = self.connection_manager.clone();
        Ok(conn.exists(key).await?)
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        let mut conn = self.connection_manager.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, Error> {
        let mut conn = self.connection_manager.clone();
        // INCR preserves the expiry set when the counter was created.
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(key)
            .arg(0)
            .arg("EX")
            .arg(Self::ttl_secs(ttl))
            .arg("NX")
            .ignore()
            .cmd("INCR")
            .arg(key)
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn ping(&self) -> Result<(), Error> {
        let mut conn = self.connection_manager.clone();
        let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(store_error(
                StoreErrorKind::Command,
                &format!("Unexpected PING reply: {reply}"),
            ))
        }
    }
}
