//! Redis pub/sub medium shared by every application instance.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use log::*;
use redis::aio::ConnectionManager;
use redis::Client;

use super::{Medium, MessageStream};
use crate::error::{medium_error, Error, MediumErrorKind};
use crate::topic::Pattern;

/// Namespace prepended to every channel so the bus can share a Redis instance.
const CHANNEL_PREFIX: &str = "events:";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Publishes over one shared connection; each pattern subscription gets its
/// own dedicated pub/sub connection.
#[derive(Clone)]
pub struct RedisMedium {
    client: Client,
    publisher: ConnectionManager,
}

impl RedisMedium {
    pub async fn connect(redis_url: &str) -> Result<Self, Error> {
        let client = Client::open(redis_url)?;
        let publisher = tokio::time::timeout(CONNECT_TIMEOUT, ConnectionManager::new(client.clone()))
            .await
            .map_err(|_| {
                medium_error(
                    MediumErrorKind::Unavailable,
                    "Timed out connecting to Redis for event publishing",
                )
            })??;

        info!("Connected event bus to Redis");
        Ok(Self { client, publisher })
    }
}

#[async_trait]
impl Medium for RedisMedium {
    async fn publish(&self, topic: &str, message: String) -> Result<(), Error> {
        let mut conn = self.publisher.clone();
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(format!("{CHANNEL_PREFIX}{topic}"))
            .arg(message)
            .query_async(&mut conn)
            .await?;
        trace!("Published on {} to {} instance(s)", topic, receivers);
        Ok(())
    }

    async fn subscribe(&self, pattern: &Pattern) -> Result<MessageStream, Error> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.psubscribe(pattern.to_redis_glob(CHANNEL_PREFIX)).await?;

        let messages = pubsub
            .into_on_message()
            .filter_map(|msg| async move {
                match msg.get_payload::<String>() {
                    Ok(payload) => Some(payload),
                    Err(e) => {
                        warn!("Discarding non-text message on {}: {}", msg.get_channel_name(), e);
                        None
                    }
                }
            });

        Ok(Box::pin(messages))
    }

    async fn ping(&self) -> Result<(), Error> {
        let mut conn = self.publisher.clone();
        let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(medium_error(
                MediumErrorKind::Command,
                &format!("Unexpected PING reply: {reply}"),
            ))
        }
    }
}
