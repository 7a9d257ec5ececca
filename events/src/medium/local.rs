//! In-process medium for single-instance deployments and tests.

use async_stream::stream;
use async_trait::async_trait;
use log::*;
use tokio::sync::broadcast::{self, error::RecvError};

use super::{Medium, MessageStream};
use crate::error::Error;
use crate::topic::Pattern;

const DEFAULT_CAPACITY: usize = 1024;

/// Fans messages out to every local subscriber through a tokio broadcast channel.
#[derive(Clone)]
pub struct LocalMedium {
    sender: broadcast::Sender<(String, String)>,
}

impl LocalMedium {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// `capacity` bounds how far a slow subscriber may lag before it starts
    /// losing messages.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for LocalMedium {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Medium for LocalMedium {
    async fn publish(&self, topic: &str, message: String) -> Result<(), Error> {
        // An error only means nobody is listening, which is fine for a broadcast.
        if self.sender.send((topic.to_string(), message)).is_err() {
            trace!("No local listeners for topic {}", topic);
        }
        Ok(())
    }

    async fn subscribe(&self, pattern: &Pattern) -> Result<MessageStream, Error> {
        let mut receiver = self.sender.subscribe();
        let pattern = pattern.clone();

        Ok(Box::pin(stream! {
            loop {
                match receiver.recv().await {
                    Ok((topic, message)) => {
                        if pattern.matches(&topic) {
                            yield message;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Subscriber for pattern {} lagged, {} messages lost", pattern, skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }))
    }

    async fn ping(&self) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TopicKind;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_subscriber_only_sees_matching_topics() {
        let medium = LocalMedium::new();
        let mut activity = medium
            .subscribe(&Pattern::family(TopicKind::Activity))
            .await
            .unwrap();

        medium.publish("faculty:1", "f".to_string()).await.unwrap();
        medium.publish("activity:1", "a".to_string()).await.unwrap();

        assert_eq!(activity.next().await.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_publish_without_listeners_is_ok() {
        let medium = LocalMedium::new();
        assert!(medium.publish("system:x", "m".to_string()).await.is_ok());
    }
}
