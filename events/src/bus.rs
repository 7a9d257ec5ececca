use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use futures_util::{FutureExt, StreamExt};
use log::*;
use tokio::task::JoinHandle;

use crate::error::Error;
use crate::event::Event;
use crate::medium::{Medium, MessageStream};
use crate::topic::Pattern;

/// Trait for handling events delivered on a subscribed pattern.
///
/// A returned error (or a panic) is logged and the delivery path moves on to
/// the next message.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> Result<(), Error>;
}

#[derive(Debug, Clone)]
pub struct BusSettings {
    /// Stamped on every event published from this process.
    pub instance_id: String,
    /// Delay before re-subscribing a pattern whose stream was lost.
    pub resubscribe_backoff: Duration,
    pub health_check_interval: Duration,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            instance_id: uuid::Uuid::new_v4().to_string(),
            resubscribe_backoff: Duration::from_secs(2),
            health_check_interval: Duration::from_secs(30),
        }
    }
}

/// Pattern-addressed publish/subscribe over a shared [`Medium`].
///
/// Every instance publishing to and subscribing from the same medium sees the
/// same event stream. Delivery is best effort: nothing is acknowledged,
/// retried or persisted.
pub struct EventBus {
    medium: Arc<dyn Medium>,
    settings: BusSettings,
    /// One delivery task per subscribed pattern.
    subscriptions: DashMap<Pattern, JoinHandle<()>>,
    healthy: Arc<AtomicBool>,
}

impl EventBus {
    pub fn new(medium: Arc<dyn Medium>, settings: BusSettings) -> Self {
        Self {
            medium,
            settings,
            subscriptions: DashMap::new(),
            healthy: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.settings.instance_id
    }

    /// Result of the most recent liveness probe.
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    /// Stamp and broadcast an event on its topic. Failures are logged, never
    /// returned: publishing must not fail the operation that caused the event.
    pub async fn publish(&self, mut event: Event) {
        event.timestamp = Utc::now();
        event.routing.instance_id = Some(self.settings.instance_id.clone());

        let topic = event.topic().to_string();
        let message = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize {} event for {}: {}", event.kind, topic, e);
                return;
            }
        };

        match self.medium.publish(&topic, message).await {
            Ok(()) => debug!("Published {} event {} on {}", event.kind, event.id, topic),
            Err(e) => warn!("Failed to publish {} event on {}: {}", event.kind, topic, e),
        }
    }

    /// Start delivering every event matching `pattern` to `handler`.
    ///
    /// Subscribing a pattern that is already subscribed replaces its handler.
    /// The subscription is live when this returns.
    pub async fn subscribe(
        &self,
        pattern: Pattern,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), Error> {
        let stream = self.medium.subscribe(&pattern).await?;

        let task = tokio::spawn(deliver(
            pattern.clone(),
            Arc::clone(&self.medium),
            handler,
            stream,
            self.settings.resubscribe_backoff,
        ));

        if let Some(previous) = self.subscriptions.insert(pattern.clone(), task) {
            previous.abort();
            info!("Replaced event subscription for pattern {}", pattern);
        } else {
            info!("Subscribed to events matching {}", pattern);
        }
        Ok(())
    }

    /// Stop delivery for `pattern`. Returns whether a subscription existed.
    pub fn unsubscribe(&self, pattern: &Pattern) -> bool {
        match self.subscriptions.remove(pattern) {
            Some((_, task)) => {
                task.abort();
                info!("Unsubscribed from events matching {}", pattern);
                true
            }
            None => false,
        }
    }

    pub fn subscribed_patterns(&self) -> Vec<Pattern> {
        self.subscriptions
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Periodically probe the medium. Failures only degrade real-time
    /// delivery, so they are logged and the process keeps serving.
    pub fn spawn_health_check(&self) -> JoinHandle<()> {
        let medium = Arc::clone(&self.medium);
        let healthy = Arc::clone(&self.healthy);
        let interval = self.settings.health_check_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                probe(medium.as_ref(), &healthy).await;
            }
        })
    }

    /// Run one liveness probe now.
    pub async fn check_health(&self) -> bool {
        probe(self.medium.as_ref(), &self.healthy).await
    }

    /// Stop every delivery path.
    pub fn shutdown(&self) {
        for pattern in self.subscribed_patterns() {
            self.unsubscribe(&pattern);
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        for entry in self.subscriptions.iter() {
            entry.value().abort();
        }
    }
}

async fn probe(medium: &dyn Medium, healthy: &AtomicBool) -> bool {
    match medium.ping().await {
        Ok(()) => {
            if !healthy.swap(true, Ordering::Relaxed) {
                info!("Event medium reachable again, real-time delivery restored");
            }
            true
        }
        Err(e) => {
            if healthy.swap(false, Ordering::Relaxed) {
                warn!("Event medium unreachable, real-time delivery degraded: {}", e);
            } else {
                debug!("Event medium still unreachable: {}", e);
            }
            false
        }
    }
}

/// Delivery loop for one pattern. Re-subscribes whenever the stream ends and
/// runs until its task is aborted.
async fn deliver(
    pattern: Pattern,
    medium: Arc<dyn Medium>,
    handler: Arc<dyn EventHandler>,
    mut stream: MessageStream,
    backoff: Duration,
) {
    loop {
        while let Some(message) = stream.next().await {
            dispatch(&pattern, handler.as_ref(), &message).await;
        }

        warn!(
            "Event stream for pattern {} ended, re-subscribing in {}s",
            pattern,
            backoff.as_secs()
        );
        stream = loop {
            tokio::time::sleep(backoff).await;
            match medium.subscribe(&pattern).await {
                Ok(stream) => {
                    info!("Re-subscribed to events matching {}", pattern);
                    break stream;
                }
                Err(e) => warn!("Re-subscribing to {} failed: {}", pattern, e),
            }
        };
    }
}

async fn dispatch(pattern: &Pattern, handler: &dyn EventHandler, message: &str) {
    let event: Event = match serde_json::from_str(message) {
        Ok(event) => event,
        Err(e) => {
            error!("Dropping undecodable event on pattern {}: {}", pattern, e);
            return;
        }
    };

    match AssertUnwindSafe(handler.handle(&event)).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(
            "Handler for pattern {} failed on {} event {}: {}",
            pattern, event.kind, event.id, e
        ),
        Err(_) => error!(
            "Handler for pattern {} panicked on {} event {}",
            pattern, event.kind, event.id
        ),
    }
}
