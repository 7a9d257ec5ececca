use crate::connection::{
    CloseReason, ConnectionRegistry, Filter, OwnerId, RouteReport, SessionHandle, SessionId,
    SessionInfo, Settings, Subscription,
};
use crate::error::Error;
use events::{Event, TopicKind};
use log::*;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Owns the session registry for the lifetime of the process: created at
/// startup, drained by [`Manager::shutdown`].
pub struct Manager {
    registry: Arc<ConnectionRegistry>,
}

impl Manager {
    pub fn new(settings: Settings) -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new(settings)),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn open_session(&self, owner_id: OwnerId) -> Result<SessionHandle, Error> {
        self.registry.open(owner_id)
    }

    pub fn subscribe(
        &self,
        session_id: &SessionId,
        topic_kind: TopicKind,
        filter: Filter,
    ) -> Result<Subscription, Error> {
        self.registry.subscribe(session_id, topic_kind, filter)
    }

    pub fn unsubscribe(
        &self,
        session_id: &SessionId,
        topic_kind: TopicKind,
        filter: Option<&Filter>,
    ) -> Result<usize, Error> {
        self.registry.unsubscribe(session_id, topic_kind, filter)
    }

    pub fn touch(&self, session_id: &SessionId) -> Result<(), Error> {
        self.registry.touch(session_id)
    }

    pub fn session_info(&self, session_id: &SessionId) -> Option<SessionInfo> {
        self.registry.session_info(session_id)
    }

    /// Explicit close requested by the client. Safe to repeat.
    pub fn close_session(&self, session_id: &SessionId) -> bool {
        self.registry.close(session_id, CloseReason::Explicit)
    }

    /// Fan an event out to the local sessions it is addressed to.
    pub fn route(&self, event: &Event) -> RouteReport {
        let report = self.registry.route(event);
        debug!(
            "Routed {} event {}: {} matched, {} delivered, {} dropped",
            event.kind, event.id, report.matched, report.delivered, report.dropped
        );
        report
    }

    /// Close every session idle for at least the configured timeout.
    pub fn cleanup_idle(&self) -> usize {
        cleanup_idle_at(&self.registry, Instant::now())
    }

    /// Run [`Manager::cleanup_idle`] on the configured interval.
    pub fn spawn_cleanup(&self) -> JoinHandle<()> {
        let registry = Arc::clone(&self.registry);
        let interval = registry.settings().cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cleanup_idle_at(&registry, Instant::now());
            }
        })
    }

    /// Close every session. Streams end and queued messages are discarded.
    pub fn shutdown(&self) -> usize {
        let ids = self.registry.session_ids();
        let closed = ids
            .iter()
            .filter(|id| self.registry.close(id, CloseReason::Shutdown))
            .count();
        info!("Drained {} sessions on shutdown", closed);
        closed
    }

    pub fn session_count(&self) -> usize {
        self.registry.len()
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

fn cleanup_idle_at(registry: &ConnectionRegistry, now: Instant) -> usize {
    let closed = registry
        .idle_sessions(now)
        .iter()
        .filter(|id| registry.close(id, CloseReason::IdleTimeout))
        .count();
    if closed > 0 {
        info!("Reclaimed {} idle sessions", closed);
    }
    closed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn short_idle() -> Settings {
        Settings {
            idle_timeout: Duration::from_secs(10),
            cleanup_interval: Duration::from_secs(1),
            ..Settings::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_closes_only_idle_sessions() {
        let manager = Manager::new(short_idle());
        let mut idle = manager.open_session("a".to_string()).unwrap();
        let active = manager.open_session("b".to_string()).unwrap();

        tokio::time::advance(Duration::from_secs(9)).await;
        manager.touch(&active.id).unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;

        assert_eq!(manager.cleanup_idle(), 1);
        assert_eq!(idle.stream.next().await, None);
        assert!(manager.session_info(&active.id).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_reclaims_idle_sessions() {
        let manager = Manager::new(short_idle());
        let mut handle = manager.open_session("a".to_string()).unwrap();
        let task = manager.spawn_cleanup();

        tokio::time::sleep(Duration::from_secs(12)).await;

        assert_eq!(manager.session_count(), 0);
        assert_eq!(handle.stream.next().await, None);
        task.abort();
    }

    #[tokio::test]
    async fn test_shutdown_ends_every_stream() {
        let manager = Manager::default();
        let mut first = manager.open_session("a".to_string()).unwrap();
        let mut second = manager.open_session("b".to_string()).unwrap();
        manager
            .subscribe(&first.id, TopicKind::Activity, Filter::default())
            .unwrap();
        manager.route(&Event::new(
            events::EventKind::ScanResult,
            "act-1",
            json!({}),
        ));

        assert_eq!(manager.shutdown(), 2);
        assert_eq!(first.stream.next().await, None);
        assert_eq!(second.stream.next().await, None);
        assert_eq!(manager.session_count(), 0);
    }

    #[tokio::test]
    async fn test_close_session_is_idempotent() {
        let manager = Manager::default();
        let handle = manager.open_session("a".to_string()).unwrap();

        assert!(manager.close_session(&handle.id));
        assert!(!manager.close_session(&handle.id));
        assert_eq!(manager.session_count(), 0);
    }
}
