use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use events::{Delivery, Event, EventKind, TopicKind};
use log::*;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{self, Error};
use crate::message::Message;

// Owner ids are opaque to the registry; the web layer passes the caller's user id.
pub type OwnerId = String;

/// Unique identifier for a session (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Sessions held by this instance across all owners.
    pub max_sessions: usize,
    pub max_sessions_per_owner: usize,
    /// Outbound messages buffered per session before new ones are dropped.
    pub queue_capacity: usize,
    pub idle_timeout: Duration,
    pub cleanup_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_sessions: 5000,
            max_sessions_per_owner: 3,
            queue_capacity: 64,
            idle_timeout: Duration::from_secs(600),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// Narrows a subscription. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default)]
    pub scope_id: Option<String>,
    #[serde(default)]
    pub event_kinds: HashSet<EventKind>,
}

impl Filter {
    pub fn scope(scope_id: impl Into<String>) -> Self {
        Self {
            scope_id: Some(scope_id.into()),
            event_kinds: HashSet::new(),
        }
    }

    pub fn matches(&self, event: &Event) -> bool {
        let scope_matches = self
            .scope_id
            .as_deref()
            .map_or(true, |scope| scope == event.routing.scope_id);
        let kind_matches = self.event_kinds.is_empty() || self.event_kinds.contains(&event.kind);
        scope_matches && kind_matches
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subscription {
    pub topic_kind: TopicKind,
    pub filter: Filter,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    fn matches(&self, event: &Event) -> bool {
        self.topic_kind == event.routing.topic_kind && self.filter.matches(event)
    }
}

/// Why a session left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Explicit,
    IdleTimeout,
    OwnerEviction,
    Shutdown,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Explicit => "explicit",
            CloseReason::IdleTimeout => "idle_timeout",
            CloseReason::OwnerEviction => "owner_eviction",
            CloseReason::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct SessionEntry {
    owner_id: OwnerId,
    connected_at: DateTime<Utc>,
    last_activity: Instant,
    subscriptions: Vec<Subscription>,
    sender: mpsc::Sender<Message>,
    cancel: CancellationToken,
}

/// Read-only view of a live session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub owner_id: OwnerId,
    pub connected_at: DateTime<Utc>,
    pub subscriptions: Vec<Subscription>,
}

/// Returned by [`ConnectionRegistry::open`]. The stream is the only way to
/// read the session's outbound queue.
pub struct SessionHandle {
    pub id: SessionId,
    pub owner_id: OwnerId,
    pub stream: SessionStream,
}

pub struct SessionStream {
    receiver: mpsc::Receiver<Message>,
    cancel: CancellationToken,
}

impl SessionStream {
    /// Next queued message in publish order. Returns `None` as soon as the
    /// session is closed, discarding anything still buffered.
    pub async fn next(&mut self) -> Option<Message> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            message = self.receiver.recv() => message,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Outcome of routing one event on this instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteReport {
    pub matched: usize,
    pub delivered: usize,
    /// Messages discarded because the session's queue was full.
    pub dropped: usize,
}

/// Live sessions held by this instance, indexed by id and by owner.
pub struct ConnectionRegistry {
    sessions: DashMap<SessionId, SessionEntry>,

    /// Owner to session ids, oldest first.
    owner_index: DashMap<OwnerId, Vec<SessionId>>,

    /// Serializes admission so cap checks and inserts are atomic.
    admission: Mutex<()>,

    settings: Settings,
}

impl ConnectionRegistry {
    pub fn new(settings: Settings) -> Self {
        Self {
            sessions: DashMap::new(),
            owner_index: DashMap::new(),
            admission: Mutex::new(()),
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Admit a new session for `owner_id`.
    ///
    /// Fails with `CapacityExceeded` when the instance is full. An owner
    /// already at the per-owner cap loses its oldest sessions first.
    pub fn open(&self, owner_id: OwnerId) -> Result<SessionHandle, Error> {
        let _admission = self
            .admission
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if self.sessions.len() >= self.settings.max_sessions {
            warn!(
                "Rejected session for owner {}: instance holds {} sessions",
                owner_id,
                self.settings.max_sessions
            );
            return Err(error::capacity_exceeded(self.settings.max_sessions));
        }

        let owned = self.sessions_for_owner(&owner_id);
        let excess = (owned.len() + 1).saturating_sub(self.settings.max_sessions_per_owner);
        for oldest in owned.iter().take(excess) {
            self.close(oldest, CloseReason::OwnerEviction);
        }

        let id = SessionId::new();
        let (sender, receiver) = mpsc::channel(self.settings.queue_capacity.max(1));
        let cancel = CancellationToken::new();

        self.sessions.insert(
            id.clone(),
            SessionEntry {
                owner_id: owner_id.clone(),
                connected_at: Utc::now(),
                last_activity: Instant::now(),
                subscriptions: Vec::new(),
                sender,
                cancel: cancel.clone(),
            },
        );
        self.owner_index
            .entry(owner_id.clone())
            .or_default()
            .push(id.clone());

        info!("Opened session {} for owner {}", id, owner_id);

        Ok(SessionHandle {
            id,
            owner_id,
            stream: SessionStream { receiver, cancel },
        })
    }

    /// Close a session, ending its stream and releasing its queue and
    /// subscriptions. Returns whether the session was still open.
    pub fn close(&self, session_id: &SessionId, reason: CloseReason) -> bool {
        let Some((_, entry)) = self.sessions.remove(session_id) else {
            return false;
        };
        entry.cancel.cancel();

        if let Some(mut ids) = self.owner_index.get_mut(&entry.owner_id) {
            ids.retain(|id| id != session_id);

            if ids.is_empty() {
                drop(ids); // Release lock before removal
                self.owner_index
                    .remove_if(&entry.owner_id, |_, ids| ids.is_empty());
            }
        }

        info!(
            "Closed session {} for owner {} ({})",
            session_id, entry.owner_id, reason
        );
        true
    }

    /// Add a subscription. An identical subscription already held is kept as is.
    pub fn subscribe(
        &self,
        session_id: &SessionId,
        topic_kind: TopicKind,
        filter: Filter,
    ) -> Result<Subscription, Error> {
        let mut entry = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| error::session_not_found(session_id.as_str()))?;
        entry.last_activity = Instant::now();

        if let Some(existing) = entry
            .subscriptions
            .iter()
            .find(|s| s.topic_kind == topic_kind && s.filter == filter)
        {
            return Ok(existing.clone());
        }

        let subscription = Subscription {
            topic_kind,
            filter,
            created_at: Utc::now(),
        };
        entry.subscriptions.push(subscription.clone());
        debug!("Session {} subscribed to {}", session_id, topic_kind);
        Ok(subscription)
    }

    /// Remove subscriptions on `topic_kind`; only the one with `filter` when
    /// given. Returns how many were removed.
    pub fn unsubscribe(
        &self,
        session_id: &SessionId,
        topic_kind: TopicKind,
        filter: Option<&Filter>,
    ) -> Result<usize, Error> {
        let mut entry = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| error::session_not_found(session_id.as_str()))?;
        entry.last_activity = Instant::now();

        let before = entry.subscriptions.len();
        entry.subscriptions.retain(|s| {
            s.topic_kind != topic_kind || filter.is_some_and(|filter| &s.filter != filter)
        });
        Ok(before - entry.subscriptions.len())
    }

    /// Record client activity.
    pub fn touch(&self, session_id: &SessionId) -> Result<(), Error> {
        let mut entry = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| error::session_not_found(session_id.as_str()))?;
        entry.last_activity = Instant::now();
        Ok(())
    }

    /// Queue `event` on every local session its delivery rule selects.
    ///
    /// Targets are collected before any send so no index lock is held during
    /// fan-out. A full queue drops this message for that session only.
    pub fn route(&self, event: &Event) -> RouteReport {
        let targets = self.targets(event);
        let mut report = RouteReport {
            matched: targets.len(),
            ..RouteReport::default()
        };
        if targets.is_empty() {
            return report;
        }

        let message = Message::from(event);
        for (session_id, sender) in targets {
            match sender.try_send(message.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    report.dropped += 1;
                    debug!(
                        "Queue full for session {}, dropped {} event {}",
                        session_id, event.kind, event.id
                    );
                }
                // Closed between collection and send.
                Err(TrySendError::Closed(_)) => {}
            }
        }
        report
    }

    fn targets(&self, event: &Event) -> Vec<(SessionId, mpsc::Sender<Message>)> {
        match event.delivery() {
            Delivery::Owner => {
                let Some(owner_id) = event.routing.owner_id.as_ref() else {
                    debug!("Dropped {} event {} without an owner", event.kind, event.id);
                    return Vec::new();
                };
                self.sessions_for_owner(owner_id)
                    .into_iter()
                    .filter_map(|id| {
                        let sender = self.sessions.get(&id)?.sender.clone();
                        Some((id, sender))
                    })
                    .collect()
            }
            Delivery::Broadcast => self.collect_where(|entry| {
                entry
                    .subscriptions
                    .iter()
                    .any(|s| s.topic_kind == event.routing.topic_kind)
            }),
            Delivery::Subscribers => {
                self.collect_where(|entry| entry.subscriptions.iter().any(|s| s.matches(event)))
            }
        }
    }

    fn collect_where(
        &self,
        predicate: impl Fn(&SessionEntry) -> bool,
    ) -> Vec<(SessionId, mpsc::Sender<Message>)> {
        self.sessions
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| (entry.key().clone(), entry.value().sender.clone()))
            .collect()
    }

    /// Sessions whose last activity is at least the idle timeout before `now`.
    pub fn idle_sessions(&self, now: Instant) -> Vec<SessionId> {
        self.sessions
            .iter()
            .filter(|entry| {
                now.saturating_duration_since(entry.value().last_activity)
                    >= self.settings.idle_timeout
            })
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// An owner's session ids, oldest first.
    pub fn sessions_for_owner(&self, owner_id: &str) -> Vec<SessionId> {
        self.owner_index
            .get(owner_id)
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn session_info(&self, session_id: &SessionId) -> Option<SessionInfo> {
        self.sessions.get(session_id).map(|entry| SessionInfo {
            id: session_id.clone(),
            owner_id: entry.owner_id.clone(),
            connected_at: entry.connected_at,
            subscriptions: entry.subscriptions.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}
