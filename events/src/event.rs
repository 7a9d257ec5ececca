use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::topic::Topic;

/// The family of scope an event belongs to. Together with a scope id it forms
/// the [`Topic`] an event is published on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicKind {
    /// Scoped to one activity (scan results, activity changes).
    Activity,
    /// Scoped to one faculty (approvals).
    Faculty,
    /// System-wide announcements.
    System,
    /// Scoped to one participant's participation records.
    Participation,
    /// Addressed to a single user.
    User,
}

impl TopicKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicKind::Activity => "activity",
            TopicKind::Faculty => "faculty",
            TopicKind::System => "system",
            TopicKind::Participation => "participation",
            TopicKind::User => "user",
        }
    }
}

impl fmt::Display for TopicKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct TopicKindParseError;

impl FromStr for TopicKind {
    type Err = TopicKindParseError;
    fn from_str(kind: &str) -> Result<Self, Self::Err> {
        match kind.to_lowercase().as_str() {
            "activity" => Ok(TopicKind::Activity),
            "faculty" => Ok(TopicKind::Faculty),
            "system" => Ok(TopicKind::System),
            "participation" => Ok(TopicKind::Participation),
            "user" => Ok(TopicKind::User),
            _ => Err(TopicKindParseError),
        }
    }
}

/// How an event finds its recipients once it reaches an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Only sessions belonging to the event's owner, subscriptions ignored.
    Owner,
    /// Every session holding any subscription to the event's topic kind.
    Broadcast,
    /// Only sessions whose subscription filter matches the event.
    Subscribers,
}

/// Every business event that travels over the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Outcome of a single attendance scan attempt.
    ScanResult,
    /// A participant's attendance/registration record changed.
    ParticipationUpdated,
    /// An activity's details or status changed.
    ActivityUpdated,
    /// A registration or activity approval decision was made.
    ApprovalUpdated,
    /// A message for one user.
    Notification,
    /// A system-wide alert.
    Alert,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ScanResult => "scan_result",
            EventKind::ParticipationUpdated => "participation_updated",
            EventKind::ActivityUpdated => "activity_updated",
            EventKind::ApprovalUpdated => "approval_updated",
            EventKind::Notification => "notification",
            EventKind::Alert => "alert",
        }
    }

    pub fn topic_kind(&self) -> TopicKind {
        match self {
            EventKind::ScanResult | EventKind::ActivityUpdated => TopicKind::Activity,
            EventKind::ParticipationUpdated => TopicKind::Participation,
            EventKind::ApprovalUpdated => TopicKind::Faculty,
            EventKind::Notification => TopicKind::User,
            EventKind::Alert => TopicKind::System,
        }
    }

    pub fn delivery(&self) -> Delivery {
        match self {
            EventKind::ParticipationUpdated | EventKind::Notification => Delivery::Owner,
            EventKind::Alert => Delivery::Broadcast,
            EventKind::ScanResult | EventKind::ActivityUpdated | EventKind::ApprovalUpdated => {
                Delivery::Subscribers
            }
        }
    }

    /// The kind used when a caller publishes on a topic kind without naming one.
    pub fn default_for(topic_kind: TopicKind) -> Self {
        match topic_kind {
            TopicKind::Activity => EventKind::ActivityUpdated,
            TopicKind::Faculty => EventKind::ApprovalUpdated,
            TopicKind::System => EventKind::Alert,
            TopicKind::Participation => EventKind::ParticipationUpdated,
            TopicKind::User => EventKind::Notification,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an event goes, and where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingMetadata {
    pub topic_kind: TopicKind,
    pub scope_id: String,
    /// Recipient of owner-addressed events.
    pub owner_id: Option<String>,
    /// Instance that published the event. Stamped by the bus.
    pub instance_id: Option<String>,
}

/// A published event. Never mutated once the bus has stamped it.
///
/// Entity data is carried as `serde_json::Value` so publishers do not need to
/// share types with subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
    pub routing: RoutingMetadata,
}

impl Event {
    pub fn new(kind: EventKind, scope_id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            payload,
            routing: RoutingMetadata {
                topic_kind: kind.topic_kind(),
                scope_id: scope_id.into(),
                owner_id: None,
                instance_id: None,
            },
        }
    }

    /// Address the event to one owner.
    pub fn addressed_to(mut self, owner_id: impl Into<String>) -> Self {
        self.routing.owner_id = Some(owner_id.into());
        self
    }

    pub fn topic(&self) -> Topic {
        Topic::new(self.routing.topic_kind, self.routing.scope_id.clone())
    }

    pub fn delivery(&self) -> Delivery {
        self.kind.delivery()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_topic_follows_kind() {
        let event = Event::new(EventKind::ScanResult, "act-1", json!({}));
        assert_eq!(event.topic().to_string(), "activity:act-1");
        assert_eq!(event.delivery(), Delivery::Subscribers);
    }

    #[test]
    fn test_every_topic_kind_has_a_default_kind_on_that_topic() {
        for topic_kind in [
            TopicKind::Activity,
            TopicKind::Faculty,
            TopicKind::System,
            TopicKind::Participation,
            TopicKind::User,
        ] {
            assert_eq!(EventKind::default_for(topic_kind).topic_kind(), topic_kind);
            assert_eq!(topic_kind.as_str().parse::<TopicKind>(), Ok(topic_kind));
        }
    }

    #[test]
    fn test_event_serializes_with_snake_case_kind() {
        let event = Event::new(EventKind::ParticipationUpdated, "act-1", json!({"n": 1}))
            .addressed_to("student-9");
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["kind"], "participation_updated");
        assert_eq!(value["routing"]["topic_kind"], "participation");
        assert_eq!(value["routing"]["owner_id"], "student-9");
        assert_eq!(serde_json::from_value::<Event>(value).unwrap(), event);
    }
}
