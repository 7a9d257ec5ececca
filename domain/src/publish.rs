//! Publishing on behalf of the surrounding CRUD layer.

use events::{Delivery, Event, EventBus, EventKind, TopicKind};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::Error;
use crate::roles::{Capability, Role};

#[derive(Debug, Clone, Deserialize)]
pub struct PublishRequest {
    pub topic_kind: TopicKind,
    pub scope_id: String,
    /// Defaults to the usual kind for `topic_kind`.
    #[serde(default)]
    pub kind: Option<EventKind>,
    /// Required for owner-addressed kinds.
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

/// Publish an event and return its id. Alerts need
/// [`Capability::PublishAlert`], everything else [`Capability::PublishEvent`].
pub async fn publish(bus: &EventBus, role: Role, request: PublishRequest) -> Result<Uuid, Error> {
    let kind = request
        .kind
        .unwrap_or_else(|| EventKind::default_for(request.topic_kind));
    if kind.topic_kind() != request.topic_kind {
        return Err(Error::invalid(format!(
            "{kind} events are not published on {} topics",
            request.topic_kind
        )));
    }

    let capability = match kind.delivery() {
        Delivery::Broadcast => Capability::PublishAlert,
        Delivery::Owner | Delivery::Subscribers => Capability::PublishEvent,
    };
    role.require(capability)?;

    let mut event = Event::new(kind, request.scope_id, request.payload);
    if kind.delivery() == Delivery::Owner {
        let owner_id = request
            .owner_id
            .ok_or_else(|| Error::invalid(format!("{kind} events need an owner_id")))?;
        event = event.addressed_to(owner_id);
    }

    let id = event.id;
    bus.publish(event).await;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DomainErrorKind, InternalErrorKind};
    use events::{BusSettings, LocalMedium};
    use serde_json::json;
    use std::sync::Arc;

    fn bus() -> EventBus {
        EventBus::new(Arc::new(LocalMedium::new()), BusSettings::default())
    }

    fn request(value: Value) -> PublishRequest {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_organizer_publishes_activity_update() {
        let result = publish(
            &bus(),
            Role::Organizer,
            request(json!({"topic_kind": "activity", "scope_id": "act-1", "payload": {"title": "Open day"}})),
        )
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_alerts_need_publish_alert() {
        let alert = json!({"topic_kind": "system", "scope_id": "global"});

        let err = publish(&bus(), Role::FacultyAdmin, request(alert.clone()))
            .await
            .unwrap_err();
        assert_eq!(
            err.error_kind,
            DomainErrorKind::Internal(InternalErrorKind::Forbidden)
        );
        assert!(publish(&bus(), Role::SystemAdmin, request(alert)).await.is_ok());
    }

    #[tokio::test]
    async fn test_owner_addressed_kind_without_owner_is_invalid() {
        let err = publish(
            &bus(),
            Role::SystemAdmin,
            request(json!({"topic_kind": "user", "scope_id": "S1"})),
        )
        .await
        .unwrap_err();
        assert_eq!(
            err.error_kind,
            DomainErrorKind::Internal(InternalErrorKind::Invalid)
        );
    }

    #[tokio::test]
    async fn test_kind_must_belong_to_topic_kind() {
        let err = publish(
            &bus(),
            Role::SystemAdmin,
            request(json!({"topic_kind": "faculty", "scope_id": "eng", "kind": "scan_result"})),
        )
        .await
        .unwrap_err();
        assert_eq!(
            err.error_kind,
            DomainErrorKind::Internal(InternalErrorKind::Invalid)
        );
    }
}
