use axum::response::sse::Event as SseEvent;
use chrono::{DateTime, Utc};
use events::{Event, EventKind};
use serde::Serialize;
use serde_json::Value;

/// Trait for getting the SSE event type name
pub trait EventType {
    fn event_type(&self) -> &'static str;
}

/// A message queued for delivery to one session.
///
/// Built once per routed event and cloned into each matching session's queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub topic: String,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

impl From<&Event> for Message {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id.to_string(),
            kind: event.kind,
            topic: event.topic().to_string(),
            timestamp: event.timestamp,
            data: event.payload.clone(),
        }
    }
}

impl EventType for Message {
    fn event_type(&self) -> &'static str {
        self.kind.as_str()
    }
}

impl Message {
    /// Render as a server-sent event frame for the streaming endpoint.
    pub fn to_sse_event(&self) -> Result<SseEvent, serde_json::Error> {
        let data = serde_json::to_string(self)?;
        Ok(SseEvent::default()
            .id(self.id.clone())
            .event(self.event_type())
            .data(data))
    }
}
