use crate::extractors::caller::Caller;
use crate::{AppState, Error};
use async_stream::stream;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use domain::{SessionHandle, SessionId, SessionManager};
use futures_util::Stream;
use log::*;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;

/// Closes the session when the response stream is dropped, which is how a
/// client disconnect shows up.
struct CloseOnDrop {
    sessions: Arc<SessionManager>,
    session_id: SessionId,
}

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.sessions.close_session(&self.session_id);
    }
}

/// Open a live session and stream its messages.
///
/// The first event (`session_opened`) carries the session id used for the
/// subscription, heartbeat and close endpoints. The stream ends when the
/// session is closed, evicted or reclaimed as idle.
pub(crate) async fn sse_handler(
    caller: Caller,
    State(app_state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, Error> {
    let SessionHandle {
        id,
        owner_id,
        stream: mut messages,
    } = app_state.sessions.open_session(caller.id)?;
    debug!("Establishing SSE stream for session {} of {}", id, owner_id);

    let opened = Event::default()
        .event("session_opened")
        .data(json!({ "session_id": id }).to_string());
    let guard = CloseOnDrop {
        sessions: Arc::clone(&app_state.sessions),
        session_id: id,
    };

    let stream = stream! {
        let _guard = guard;
        yield Ok(opened);

        while let Some(message) = messages.next().await {
            match message.to_sse_event() {
                Ok(event) => yield Ok(event),
                Err(e) => error!("Failed to serialize SSE message {}: {}", message.id, e),
            }
        }
        debug!("SSE stream for owner {} ended", owner_id);
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
