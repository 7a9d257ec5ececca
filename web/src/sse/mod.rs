//! SSE HTTP handler for the web layer.
//!
//! Session registry, routing and message types live in the `sse` crate; this
//! module only adapts a session's stream to an HTTP response.

pub mod handler;
