use std::sync::Arc;

use async_trait::async_trait;
use events::{Event, EventHandler};

use crate::manager::Manager;

/// Feeds events arriving on the bus into this instance's sessions.
pub struct SessionEventHandler {
    manager: Arc<Manager>,
}

impl SessionEventHandler {
    pub fn new(manager: Arc<Manager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl EventHandler for SessionEventHandler {
    async fn handle(&self, event: &Event) -> Result<(), events::Error> {
        self.manager.route(event);
        Ok(())
    }
}
