//! Shared application state.

use std::sync::Arc;

use voice_queue::{CommandHandlers, EventBus, PlaybackController};

pub struct AppState {
    pub handlers: CommandHandlers,
    pub events: EventBus,
}

impl AppState {
    pub fn new(controller: Arc<PlaybackController>) -> Self {
        let events = controller.events().clone();
        Self {
            handlers: CommandHandlers::new(controller),
            events,
        }
    }

    pub fn controller(&self) -> &Arc<PlaybackController> {
        self.handlers.controller()
    }
}
