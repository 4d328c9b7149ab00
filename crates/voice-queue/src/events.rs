//! In-process event bus for playback transitions.
//!
//! Provides a lightweight broadcast channel for API subscribers.

use tokio::sync::broadcast;

use voice_queue_types::{ChatId, PlaybackEvent};

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PlaybackEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a new event bus with a bounded broadcast channel.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.sender.subscribe()
    }

    pub fn queue_changed(&self, chat_id: ChatId, pending: usize) {
        self.publish(PlaybackEvent::QueueChanged { chat_id, pending });
    }

    pub fn track_started(&self, chat_id: ChatId, title: &str) {
        self.publish(PlaybackEvent::TrackStarted {
            chat_id,
            title: title.to_string(),
        });
    }

    pub fn join_failed(&self, chat_id: ChatId, title: &str, error: String) {
        self.publish(PlaybackEvent::JoinFailed {
            chat_id,
            title: title.to_string(),
            error,
        });
    }

    pub fn queue_exhausted(&self, chat_id: ChatId, failed: usize) {
        self.publish(PlaybackEvent::QueueExhausted { chat_id, failed });
    }

    pub fn idle(&self, chat_id: ChatId) {
        self.publish(PlaybackEvent::Idle { chat_id });
    }

    pub fn stopped(&self, chat_id: ChatId) {
        self.publish(PlaybackEvent::Stopped { chat_id });
    }

    pub fn paused(&self, chat_id: ChatId) {
        self.publish(PlaybackEvent::Paused { chat_id });
    }

    pub fn resumed(&self, chat_id: ChatId) {
        self.publish(PlaybackEvent::Resumed { chat_id });
    }

    fn publish(&self, event: PlaybackEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }
}
