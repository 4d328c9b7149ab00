//! Call transport abstraction for live audio sessions.
//!
//! Implementations stream a staged media file into a chat's voice call.

use async_trait::async_trait;

use crate::errors::TransportError;
use crate::track::MediaHandle;
use voice_queue_types::ChatId;

#[async_trait]
pub trait CallTransport: Send + Sync {
    /// Join the chat's call and start streaming `media`.
    async fn join(&self, chat_id: ChatId, media: &MediaHandle) -> Result<(), TransportError>;
    /// Leave the chat's call. Must succeed when no session exists.
    async fn leave(&self, chat_id: ChatId) -> Result<(), TransportError>;
    /// Pause the active stream.
    async fn pause(&self, chat_id: ChatId) -> Result<(), TransportError>;
    /// Resume a paused stream.
    async fn resume(&self, chat_id: ChatId) -> Result<(), TransportError>;
}
