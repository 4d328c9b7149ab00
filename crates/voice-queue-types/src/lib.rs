use serde::{Deserialize, Serialize};

/// Chat identifier as issued by the messaging platform.
///
/// Group chats use negative ids, so this is signed.
pub type ChatId = i64;

/// Playback state of a single chat.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// Nothing handed to the call transport.
    #[default]
    Idle,
    /// A track was popped and the transport join is in flight.
    Starting,
    /// The transport accepted the current track.
    Playing,
    /// The current track is being retired and the next one selected.
    Advancing,
}

/// Reason why a call stream ended on the gateway side.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum StreamEndReason {
    /// Natural end of the media file.
    Eof,
    /// Decoder or transport error interrupted the stream.
    Error,
    /// The gateway dropped out of the call on its own.
    Kicked,
}

/// Events published by the playback controller.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlaybackEvent {
    QueueChanged { chat_id: ChatId, pending: usize },
    TrackStarted { chat_id: ChatId, title: String },
    JoinFailed { chat_id: ChatId, title: String, error: String },
    QueueExhausted { chat_id: ChatId, failed: usize },
    Idle { chat_id: ChatId },
    Stopped { chat_id: ChatId },
    Paused { chat_id: ChatId },
    Resumed { chat_id: ChatId },
}

impl PlaybackEvent {
    /// Chat the event belongs to.
    pub fn chat_id(&self) -> ChatId {
        match self {
            PlaybackEvent::QueueChanged { chat_id, .. }
            | PlaybackEvent::TrackStarted { chat_id, .. }
            | PlaybackEvent::JoinFailed { chat_id, .. }
            | PlaybackEvent::QueueExhausted { chat_id, .. }
            | PlaybackEvent::Idle { chat_id }
            | PlaybackEvent::Stopped { chat_id }
            | PlaybackEvent::Paused { chat_id }
            | PlaybackEvent::Resumed { chat_id } => *chat_id,
        }
    }
}

/// Point-in-time view of one chat's queue, as exposed by the HTTP API.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct QueueSnapshotResponse {
    /// Chat the snapshot was taken for.
    pub chat_id: ChatId,
    /// Current playback state.
    pub state: PlaybackState,
    /// `true` after a successful pause until resume or the next track.
    pub paused: bool,
    /// Title of the track in the playing slot.
    pub now_playing: Option<String>,
    /// Titles of pending tracks in playback order.
    pub pending: Vec<String>,
}

/// Inbound command payload from the message dispatcher.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CommandRequest {
    /// Argument text following the command token (may be empty).
    #[serde(default)]
    pub args: String,
}

/// User-facing reply for a handled command.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CommandReply {
    pub reply: String,
}

/// End-of-stream callback payload sent by the call gateway.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct StreamEndedRequest {
    /// Media path the stream was joined with.
    pub path: String,
    pub reason: StreamEndReason,
}
