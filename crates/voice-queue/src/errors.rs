//! Error taxonomy for fetch, transport and playback operations.

use std::time::Duration;

use thiserror::Error;

/// A query could not be resolved into a playable track.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("query is empty")]
    EmptyQuery,
    #[error("fetch timed out after {0:?}")]
    TimedOut(Duration),
    #[error("failed to launch fetcher: {0}")]
    Launch(#[source] std::io::Error),
    #[error("fetcher exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("unexpected fetcher output: {0}")]
    InvalidOutput(String),
}

/// The call transport rejected or could not perform an operation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No call session exists for the chat.
    #[error("no active call session")]
    NoSession,
    #[error("call transport unavailable: {0}")]
    Unavailable(String),
    #[error("call transport rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// The chat's pending queue reached its configured bound.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("queue is full ({limit} tracks)")]
pub struct QueueFull {
    pub limit: usize,
}

/// Errors surfaced to command handlers.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// `skip` with nothing in the playing state.
    #[error("nothing is playing")]
    NotPlaying,
    /// `pause`/`resume` without a track in the playing slot.
    #[error("no active call session")]
    NoActiveSession,
    #[error(transparent)]
    QueueFull(#[from] QueueFull),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
