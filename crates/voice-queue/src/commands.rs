//! Chat command handlers.
//!
//! Each handler maps one command onto a controller call and renders the
//! outcome as the reply text sent back to the chat.

use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use voice_queue_types::ChatId;

use crate::controller::{AdvanceOutcome, PlaybackController};
use crate::errors::{FetchError, PlaybackError};

const USAGE: &str = "Commands: /play <song name or YouTube URL>, /skip, /stop, /queue, /pause, /resume";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Play,
    Skip,
    Stop,
    Queue,
    Pause,
    Resume,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown command: {0}")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    /// Accepts `play`, `/play` and `/play@SomeBot`, in any case.
    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let name = token.trim();
        let name = name.strip_prefix('/').unwrap_or(name);
        let name = name.split_once('@').map_or(name, |(name, _)| name);
        match name.to_ascii_lowercase().as_str() {
            "play" => Ok(Self::Play),
            "skip" => Ok(Self::Skip),
            "stop" => Ok(Self::Stop),
            "queue" => Ok(Self::Queue),
            "pause" => Ok(Self::Pause),
            "resume" => Ok(Self::Resume),
            _ => Err(UnknownCommand(token.to_string())),
        }
    }
}

#[derive(Clone)]
pub struct CommandHandlers {
    controller: Arc<PlaybackController>,
}

impl CommandHandlers {
    pub fn new(controller: Arc<PlaybackController>) -> Self {
        Self { controller }
    }

    pub fn controller(&self) -> &Arc<PlaybackController> {
        &self.controller
    }

    /// Route a raw command token to its handler.
    pub async fn dispatch(&self, chat_id: ChatId, command: &str, args: &str) -> String {
        match command.parse::<Command>() {
            Ok(command) => self.handle(chat_id, command, args).await,
            Err(err) => {
                debug!(chat_id, error = %err, "unrecognized command");
                USAGE.to_string()
            }
        }
    }

    pub async fn handle(&self, chat_id: ChatId, command: Command, args: &str) -> String {
        match command {
            Command::Play => self.play(chat_id, args).await,
            Command::Skip => self.skip(chat_id).await,
            Command::Stop => self.stop(chat_id).await,
            Command::Queue => self.queue(chat_id),
            Command::Pause => self.pause(chat_id).await,
            Command::Resume => self.resume(chat_id).await,
        }
    }

    pub async fn play(&self, chat_id: ChatId, args: &str) -> String {
        match self.controller.play_query(chat_id, args).await {
            Ok(receipt) if receipt.started_immediately() => {
                format!("Now playing: {}", receipt.track.title())
            }
            Ok(receipt) => match receipt.start {
                Some(AdvanceOutcome::Exhausted { .. }) => format!(
                    "Could not start playback of {}: the call rejected it",
                    receipt.track.title()
                ),
                _ => format!(
                    "Added to queue: {} (position {})",
                    receipt.track.title(),
                    receipt.position
                ),
            },
            Err(PlaybackError::Fetch(FetchError::EmptyQuery)) => {
                "Please provide a song name or YouTube URL!".to_string()
            }
            Err(PlaybackError::Fetch(err)) => format!("Failed to download the song: {err}"),
            Err(PlaybackError::QueueFull(full)) => {
                format!("Queue is full ({} songs), try again later", full.limit)
            }
            Err(err) => format!("Failed to play the song: {err}"),
        }
    }

    pub async fn skip(&self, chat_id: ChatId) -> String {
        match self.controller.skip(chat_id).await {
            Ok(AdvanceOutcome::Playing(track)) => {
                format!("Skipped to next song\nNow playing: {}", track.title())
            }
            Ok(AdvanceOutcome::Idle) => "Skipped to next song\nQueue is empty!".to_string(),
            Ok(AdvanceOutcome::Exhausted { failed }) => {
                format!("Skipped to next song\nNone of the next {failed} songs could be played")
            }
            Ok(AdvanceOutcome::Superseded) => "Skipped to next song".to_string(),
            Err(_) => "No song is currently playing!".to_string(),
        }
    }

    pub async fn stop(&self, chat_id: ChatId) -> String {
        self.controller.stop(chat_id).await;
        "Stopped playing and cleared queue".to_string()
    }

    /// Read-only: never touches the transport.
    pub fn queue(&self, chat_id: ChatId) -> String {
        let snapshot = self.controller.snapshot(chat_id);
        if snapshot.now_playing.is_none() && snapshot.pending.is_empty() {
            return "Queue is empty!".to_string();
        }

        let mut reply = String::new();
        if let Some(track) = &snapshot.now_playing {
            let _ = writeln!(reply, "Now Playing: {}", track.title());
        }
        if !snapshot.pending.is_empty() {
            if !reply.is_empty() {
                reply.push('\n');
            }
            reply.push_str("Current Queue:\n");
            for (index, track) in snapshot.pending.iter().enumerate() {
                let _ = writeln!(reply, "{}. {}", index + 1, track.title());
            }
        }
        reply.trim_end().to_string()
    }

    pub async fn pause(&self, chat_id: ChatId) -> String {
        match self.controller.pause(chat_id).await {
            Ok(()) => "Paused".to_string(),
            Err(PlaybackError::NoActiveSession) => "Nothing is playing!".to_string(),
            Err(err) => format!("Failed to pause: {err}"),
        }
    }

    pub async fn resume(&self, chat_id: ChatId) -> String {
        match self.controller.resume(chat_id).await {
            Ok(()) => "Resumed".to_string(),
            Err(PlaybackError::NoActiveSession) => "Nothing is paused!".to_string(),
            Err(err) => format!("Failed to resume: {err}"),
        }
    }
}
