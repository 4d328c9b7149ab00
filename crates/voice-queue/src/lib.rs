//! Per-chat media playback queue and playback state machine.
//!
//! The crate owns queue integrity and transition ordering. Resolving a query
//! into audio ([`Fetcher`]) and streaming it into a live call
//! ([`CallTransport`]) are supplied by the host.

pub mod commands;
pub mod controller;
pub mod errors;
pub mod events;
pub mod fetcher;
pub mod queue_store;
pub mod track;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use commands::{Command, CommandHandlers, UnknownCommand};
pub use controller::{AdvanceOutcome, PlayReceipt, PlaybackController};
pub use errors::{FetchError, PlaybackError, QueueFull, TransportError};
pub use events::EventBus;
pub use fetcher::Fetcher;
pub use queue_store::{ChatQueueStore, QueueSnapshot};
pub use track::{MediaHandle, Track};
pub use transport::CallTransport;
pub use voice_queue_types::{ChatId, PlaybackEvent, PlaybackState, StreamEndReason};
