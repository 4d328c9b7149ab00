//! HTTP API handlers.
//!
//! Defines the Actix routes for chat commands, queue inspection, gateway
//! callbacks, and the event stream.

pub mod commands;
pub mod health_check;
pub mod queue;
pub mod streams;

pub use commands::{__path_run_command, run_command};
pub use health_check::{__path_health, health};
pub use queue::{
    __path_chats_list, __path_queue_get, __path_stream_ended, chats_list, queue_get, stream_ended,
};
pub use streams::{__path_events_stream, events_stream};
