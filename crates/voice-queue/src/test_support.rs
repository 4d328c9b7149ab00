//! Recording fakes for the fetcher and call transport.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::errors::{FetchError, TransportError};
use crate::fetcher::Fetcher;
use crate::track::{MediaHandle, Track};
use crate::transport::CallTransport;
use voice_queue_types::ChatId;

pub(crate) fn track(title: &str) -> Track {
    Track::new(title, MediaHandle::new(format!("/tmp/voice-queue-test/{title}.mp3")))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum TransportCall {
    Join(ChatId, String),
    Leave(ChatId),
    Pause(ChatId),
    Resume(ChatId),
}

#[derive(Default)]
pub(crate) struct MockTransport {
    calls: Mutex<Vec<TransportCall>>,
    failing: Mutex<HashSet<String>>,
    joined: Mutex<HashMap<ChatId, String>>,
    overlapping_joins: Mutex<usize>,
    gate: Mutex<Option<Arc<Notify>>>,
    leave_gate: Mutex<Option<Arc<Notify>>>,
    leave_error: Mutex<bool>,
}

impl MockTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make joins for these titles fail.
    pub(crate) fn fail_titles(&self, titles: &[&str]) {
        let mut failing = self.failing.lock().unwrap();
        failing.extend(titles.iter().map(|t| t.to_string()));
    }

    /// Block every join until the returned gate is notified.
    pub(crate) fn gate_joins(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Hold the next `leave` after it is recorded, before the call is dropped.
    pub(crate) fn gate_next_leave(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.leave_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Make `leave` report an error (it must stay non-fatal).
    pub(crate) fn fail_leaves(&self) {
        *self.leave_error.lock().unwrap() = true;
    }

    pub(crate) fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn join_titles(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Join(_, title) => Some(title),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn leave_count(&self, chat_id: ChatId) -> usize {
        self.calls()
            .iter()
            .filter(|call| **call == TransportCall::Leave(chat_id))
            .count()
    }

    pub(crate) fn joined_title(&self, chat_id: ChatId) -> Option<String> {
        self.joined.lock().unwrap().get(&chat_id).cloned()
    }

    /// Joins issued while the chat was still joined to an earlier track.
    pub(crate) fn overlapping_joins(&self) -> usize {
        *self.overlapping_joins.lock().unwrap()
    }
}

fn title_of(media: &MediaHandle) -> String {
    media
        .as_path()
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[async_trait]
impl CallTransport for MockTransport {
    async fn join(&self, chat_id: ChatId, media: &MediaHandle) -> Result<(), TransportError> {
        let title = title_of(media);
        self.calls
            .lock()
            .unwrap()
            .push(TransportCall::Join(chat_id, title.clone()));
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.failing.lock().unwrap().contains(&title) {
            return Err(TransportError::Unavailable(format!("cannot stream {title}")));
        }
        let previous = self.joined.lock().unwrap().insert(chat_id, title);
        if previous.is_some() {
            *self.overlapping_joins.lock().unwrap() += 1;
        }
        Ok(())
    }

    async fn leave(&self, chat_id: ChatId) -> Result<(), TransportError> {
        self.calls.lock().unwrap().push(TransportCall::Leave(chat_id));
        let gate = self.leave_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let was_joined = self.joined.lock().unwrap().remove(&chat_id).is_some();
        if *self.leave_error.lock().unwrap() && !was_joined {
            return Err(TransportError::NoSession);
        }
        Ok(())
    }

    async fn pause(&self, chat_id: ChatId) -> Result<(), TransportError> {
        self.calls.lock().unwrap().push(TransportCall::Pause(chat_id));
        if self.joined.lock().unwrap().contains_key(&chat_id) {
            Ok(())
        } else {
            Err(TransportError::NoSession)
        }
    }

    async fn resume(&self, chat_id: ChatId) -> Result<(), TransportError> {
        self.calls.lock().unwrap().push(TransportCall::Resume(chat_id));
        if self.joined.lock().unwrap().contains_key(&chat_id) {
            Ok(())
        } else {
            Err(TransportError::NoSession)
        }
    }
}

#[derive(Default)]
pub(crate) struct MockFetcher {
    delays: Mutex<HashMap<String, Duration>>,
    failing: Mutex<HashSet<String>>,
    released: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn delay(&self, query: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(query.to_string(), delay);
    }

    pub(crate) fn fail_queries(&self, queries: &[&str]) {
        let mut failing = self.failing.lock().unwrap();
        failing.extend(queries.iter().map(|q| q.to_string()));
    }

    pub(crate) fn released(&self) -> Vec<String> {
        self.released.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, query: &str) -> Result<Track, FetchError> {
        let delay = self.delays.lock().unwrap().get(query).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(query) {
            return Err(FetchError::Failed {
                status: "exit status: 1".to_string(),
                stderr: format!("no results for {query}"),
            });
        }
        Ok(track(query))
    }

    async fn release(&self, track: &Track) {
        self.released.lock().unwrap().push(track.title().to_string());
    }
}
