//! Per-chat playback state machine.
//!
//! The controller is the only caller of transport `join`/`leave` and the only
//! component that promotes a queued track into the playing slot. Per chat it
//! serializes transitions behind an async lock; across chats nothing is shared
//! but the store's short synchronous critical sections.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tracing::{debug, info, warn};

use voice_queue_types::{ChatId, PlaybackState, StreamEndReason};

use crate::errors::{FetchError, PlaybackError, TransportError};
use crate::events::EventBus;
use crate::fetcher::Fetcher;
use crate::queue_store::{ChatQueueStore, QueueSnapshot, StartSlot};
use crate::track::{MediaHandle, Track};
use crate::transport::CallTransport;

/// How an advance run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The transport accepted this track.
    Playing(Track),
    /// Nothing left to play.
    Idle,
    /// Every attempted track failed to start; the chat is idle.
    Exhausted { failed: usize },
    /// A stop landed while the run was in flight; the run backed out.
    Superseded,
}

/// Result of admitting a track into a chat's queue.
#[derive(Clone, Debug)]
pub struct PlayReceipt {
    pub track: Track,
    /// 1-based position in the pending queue at admission time.
    pub position: usize,
    /// Set when this request found the chat idle and started playback.
    pub start: Option<AdvanceOutcome>,
}

impl PlayReceipt {
    /// `true` when the admitted track itself went straight to the call.
    pub fn started_immediately(&self) -> bool {
        matches!(&self.start, Some(AdvanceOutcome::Playing(track)) if *track == self.track)
    }
}

/// Serialization points for one chat.
#[derive(Default)]
struct ChatLane {
    /// Held for the whole pop + join + commit sequence.
    advance: AsyncMutex<()>,
    /// Held by `stop` from reset until its leave returns; joins wait on it.
    stopping: AsyncMutex<()>,
    /// Completion signal of the most recent `play_query` admission.
    admission: Mutex<Option<oneshot::Receiver<()>>>,
}

impl ChatLane {
    /// Reserve the next admission turn.
    ///
    /// Returns our turn (dropping it lets the next request enqueue) and the
    /// previous turn, which must complete before we enqueue.
    fn take_turn(&self) -> (oneshot::Sender<()>, Option<oneshot::Receiver<()>>) {
        let (turn, done) = oneshot::channel();
        let previous = self
            .admission
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .replace(done);
        (turn, previous)
    }
}

pub struct PlaybackController {
    store: Arc<ChatQueueStore>,
    transport: Arc<dyn CallTransport>,
    fetcher: Arc<dyn Fetcher>,
    events: EventBus,
    lanes: Mutex<HashMap<ChatId, Arc<ChatLane>>>,
    fetch_timeout: Option<Duration>,
}

impl PlaybackController {
    pub fn new(
        store: Arc<ChatQueueStore>,
        transport: Arc<dyn CallTransport>,
        fetcher: Arc<dyn Fetcher>,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            transport,
            fetcher,
            events,
            lanes: Mutex::new(HashMap::new()),
            fetch_timeout: None,
        }
    }

    /// Abort fetches that take longer than `timeout`.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    pub fn store(&self) -> &Arc<ChatQueueStore> {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Consistent view of a chat's state, slot and queue.
    pub fn snapshot(&self, chat_id: ChatId) -> QueueSnapshot {
        self.store.snapshot(chat_id)
    }

    fn lane(&self, chat_id: ChatId) -> Arc<ChatLane> {
        self.lanes
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .entry(chat_id)
            .or_default()
            .clone()
    }

    /// Fetch `query` and queue the result, starting playback if the chat is idle.
    ///
    /// Requests for one chat are enqueued in arrival order even though their
    /// fetches run concurrently; a failed fetch releases its turn.
    pub async fn play_query(
        &self,
        chat_id: ChatId,
        query: &str,
    ) -> Result<PlayReceipt, PlaybackError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(FetchError::EmptyQuery.into());
        }

        let lane = self.lane(chat_id);
        let (turn, previous) = lane.take_turn();

        debug!(chat_id, query, "fetching track");
        let fetched = self.fetch(query).await;

        if let Some(previous) = previous {
            // Err only means the earlier request went away; the turn is ours either way.
            let _ = previous.await;
        }

        let track = match fetched {
            Ok(track) => track,
            Err(err) => {
                warn!(chat_id, query, error = %err, "fetch failed");
                return Err(err.into());
            }
        };

        let position = self.admit(chat_id, &track).await?;
        drop(turn);

        let start = self.start_if_idle(chat_id).await;
        Ok(PlayReceipt {
            track,
            position,
            start,
        })
    }

    /// Queue an already fetched track, starting playback if the chat is idle.
    pub async fn request_play(
        &self,
        chat_id: ChatId,
        track: Track,
    ) -> Result<PlayReceipt, PlaybackError> {
        let position = self.admit(chat_id, &track).await?;
        let start = self.start_if_idle(chat_id).await;
        Ok(PlayReceipt {
            track,
            position,
            start,
        })
    }

    /// Retire the playing track and advance to the next one.
    pub async fn skip(&self, chat_id: ChatId) -> Result<AdvanceOutcome, PlaybackError> {
        if self.store.state(chat_id) != PlaybackState::Playing {
            return Err(PlaybackError::NotPlaying);
        }
        let lane = self.lane(chat_id);
        let _guard = lane.advance.lock().await;

        let epoch = self.store.epoch(chat_id);
        let Some(current) = self.store.begin_advance(chat_id, epoch, None) else {
            return Err(PlaybackError::NotPlaying);
        };
        info!(chat_id, title = current.title(), "skipping track");
        Ok(self.retire_and_advance(chat_id, epoch, current).await)
    }

    /// End-of-stream signal from the transport for the stream of `media`.
    ///
    /// Advances like `skip` when `media` is the playing track; a late or
    /// repeated signal for a track that already left the slot is ignored.
    pub async fn stream_ended(
        &self,
        chat_id: ChatId,
        media: &MediaHandle,
        reason: StreamEndReason,
    ) -> Option<AdvanceOutcome> {
        if self.store.state(chat_id) != PlaybackState::Playing {
            debug!(chat_id, %media, ?reason, "stream end ignored; chat is not playing");
            return None;
        }
        let lane = self.lane(chat_id);
        let _guard = lane.advance.lock().await;

        let epoch = self.store.epoch(chat_id);
        let Some(current) = self.store.begin_advance(chat_id, epoch, Some(media)) else {
            debug!(chat_id, %media, ?reason, "stream end ignored; not the playing track");
            return None;
        };
        info!(chat_id, title = current.title(), ?reason, "stream ended");
        Some(self.retire_and_advance(chat_id, epoch, current).await)
    }

    /// Clear the queue, empty the playing slot and leave the call.
    ///
    /// Does not wait for an in-flight advance; that advance sees the stop
    /// when its join returns and backs out. Joins issued after the reset wait
    /// until this leave has returned.
    pub async fn stop(&self, chat_id: ChatId) {
        let lane = self.lane(chat_id);
        let stopping = lane.stopping.lock().await;
        let retired = self.store.reset(chat_id);
        info!(chat_id, cleared = retired.len(), "stopping playback");
        self.leave_quietly(chat_id).await;
        drop(stopping);
        for track in &retired {
            self.fetcher.release(track).await;
        }
        self.events.stopped(chat_id);
    }

    pub async fn pause(&self, chat_id: ChatId) -> Result<(), PlaybackError> {
        if self.store.now_playing(chat_id).is_none() {
            return Err(PlaybackError::NoActiveSession);
        }
        self.transport.pause(chat_id).await.map_err(session_error)?;
        self.store.set_paused(chat_id, true);
        self.events.paused(chat_id);
        Ok(())
    }

    pub async fn resume(&self, chat_id: ChatId) -> Result<(), PlaybackError> {
        if self.store.now_playing(chat_id).is_none() {
            return Err(PlaybackError::NoActiveSession);
        }
        self.transport.resume(chat_id).await.map_err(session_error)?;
        self.store.set_paused(chat_id, false);
        self.events.resumed(chat_id);
        Ok(())
    }

    async fn fetch(&self, query: &str) -> Result<Track, FetchError> {
        match self.fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, self.fetcher.fetch(query))
                .await
                .map_err(|_| FetchError::TimedOut(limit))?,
            None => self.fetcher.fetch(query).await,
        }
    }

    async fn admit(&self, chat_id: ChatId, track: &Track) -> Result<usize, PlaybackError> {
        match self.store.enqueue(chat_id, track.clone()) {
            Ok(position) => {
                info!(chat_id, title = track.title(), position, "track queued");
                self.events
                    .queue_changed(chat_id, self.store.pending_len(chat_id));
                Ok(position)
            }
            Err(full) => {
                warn!(chat_id, title = track.title(), limit = full.limit, "queue full");
                self.fetcher.release(track).await;
                Err(full.into())
            }
        }
    }

    async fn start_if_idle(&self, chat_id: ChatId) -> Option<AdvanceOutcome> {
        if self.store.state(chat_id) == PlaybackState::Playing {
            return None;
        }
        let lane = self.lane(chat_id);
        let _guard = lane.advance.lock().await;

        // Re-check under the lock: a concurrent run may have started or drained the queue.
        if self.store.state(chat_id) != PlaybackState::Idle || self.store.pending_len(chat_id) == 0
        {
            return None;
        }
        let epoch = self.store.epoch(chat_id);
        Some(self.run_advance(chat_id, epoch).await)
    }

    async fn retire_and_advance(
        &self,
        chat_id: ChatId,
        epoch: u64,
        current: Track,
    ) -> AdvanceOutcome {
        self.leave_quietly(chat_id).await;
        self.fetcher.release(&current).await;
        self.run_advance(chat_id, epoch).await
    }

    /// Pop and start tracks until one plays, the queue drains, or the failure
    /// budget runs out. Caller holds the chat's advance lock.
    ///
    /// The budget is the queue length when the run starts, so a queue where
    /// every join fails ends in `Exhausted` after at most that many attempts.
    async fn run_advance(&self, chat_id: ChatId, epoch: u64) -> AdvanceOutcome {
        let lane = self.lane(chat_id);
        let budget = self.store.pending_len(chat_id);
        let mut failed = 0usize;

        loop {
            let track = match self.store.begin_start(chat_id, epoch) {
                StartSlot::Track(track) => track,
                StartSlot::Empty => {
                    if failed > 0 {
                        warn!(chat_id, failed, "queue exhausted; nothing could play");
                        self.events.queue_exhausted(chat_id, failed);
                        return AdvanceOutcome::Exhausted { failed };
                    }
                    info!(chat_id, "queue finished");
                    self.events.idle(chat_id);
                    return AdvanceOutcome::Idle;
                }
                StartSlot::Superseded => return AdvanceOutcome::Superseded,
            };

            // A stop still leaving the call must finish before we join.
            drop(lane.stopping.lock().await);
            if self.store.epoch(chat_id) != epoch {
                info!(chat_id, title = track.title(), "stopped before joining");
                self.fetcher.release(&track).await;
                return AdvanceOutcome::Superseded;
            }

            info!(chat_id, title = track.title(), "joining call");
            match self.transport.join(chat_id, track.handle()).await {
                Ok(()) => {
                    if self.store.commit_playing(chat_id, epoch) {
                        info!(chat_id, title = track.title(), "now playing");
                        self.events.track_started(chat_id, track.title());
                        self.events
                            .queue_changed(chat_id, self.store.pending_len(chat_id));
                        return AdvanceOutcome::Playing(track);
                    }
                    info!(chat_id, title = track.title(), "stopped while joining; leaving call");
                    self.leave_quietly(chat_id).await;
                    self.fetcher.release(&track).await;
                    return AdvanceOutcome::Superseded;
                }
                Err(err) => {
                    failed += 1;
                    warn!(
                        chat_id,
                        title = track.title(),
                        error = %err,
                        failed,
                        budget,
                        "failed to start playback"
                    );
                    self.events
                        .join_failed(chat_id, track.title(), err.to_string());
                    let still_current = self.store.abandon_start(chat_id, epoch);
                    self.fetcher.release(&track).await;
                    if !still_current {
                        return AdvanceOutcome::Superseded;
                    }
                    if failed >= budget {
                        self.store.settle_idle(chat_id, epoch);
                        warn!(chat_id, failed, "queue exhausted; nothing could play");
                        self.events.queue_exhausted(chat_id, failed);
                        return AdvanceOutcome::Exhausted { failed };
                    }
                }
            }
        }
    }

    async fn leave_quietly(&self, chat_id: ChatId) {
        match self.transport.leave(chat_id).await {
            Ok(()) => {}
            Err(TransportError::NoSession) => {
                debug!(chat_id, "leave: no active session");
            }
            Err(err) => {
                warn!(chat_id, error = %err, "failed to leave call");
            }
        }
    }
}

fn session_error(err: TransportError) -> PlaybackError {
    match err {
        TransportError::NoSession => PlaybackError::NoActiveSession,
        other => PlaybackError::Transport(other),
    }
}
