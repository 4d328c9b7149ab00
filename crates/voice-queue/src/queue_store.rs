//! Per-chat pending queues and playing slots.
//!
//! Every mutation happens under one synchronous lock that is never held across
//! an await, so each read is a consistent point-in-time view. Entries are
//! created lazily on first enqueue and live for the rest of the process.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use voice_queue_types::{ChatId, PlaybackState, QueueSnapshotResponse};

use crate::errors::QueueFull;
use crate::track::{MediaHandle, Track};

#[derive(Default)]
struct ChatEntry {
    pending: VecDeque<Track>,
    now_playing: Option<Track>,
    state: PlaybackState,
    paused: bool,
    /// Bumped by every stop; transitions spanning an await compare against it.
    epoch: u64,
}

/// Consistent view of one chat's playback state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub state: PlaybackState,
    pub paused: bool,
    pub now_playing: Option<Track>,
    pub pending: Vec<Track>,
}

impl QueueSnapshot {
    /// Build the API representation of this snapshot.
    pub fn to_response(&self, chat_id: ChatId) -> QueueSnapshotResponse {
        QueueSnapshotResponse {
            chat_id,
            state: self.state,
            paused: self.paused,
            now_playing: self.now_playing.as_ref().map(|t| t.title().to_string()),
            pending: self.pending.iter().map(|t| t.title().to_string()).collect(),
        }
    }
}

/// Result of trying to promote the queue head into the playing slot.
#[derive(Debug)]
pub(crate) enum StartSlot {
    Track(Track),
    Empty,
    /// A stop happened since the caller read the epoch.
    Superseded,
}

pub struct ChatQueueStore {
    inner: Mutex<HashMap<ChatId, ChatEntry>>,
    max_pending: Option<usize>,
}

impl Default for ChatQueueStore {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl ChatQueueStore {
    /// Create a store whose pending queues hold at most `max_pending` tracks.
    pub fn new(max_pending: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            max_pending,
        }
    }

    /// Create a store without a queue bound.
    pub fn unbounded() -> Self {
        Self::new(None)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ChatId, ChatEntry>> {
        self.inner.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Append a track to the chat's pending queue, creating the chat entry if absent.
    ///
    /// Returns the 1-based position of the track within `pending`.
    pub fn enqueue(&self, chat_id: ChatId, track: Track) -> Result<usize, QueueFull> {
        let mut chats = self.lock();
        let entry = chats.entry(chat_id).or_default();
        if let Some(limit) = self.max_pending
            && entry.pending.len() >= limit
        {
            return Err(QueueFull { limit });
        }
        entry.pending.push_back(track);
        Ok(entry.pending.len())
    }

    /// Remove and return the head of the pending queue.
    pub fn pop_front(&self, chat_id: ChatId) -> Option<Track> {
        self.lock()
            .get_mut(&chat_id)
            .and_then(|entry| entry.pending.pop_front())
    }

    /// Empty the pending queue and return what was in it.
    pub fn clear(&self, chat_id: ChatId) -> Vec<Track> {
        self.lock()
            .get_mut(&chat_id)
            .map(|entry| entry.pending.drain(..).collect())
            .unwrap_or_default()
    }

    /// Pending tracks in playback order.
    pub fn pending_snapshot(&self, chat_id: ChatId) -> Vec<Track> {
        self.lock()
            .get(&chat_id)
            .map(|entry| entry.pending.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn pending_len(&self, chat_id: ChatId) -> usize {
        self.lock()
            .get(&chat_id)
            .map(|entry| entry.pending.len())
            .unwrap_or(0)
    }

    /// Raw write of the playing slot.
    ///
    /// Does not touch the playback state; the controller drives state through
    /// its own transitions.
    pub fn set_now_playing(&self, chat_id: ChatId, track: Option<Track>) {
        self.lock().entry(chat_id).or_default().now_playing = track;
    }

    pub fn now_playing(&self, chat_id: ChatId) -> Option<Track> {
        self.lock()
            .get(&chat_id)
            .and_then(|entry| entry.now_playing.clone())
    }

    pub fn state(&self, chat_id: ChatId) -> PlaybackState {
        self.lock()
            .get(&chat_id)
            .map(|entry| entry.state)
            .unwrap_or_default()
    }

    pub fn is_paused(&self, chat_id: ChatId) -> bool {
        self.lock()
            .get(&chat_id)
            .map(|entry| entry.paused)
            .unwrap_or(false)
    }

    /// State, slot and pending queue read under a single lock.
    pub fn snapshot(&self, chat_id: ChatId) -> QueueSnapshot {
        self.lock()
            .get(&chat_id)
            .map(|entry| QueueSnapshot {
                state: entry.state,
                paused: entry.paused,
                now_playing: entry.now_playing.clone(),
                pending: entry.pending.iter().cloned().collect(),
            })
            .unwrap_or_default()
    }

    /// Chats that have ever received a track.
    pub fn chat_ids(&self) -> Vec<ChatId> {
        let mut ids: Vec<ChatId> = self.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn epoch(&self, chat_id: ChatId) -> u64 {
        self.lock()
            .get(&chat_id)
            .map(|entry| entry.epoch)
            .unwrap_or(0)
    }

    /// Pop the queue head into the playing slot and enter `Starting`.
    ///
    /// An empty queue settles the chat in `Idle`.
    pub(crate) fn begin_start(&self, chat_id: ChatId, epoch: u64) -> StartSlot {
        let mut chats = self.lock();
        let Some(entry) = chats.get_mut(&chat_id) else {
            return StartSlot::Empty;
        };
        if entry.epoch != epoch {
            return StartSlot::Superseded;
        }
        entry.paused = false;
        match entry.pending.pop_front() {
            Some(track) => {
                entry.now_playing = Some(track.clone());
                entry.state = PlaybackState::Starting;
                StartSlot::Track(track)
            }
            None => {
                entry.now_playing = None;
                entry.state = PlaybackState::Idle;
                StartSlot::Empty
            }
        }
    }

    /// `Starting -> Playing` once the transport accepted the track.
    ///
    /// Returns `false` when a stop intervened; the caller must undo the join.
    pub(crate) fn commit_playing(&self, chat_id: ChatId, epoch: u64) -> bool {
        let mut chats = self.lock();
        match chats.get_mut(&chat_id) {
            Some(entry) if entry.epoch == epoch && entry.state == PlaybackState::Starting => {
                entry.state = PlaybackState::Playing;
                true
            }
            _ => false,
        }
    }

    /// `Starting -> Advancing` after a failed join; clears the playing slot.
    pub(crate) fn abandon_start(&self, chat_id: ChatId, epoch: u64) -> bool {
        let mut chats = self.lock();
        match chats.get_mut(&chat_id) {
            Some(entry) if entry.epoch == epoch => {
                entry.now_playing = None;
                entry.state = PlaybackState::Advancing;
                true
            }
            _ => false,
        }
    }

    /// `Playing -> Advancing`, returning the retired track.
    ///
    /// With `expected` set, only advances when that media is in the slot.
    pub(crate) fn begin_advance(
        &self,
        chat_id: ChatId,
        epoch: u64,
        expected: Option<&MediaHandle>,
    ) -> Option<Track> {
        let mut chats = self.lock();
        let entry = chats.get_mut(&chat_id)?;
        if entry.epoch != epoch || entry.state != PlaybackState::Playing {
            return None;
        }
        if expected.is_some_and(|media| {
            entry.now_playing.as_ref().map(Track::handle) != Some(media)
        }) {
            return None;
        }
        entry.state = PlaybackState::Advancing;
        entry.paused = false;
        entry.now_playing.take()
    }

    /// Force `Idle` with an empty playing slot, leaving `pending` untouched.
    pub(crate) fn settle_idle(&self, chat_id: ChatId, epoch: u64) -> bool {
        let mut chats = self.lock();
        match chats.get_mut(&chat_id) {
            Some(entry) if entry.epoch == epoch => {
                entry.now_playing = None;
                entry.state = PlaybackState::Idle;
                entry.paused = false;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn set_paused(&self, chat_id: ChatId, paused: bool) {
        if let Some(entry) = self.lock().get_mut(&chat_id) {
            entry.paused = paused;
        }
    }

    /// Stop transition: any state to `Idle`, pending cleared, epoch bumped.
    ///
    /// Returns the tracks taken out of the chat. A track still `Starting`
    /// is left to the in-flight advance, which notices the new epoch.
    pub(crate) fn reset(&self, chat_id: ChatId) -> Vec<Track> {
        let mut chats = self.lock();
        let Some(entry) = chats.get_mut(&chat_id) else {
            return Vec::new();
        };
        entry.epoch = entry.epoch.wrapping_add(1);
        let mut retired: Vec<Track> = entry.pending.drain(..).collect();
        let playing = entry.now_playing.take();
        if entry.state == PlaybackState::Playing {
            retired.extend(playing);
        }
        entry.state = PlaybackState::Idle;
        entry.paused = false;
        retired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::track;

    const CHAT: ChatId = -1001;

    #[test]
    fn enqueue_creates_entry_and_reports_position() {
        let store = ChatQueueStore::unbounded();
        assert!(store.chat_ids().is_empty());
        assert_eq!(store.enqueue(CHAT, track("Song1")).unwrap(), 1);
        assert_eq!(store.enqueue(CHAT, track("Song2")).unwrap(), 2);
        assert_eq!(store.chat_ids(), vec![CHAT]);
        assert_eq!(store.state(CHAT), PlaybackState::Idle);
    }

    #[test]
    fn enqueue_rejects_when_bound_reached() {
        let store = ChatQueueStore::new(Some(1));
        store.enqueue(CHAT, track("Song1")).unwrap();
        let err = store.enqueue(CHAT, track("Song2")).unwrap_err();
        assert_eq!(err, QueueFull { limit: 1 });
        assert_eq!(store.pending_len(CHAT), 1);
    }

    #[test]
    fn pop_front_preserves_insertion_order() {
        let store = ChatQueueStore::unbounded();
        for title in ["Song1", "Song2", "Song3"] {
            store.enqueue(CHAT, track(title)).unwrap();
        }
        assert_eq!(store.pop_front(CHAT).unwrap().title(), "Song1");
        assert_eq!(store.pop_front(CHAT).unwrap().title(), "Song2");
        assert_eq!(store.pop_front(CHAT).unwrap().title(), "Song3");
        assert!(store.pop_front(CHAT).is_none());
        assert!(store.pop_front(42).is_none());
    }

    #[test]
    fn chats_are_isolated() {
        let store = ChatQueueStore::unbounded();
        store.enqueue(1, track("a")).unwrap();
        store.enqueue(2, track("b")).unwrap();
        let cleared = store.clear(1);
        assert_eq!(cleared.len(), 1);
        assert!(store.pending_snapshot(1).is_empty());
        assert_eq!(store.pending_snapshot(2)[0].title(), "b");
    }

    #[test]
    fn now_playing_slot_round_trips() {
        let store = ChatQueueStore::unbounded();
        assert!(store.now_playing(CHAT).is_none());
        store.set_now_playing(CHAT, Some(track("Song1")));
        assert_eq!(store.now_playing(CHAT).unwrap().title(), "Song1");
        store.set_now_playing(CHAT, None);
        assert!(store.now_playing(CHAT).is_none());
    }

    #[test]
    fn begin_start_and_commit_move_head_into_playing() {
        let store = ChatQueueStore::unbounded();
        store.enqueue(CHAT, track("Song1")).unwrap();
        store.enqueue(CHAT, track("Song2")).unwrap();
        let epoch = store.epoch(CHAT);

        let StartSlot::Track(started) = store.begin_start(CHAT, epoch) else {
            panic!("expected a track");
        };
        assert_eq!(started.title(), "Song1");
        assert_eq!(store.state(CHAT), PlaybackState::Starting);
        assert!(store.commit_playing(CHAT, epoch));

        let snapshot = store.snapshot(CHAT);
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert_eq!(snapshot.now_playing.unwrap().title(), "Song1");
        assert_eq!(snapshot.pending.len(), 1);
    }

    #[test]
    fn begin_start_on_empty_queue_settles_idle() {
        let store = ChatQueueStore::unbounded();
        store.enqueue(CHAT, track("Song1")).unwrap();
        store.pop_front(CHAT);
        assert!(matches!(store.begin_start(CHAT, 0), StartSlot::Empty));
        assert_eq!(store.state(CHAT), PlaybackState::Idle);
        assert!(store.now_playing(CHAT).is_none());
    }

    #[test]
    fn reset_bumps_epoch_and_blocks_stale_commit() {
        let store = ChatQueueStore::unbounded();
        store.enqueue(CHAT, track("Song1")).unwrap();
        store.enqueue(CHAT, track("Song2")).unwrap();
        let epoch = store.epoch(CHAT);
        assert!(matches!(store.begin_start(CHAT, epoch), StartSlot::Track(_)));

        let retired = store.reset(CHAT);
        // The starting track stays with the in-flight advance.
        assert_eq!(retired.len(), 1);
        assert_eq!(retired[0].title(), "Song2");
        assert!(!store.commit_playing(CHAT, epoch));
        assert!(matches!(
            store.begin_start(CHAT, epoch),
            StartSlot::Superseded
        ));

        let snapshot = store.snapshot(CHAT);
        assert_eq!(snapshot.state, PlaybackState::Idle);
        assert!(snapshot.now_playing.is_none());
        assert!(snapshot.pending.is_empty());
    }

    #[test]
    fn reset_returns_playing_track() {
        let store = ChatQueueStore::unbounded();
        store.enqueue(CHAT, track("Song1")).unwrap();
        let epoch = store.epoch(CHAT);
        store.begin_start(CHAT, epoch);
        store.commit_playing(CHAT, epoch);
        let retired = store.reset(CHAT);
        assert_eq!(retired.len(), 1);
        assert_eq!(retired[0].title(), "Song1");
    }

    #[test]
    fn reset_of_unknown_chat_does_not_create_entry() {
        let store = ChatQueueStore::unbounded();
        assert!(store.reset(CHAT).is_empty());
        assert!(store.chat_ids().is_empty());
    }

    #[test]
    fn begin_advance_requires_playing() {
        let store = ChatQueueStore::unbounded();
        store.enqueue(CHAT, track("Song1")).unwrap();
        let epoch = store.epoch(CHAT);
        assert!(store.begin_advance(CHAT, epoch, None).is_none());
        store.begin_start(CHAT, epoch);
        assert!(store.begin_advance(CHAT, epoch, None).is_none());
        store.commit_playing(CHAT, epoch);
        store.set_paused(CHAT, true);

        let retired = store.begin_advance(CHAT, epoch, None).unwrap();
        assert_eq!(retired.title(), "Song1");
        assert_eq!(store.state(CHAT), PlaybackState::Advancing);
        assert!(!store.is_paused(CHAT));
        assert!(store.now_playing(CHAT).is_none());
    }

    #[test]
    fn begin_advance_checks_expected_media() {
        let store = ChatQueueStore::unbounded();
        store.enqueue(CHAT, track("Song1")).unwrap();
        let epoch = store.epoch(CHAT);
        store.begin_start(CHAT, epoch);
        store.commit_playing(CHAT, epoch);

        assert!(
            store
                .begin_advance(CHAT, epoch, Some(track("Song0").handle()))
                .is_none()
        );
        assert_eq!(store.state(CHAT), PlaybackState::Playing);
        let retired = store
            .begin_advance(CHAT, epoch, Some(track("Song1").handle()))
            .unwrap();
        assert_eq!(retired.title(), "Song1");
    }

    #[test]
    fn snapshot_converts_to_response() {
        let store = ChatQueueStore::unbounded();
        store.enqueue(CHAT, track("Song1")).unwrap();
        let response = store.snapshot(CHAT).to_response(CHAT);
        assert_eq!(response.chat_id, CHAT);
        assert_eq!(response.pending, vec!["Song1".to_string()]);
        assert!(response.now_playing.is_none());
    }
}
