//! Query resolution into playable tracks.

use async_trait::async_trait;

use crate::errors::FetchError;
use crate::track::Track;

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Resolve `query` (URL or search text) and stage its audio.
    async fn fetch(&self, query: &str) -> Result<Track, FetchError>;

    /// Drop staged media for a track that will not be played again.
    ///
    /// Called at most once per retirement, but implementations must tolerate
    /// repeated calls for the same track.
    async fn release(&self, _track: &Track) {}
}
