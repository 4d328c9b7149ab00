//! Resolved, playable media items.

use std::fmt;
use std::path::{Path, PathBuf};

/// Opaque handle to staged audio data.
///
/// The controller never looks inside; it only hands the handle to the call
/// transport and back to the fetcher for release.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MediaHandle(PathBuf);

impl MediaHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// A fetched track: title plus handle to its audio.
///
/// Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Track {
    title: String,
    handle: MediaHandle,
}

impl Track {
    pub fn new(title: impl Into<String>, handle: MediaHandle) -> Self {
        Self {
            title: title.into(),
            handle,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn handle(&self) -> &MediaHandle {
        &self.handle
    }
}
